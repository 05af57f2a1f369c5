use std::sync::OnceLock;

use regex::Regex;

/// Expand `{{ env.VAR }}` placeholders in a raw TOML string
///
/// An optional fallback may be supplied as `{{ env.VAR | default("value") }}`;
/// it is used when the variable is unset. Expansion happens on the raw text
/// before deserialization so config structs stay plain `String`/`SecretString`.
/// TOML comment lines are passed through untouched.
pub fn expand_env(input: &str) -> Result<String, String> {
    fn placeholder() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| {
            // Group 1: variable name, group 2: optional default value
            Regex::new(r#"\{\{\s*env\.([A-Za-z0-9_]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#)
                .expect("must be valid regex")
        })
    }

    let mut output = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            output.push('\n');
        }

        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut last_end = 0;
        for captures in placeholder().captures_iter(line) {
            let whole = captures.get(0).expect("capture 0 always present");
            let var_name = &captures[1];

            output.push_str(&line[last_end..whole.start()]);

            match std::env::var(var_name) {
                Ok(value) => output.push_str(&value),
                Err(_) => match captures.get(2) {
                    Some(default) => output.push_str(default.as_str()),
                    None => return Err(format!("environment variable not found: `{var_name}`")),
                },
            }

            last_end = whole.end();
        }
        output.push_str(&line[last_end..]);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_placeholders() {
        let input = "command = \"npx\"";
        assert_eq!(expand_env(input).unwrap(), input);
    }

    #[test]
    fn single_env_var() {
        temp_env::with_var("PLEXUS_TEST_VAR", Some("hello"), || {
            let result = expand_env("key = \"{{ env.PLEXUS_TEST_VAR }}\"").unwrap();
            assert_eq!(result, "key = \"hello\"");
        });
    }

    #[test]
    fn multiple_env_vars_on_separate_lines() {
        let vars = [("PLEXUS_FOO", Some("foo")), ("PLEXUS_BAR", Some("bar"))];
        temp_env::with_vars(vars, || {
            let result = expand_env("a = \"{{ env.PLEXUS_FOO }}\"\nb = \"{{ env.PLEXUS_BAR }}\"").unwrap();
            assert_eq!(result, "a = \"foo\"\nb = \"bar\"");
        });
    }

    #[test]
    fn missing_env_var_is_an_error() {
        temp_env::with_var_unset("PLEXUS_MISSING", || {
            let err = expand_env("key = \"{{ env.PLEXUS_MISSING }}\"").unwrap_err();
            assert!(err.contains("PLEXUS_MISSING"));
        });
    }

    #[test]
    fn default_applies_when_unset() {
        temp_env::with_var_unset("PLEXUS_MISSING", || {
            let result = expand_env("key = \"{{ env.PLEXUS_MISSING | default(\"fallback\") }}\"").unwrap();
            assert_eq!(result, "key = \"fallback\"");
        });
    }

    #[test]
    fn comment_lines_pass_through() {
        temp_env::with_var_unset("PLEXUS_MISSING", || {
            let input = "# {{ env.PLEXUS_MISSING }}";
            assert_eq!(expand_env(input).unwrap(), input);
        });
    }
}
