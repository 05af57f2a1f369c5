use std::path::Path;

use secrecy::ExposeSecret;

use crate::{Config, ProviderKind};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded =
            crate::env::expand_env(&raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// An empty `[upstreams]` table is allowed: the router then serves only
    /// the built-in search tool.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_upstreams()?;
        self.validate_embeddings()?;
        Ok(())
    }

    fn validate_upstreams(&self) -> anyhow::Result<()> {
        for (id, upstream) in &self.upstreams {
            if id.is_empty() {
                anyhow::bail!("upstream id must not be empty");
            }
            if id.contains('.') {
                anyhow::bail!("upstream id '{id}' must not contain '.'");
            }
            if let Some(ref prefix) = upstream.semantic_prefix {
                if prefix.is_empty() {
                    anyhow::bail!("semantic_prefix for upstream '{id}' must not be empty");
                }
                if prefix.contains('.') {
                    anyhow::bail!("semantic_prefix '{prefix}' for upstream '{id}' must not contain '.'");
                }
            }
        }
        Ok(())
    }

    fn validate_embeddings(&self) -> anyhow::Result<()> {
        let embeddings = &self.embeddings;

        match embeddings.provider {
            ProviderKind::Hash => {
                if embeddings.dimension == 0 {
                    anyhow::bail!("embeddings.dimension must be greater than 0");
                }
            }
            ProviderKind::OpenAi => {
                if embeddings.model.is_none() {
                    anyhow::bail!("embeddings.model is required for the openai provider");
                }
                let has_key = embeddings
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.expose_secret().is_empty());
                if !has_key {
                    anyhow::bail!("embeddings.api_key is required for the openai provider");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportConfig;

    fn parse(raw: &str) -> Config {
        toml::from_str(raw).unwrap()
    }

    #[test]
    fn empty_config_is_valid() {
        let config = parse("");
        assert!(config.upstreams.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn full_config_parses_and_validates() {
        let config = parse(
            r#"
            [upstreams.playwright]
            transport = "stdio"
            command = "npx"
            args = ["@playwright/mcp"]
            semantic_prefix = "browser"
            category_description = "Web browser automation"

            [upstreams.tracker]
            transport = "http"
            endpoint = "http://localhost:9000/mcp"

            [router]
            call_timeout_secs = 10

            [embeddings]
            provider = "hash"
            dimension = 128
            "#,
        );

        assert_eq!(config.upstreams.len(), 2);
        assert!(matches!(
            config.upstreams["playwright"].transport,
            TransportConfig::Stdio(_)
        ));
        assert_eq!(config.router.call_timeout_secs, 10);
        assert_eq!(config.embeddings.dimension, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dotted_upstream_id_is_rejected() {
        let config = parse(
            r#"
            [upstreams."a.b"]
            transport = "stdio"
            command = "tool"
            "#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn dotted_prefix_is_rejected() {
        let config = parse(
            r#"
            [upstreams.a]
            transport = "stdio"
            command = "tool"
            semantic_prefix = "x.y"
            "#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn openai_without_key_is_rejected() {
        let config = parse(
            r#"
            [embeddings]
            provider = "openai"
            model = "text-embedding-3-small"
            "#,
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_expands_env_placeholders() {
        temp_env::with_var("PLEXUS_TEST_CMD", Some("serve-mcp"), || {
            let dir = std::env::temp_dir().join("plexus-config-test");
            std::fs::create_dir_all(&dir).unwrap();
            let path = dir.join("plexus.toml");
            std::fs::write(
                &path,
                "[upstreams.files]\ntransport = \"stdio\"\ncommand = \"{{ env.PLEXUS_TEST_CMD }}\"\n",
            )
            .unwrap();

            let config = Config::load(&path).unwrap();
            match config.upstreams["files"].transport {
                TransportConfig::Stdio(ref stdio) => assert_eq!(stdio.command, "serve-mcp"),
                ref other => panic!("expected stdio transport, got {other:?}"),
            }
        });
    }
}
