use secrecy::SecretString;
use serde::Deserialize;

/// Embedding provider configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingsConfig {
    /// Which provider implementation to use
    #[serde(default)]
    pub provider: ProviderKind,
    /// Output vector dimension (hash provider only)
    #[serde(default = "default_dimension")]
    pub dimension: usize,
    /// Model identifier (e.g. "text-embedding-3-small")
    #[serde(default)]
    pub model: Option<String>,
    /// API key for remote providers
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Override the provider API base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Embedding provider implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Deterministic in-process token-hashing provider (no network)
    #[default]
    Hash,
    /// OpenAI-compatible embeddings API
    #[serde(rename = "openai")]
    OpenAi,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Hash,
            dimension: default_dimension(),
            model: None,
            api_key: None,
            base_url: None,
        }
    }
}

const fn default_dimension() -> usize {
    384
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_hash_provider() {
        let config = EmbeddingsConfig::default();
        assert_eq!(config.provider, ProviderKind::Hash);
        assert_eq!(config.dimension, 384);
    }

    #[test]
    fn openai_config_parses() {
        let config: EmbeddingsConfig = toml::from_str(
            r#"
            provider = "openai"
            model = "text-embedding-3-small"
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert_eq!(config.provider, ProviderKind::OpenAi);
        assert_eq!(config.model.as_deref(), Some("text-embedding-3-small"));
        assert!(config.api_key.is_some());
    }
}
