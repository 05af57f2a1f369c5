#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod error;
mod provider;
pub mod vector;

use std::sync::Arc;

use plexus_config::{EmbeddingsConfig, ProviderKind};

pub use error::{EmbeddingsError, Result};
pub use provider::EmbeddingProvider;
pub use provider::hash::HashEmbeddingsProvider;
pub use provider::openai::OpenAiEmbeddingsProvider;

/// Build the embedding provider selected by configuration
///
/// # Errors
///
/// Returns an error if the configuration names a remote provider without
/// the credentials it needs
pub fn build_provider(config: &EmbeddingsConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Hash => Arc::new(HashEmbeddingsProvider::new(config.dimension)),
        ProviderKind::OpenAi => {
            let model = config
                .model
                .clone()
                .ok_or_else(|| anyhow::anyhow!("embeddings.model is required for the openai provider"))?;
            let api_key = config
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("embeddings.api_key is required for the openai provider"))?;
            Arc::new(OpenAiEmbeddingsProvider::new(
                model,
                api_key,
                config.base_url.clone(),
                config.dimension,
            ))
        }
    };

    tracing::info!(provider = provider.name(), dimension = provider.dimension(), "embedding provider ready");

    Ok(provider)
}
