pub(crate) mod hash;
pub(crate) mod openai;

use async_trait::async_trait;

use crate::error::Result;

/// Trait for embedding provider implementations
///
/// Contracts: the output dimension is fixed for the lifetime of the
/// provider, the same input always yields the same vector, and `embed`
/// is safe to call concurrently. Vectors should be unit-normalized;
/// consumers normalize defensively regardless.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Map text to a fixed-dimension vector
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Output vector dimension
    fn dimension(&self) -> usize;

    /// Get the provider name
    fn name(&self) -> &str;
}
