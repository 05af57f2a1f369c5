use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::error::{EmbeddingsError, Result};
use crate::vector;

/// Deterministic in-process embedding provider
///
/// Hashes whitespace-separated tokens into a fixed-dimension bag-of-words
/// vector. No model download, no network, byte-identical output per input,
/// which makes it the default for development and the test suites. Semantic
/// quality is limited to lexical overlap; production deployments configure
/// a real provider instead.
pub struct HashEmbeddingsProvider {
    dimension: usize,
}

impl HashEmbeddingsProvider {
    /// Create a provider emitting vectors of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingsError::EmptyInput);
        }

        let mut vector = vec![0.0f32; self.dimension];

        for token in tokens(text) {
            let h = fnv1a(token.as_bytes());
            let bucket = (h % self.dimension as u64) as usize;
            // Second hash decides the sign so common buckets don't all
            // reinforce each other
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        vector::normalize(&mut vector);
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingsProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_sync(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Lowercased alphanumeric tokens of the input
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// 64-bit FNV-1a
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_input_same_vector() {
        let provider = HashEmbeddingsProvider::new(64);
        let a = provider.embed("navigate to a URL").await.unwrap();
        let b = provider.embed("navigate to a URL").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn output_is_unit_normalized() {
        let provider = HashEmbeddingsProvider::new(64);
        let v = provider.embed("take a screenshot of the page").await.unwrap();
        let norm = vector::dot(&v, &v).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn overlapping_text_scores_higher() {
        let provider = HashEmbeddingsProvider::new(256);
        let query = provider.embed("open a web page").await.unwrap();
        let navigate = provider.embed("navigate open a web page URL").await.unwrap();
        let screenshot = provider.embed("capture screenshot image").await.unwrap();

        assert!(vector::dot(&query, &navigate) > vector::dot(&query, &screenshot));
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let provider = HashEmbeddingsProvider::new(64);
        let err = provider.embed("   ").await.unwrap_err();
        assert!(matches!(err, EmbeddingsError::EmptyInput));
    }

    #[tokio::test]
    async fn dimension_is_respected() {
        let provider = HashEmbeddingsProvider::new(17);
        let v = provider.embed("anything").await.unwrap();
        assert_eq!(v.len(), 17);
    }
}
