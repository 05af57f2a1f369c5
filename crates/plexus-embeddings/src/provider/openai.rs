use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::error::{EmbeddingsError, Result};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding provider backed by an OpenAI-compatible embeddings API
pub struct OpenAiEmbeddingsProvider {
    client: Client,
    model: String,
    api_key: SecretString,
    base_url: String,
    dimension: usize,
}

impl OpenAiEmbeddingsProvider {
    /// Create a new provider
    ///
    /// `base_url` falls back to the public `OpenAI` endpoint; point it at any
    /// compatible server for self-hosted models.
    pub fn new(model: String, api_key: SecretString, base_url: Option<String>, dimension: usize) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Self {
            client: Client::new(),
            model,
            api_key,
            base_url,
            dimension,
        }
    }
}

/// Wire format for the embeddings API request
#[derive(Serialize)]
struct WireRequest<'a> {
    input: &'a str,
    model: &'a str,
    encoding_format: &'static str,
    dimensions: usize,
}

/// Wire format for the embeddings API response
#[derive(Deserialize)]
struct WireResponse {
    data: Vec<WireEmbedding>,
}

#[derive(Deserialize)]
struct WireEmbedding {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingsProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(EmbeddingsError::EmptyInput);
        }

        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

        let wire_request = WireRequest {
            input: text,
            model: &self.model,
            encoding_format: "float",
            dimensions: self.dimension,
        };

        tracing::debug!(model = %self.model, "sending embeddings request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key.expose_secret()))
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(model = %self.model, error = %e, "embeddings request failed");
                EmbeddingsError::ConnectionError(format!("failed to reach embeddings API: {e}"))
            })?;

        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_else(|_| "unknown error".to_string());

            tracing::error!(model = %self.model, status = %status, "embeddings API error: {message}");

            return Err(EmbeddingsError::ProviderApiError {
                status: status.as_u16(),
                message,
            });
        }

        let wire_response: WireResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingsError::MalformedResponse(e.to_string()))?;

        let embedding = wire_response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EmbeddingsError::MalformedResponse("response contained no embeddings".to_string()))?;

        if embedding.len() != self.dimension {
            return Err(EmbeddingsError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "openai"
    }
}
