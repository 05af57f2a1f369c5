use thiserror::Error;

/// Convenience result alias for this crate
pub type Result<T> = std::result::Result<T, EmbeddingsError>;

/// Embedding provider errors
///
/// Any of these during catalog construction is fatal for startup; during
/// search they surface to the host as a search-unavailable error.
#[derive(Debug, Error)]
pub enum EmbeddingsError {
    /// Input text was empty after trimming
    #[error("cannot embed empty text")]
    EmptyInput,

    /// The provider could not be reached
    #[error("embedding provider unreachable: {0}")]
    ConnectionError(String),

    /// The provider API rejected the request
    #[error("embedding provider returned {status}: {message}")]
    ProviderApiError { status: u16, message: String },

    /// The provider returned a vector of the wrong dimension
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The provider response could not be decoded
    #[error("malformed embedding provider response: {0}")]
    MalformedResponse(String),
}
