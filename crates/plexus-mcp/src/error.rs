use plexus_embeddings::EmbeddingsError;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{JsonRpcError, error_codes};
use crate::session::SessionError;

/// Router errors
///
/// The first group maps onto JSON-RPC errors surfaced to the host for a
/// single request; the fatal group aborts startup and never reaches the
/// wire.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Missing or malformed arguments on a host call
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Unknown tool or method name
    #[error("unknown tool: {name}")]
    MethodNotFound { name: String },

    /// Deadline elapsed waiting for the upstream response
    #[error("call to '{name}' on upstream '{upstream_id}' timed out")]
    UpstreamTimeout { name: String, upstream_id: String },

    /// The upstream returned a protocol error; carried through in data
    #[error("upstream '{upstream_id}' failed '{name}': {message}")]
    UpstreamError {
        name: String,
        upstream_id: String,
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// The owning session is not ready
    #[error("upstream '{upstream_id}' is not available for '{name}'")]
    UpstreamClosed { name: String, upstream_id: String },

    /// The host request was cancelled
    #[error("request cancelled")]
    Cancelled,

    /// Embedding failure while serving a search
    #[error("semantic search unavailable: {0}")]
    SearchUnavailable(EmbeddingsError),

    /// Fatal: two upstreams produced the same public tool name
    #[error("duplicate public tool name: {name}")]
    CatalogConflict { name: String },

    /// Fatal: the embedding provider failed while building the index
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(#[from] EmbeddingsError),

    /// Fatal: every configured upstream failed to start
    #[error("all configured upstreams failed to start")]
    AllUpstreamsFailed,
}

impl RouterError {
    /// Translate a session error at the dispatch boundary, attaching the
    /// public tool name and owning upstream id
    pub fn from_session(error: SessionError, name: &str, upstream_id: &str) -> Self {
        match error {
            SessionError::Timeout => Self::UpstreamTimeout {
                name: name.to_string(),
                upstream_id: upstream_id.to_string(),
            },
            SessionError::Upstream { code, message, data } => Self::UpstreamError {
                name: name.to_string(),
                upstream_id: upstream_id.to_string(),
                code,
                message,
                data,
            },
            SessionError::Cancelled => Self::Cancelled,
            SessionError::Closed
            | SessionError::Unreachable(_)
            | SessionError::HandshakeFailed(_)
            | SessionError::ListToolsFailed(_) => Self::UpstreamClosed {
                name: name.to_string(),
                upstream_id: upstream_id.to_string(),
            },
        }
    }

    /// Wire representation per the router's error taxonomy
    pub fn to_json_rpc(&self) -> JsonRpcError {
        match self {
            Self::InvalidParams(message) => JsonRpcError::new(error_codes::INVALID_PARAMS, message.clone()),

            Self::MethodNotFound { name } => JsonRpcError::with_data(
                error_codes::METHOD_NOT_FOUND,
                self.to_string(),
                serde_json::json!({"name": name}),
            ),

            Self::UpstreamTimeout { name, upstream_id } => JsonRpcError::with_data(
                error_codes::SERVER_ERROR,
                self.to_string(),
                serde_json::json!({"name": name, "upstreamId": upstream_id}),
            ),

            Self::UpstreamError {
                name,
                upstream_id,
                code,
                message,
                data,
            } => JsonRpcError::with_data(
                error_codes::INTERNAL_ERROR,
                self.to_string(),
                serde_json::json!({
                    "name": name,
                    "upstreamId": upstream_id,
                    "upstreamError": {"code": code, "message": message, "data": data},
                }),
            ),

            Self::UpstreamClosed { name, upstream_id } => JsonRpcError::with_data(
                error_codes::SERVER_ERROR,
                self.to_string(),
                serde_json::json!({"name": name, "upstreamId": upstream_id}),
            ),

            Self::Cancelled => JsonRpcError::new(error_codes::SERVER_ERROR, self.to_string()),

            Self::SearchUnavailable(_) => JsonRpcError::new(error_codes::SERVER_ERROR, self.to_string()),

            // Fatal startup errors never reach the wire; mapping them keeps
            // the conversion total
            Self::CatalogConflict { .. } | Self::EmbeddingUnavailable(_) | Self::AllUpstreamsFailed => {
                JsonRpcError::new(error_codes::INTERNAL_ERROR, self.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_carries_the_name() {
        let error = RouterError::MethodNotFound {
            name: "nope.thing".to_string(),
        };
        let wire = error.to_json_rpc();
        assert_eq!(wire.code, -32601);
        assert_eq!(wire.data.unwrap()["name"], "nope.thing");
    }

    #[test]
    fn timeout_carries_upstream_id() {
        let error = RouterError::from_session(SessionError::Timeout, "a.one", "A");
        let wire = error.to_json_rpc();
        assert_eq!(wire.code, -32000);
        let data = wire.data.unwrap();
        assert_eq!(data["name"], "a.one");
        assert_eq!(data["upstreamId"], "A");
    }

    #[test]
    fn upstream_error_is_wrapped_not_replaced() {
        let error = RouterError::from_session(
            SessionError::Upstream {
                code: -32050,
                message: "boom".to_string(),
                data: Some(serde_json::json!({"detail": 7})),
            },
            "a.one",
            "A",
        );
        let wire = error.to_json_rpc();
        assert_eq!(wire.code, -32603);
        let data = wire.data.unwrap();
        assert_eq!(data["upstreamError"]["code"], -32050);
        assert_eq!(data["upstreamError"]["message"], "boom");
        assert_eq!(data["upstreamError"]["data"]["detail"], 7);
    }

    #[test]
    fn closed_session_maps_to_server_error() {
        let error = RouterError::from_session(SessionError::Closed, "b.one", "B");
        assert_eq!(error.to_json_rpc().code, -32000);
    }
}
