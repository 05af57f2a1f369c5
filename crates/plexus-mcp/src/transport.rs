//! Upstream transports
//!
//! A transport is the capability set `{send, recv, close}` over JSON
//! messages. Concrete variants cover child processes on stdio, plain HTTP
//! request/response, and HTTP with a long-lived SSE event stream. Tests use
//! [`StreamTransport`] directly over in-memory duplex pipes.

pub(crate) mod http;
pub(crate) mod sse;
pub(crate) mod stdio;

use async_trait::async_trait;
use futures::future::BoxFuture;
use plexus_config::TransportConfig;
use serde_json::Value;
use thiserror::Error;

pub use stdio::StreamTransport;

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport could not be opened
    #[error("failed to open transport: {0}")]
    Connect(String),

    /// Read or write on an established transport failed
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame arrived that is not a JSON object
    #[error("malformed frame: {0}")]
    Frame(String),

    /// The transport is closed
    #[error("transport closed")]
    Closed,
}

/// A bidirectional JSON message channel to one upstream
#[async_trait]
pub trait Transport: Send {
    /// Send one message
    async fn send(&mut self, message: &Value) -> Result<(), TransportError>;

    /// Receive the next inbound message
    ///
    /// `Ok(None)` signals clean end-of-stream.
    async fn recv(&mut self) -> Result<Option<Value>, TransportError>;

    /// Release the underlying resources
    async fn close(&mut self);
}

/// Factory that opens a fresh transport for one upstream descriptor
///
/// Sessions hold a connector rather than a transport so they can re-open
/// the same descriptor after a transient failure.
pub type Connector = Box<dyn Fn() -> BoxFuture<'static, Result<Box<dyn Transport>, TransportError>> + Send + Sync>;

/// Build a connector for the configured transport
pub fn connector_for(config: &TransportConfig) -> Connector {
    match config {
        TransportConfig::Stdio(stdio) => {
            let stdio = stdio.clone();
            Box::new(move || {
                let stdio = stdio.clone();
                Box::pin(async move { stdio::spawn(&stdio).await })
            })
        }
        TransportConfig::Http(config) => {
            let url = config.endpoint.clone();
            Box::new(move || {
                let url = url.clone();
                Box::pin(async move { http::connect(url) })
            })
        }
        TransportConfig::Sse(config) => {
            let url = config.endpoint.clone();
            Box::new(move || {
                let url = url.clone();
                Box::pin(async move { sse::connect(url).await })
            })
        }
    }
}
