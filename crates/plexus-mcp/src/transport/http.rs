//! Plain HTTP request/response transport
//!
//! Each outbound request is one POST; the response body feeds the inbound
//! queue so the session's correlation table still keys by id. POSTs run in
//! spawned tasks, so calls to the same upstream pipeline freely.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use url::Url;

use super::{Transport, TransportError};
use crate::protocol;

pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    inbound_tx: mpsc::Sender<Value>,
    inbound_rx: mpsc::Receiver<Value>,
}

/// Create an HTTP transport for the given endpoint
///
/// No connection is established eagerly; an unreachable endpoint surfaces
/// on the first request.
pub(crate) fn connect(url: Url) -> Result<Box<dyn Transport>, TransportError> {
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    Ok(Box::new(HttpTransport {
        client: reqwest::Client::new(),
        url,
        inbound_tx,
        inbound_rx,
    }))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        let client = self.client.clone();
        let url = self.url.clone();
        let inbound = self.inbound_tx.clone();
        let message = message.clone();
        let id = message.get("id").and_then(Value::as_u64);
        let expects_reply = id.is_some();

        tokio::spawn(async move {
            let result = async {
                let response = client.post(url).json(&message).send().await?;
                let response = response.error_for_status()?;
                if expects_reply {
                    let body: Value = response.json().await?;
                    return Ok::<Option<Value>, reqwest::Error>(Some(body));
                }
                Ok(None)
            }
            .await;

            match result {
                Ok(Some(body)) => {
                    let _ = inbound.send(body).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "HTTP upstream request failed");
                    // Synthesize an error response so the waiting call fails
                    // promptly instead of running out its deadline
                    if let Some(id) = id {
                        let synthesized = serde_json::json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {
                                "code": protocol::error_codes::SERVER_ERROR,
                                "message": format!("upstream HTTP request failed: {e}"),
                            },
                        });
                        let _ = inbound.send(synthesized).await;
                    }
                }
            }
        });

        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        match self.inbound_rx.recv().await {
            Some(message) => Ok(Some(message)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.inbound_rx.close();
    }
}
