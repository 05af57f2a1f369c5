//! HTTP + SSE transport
//!
//! Inbound messages arrive on a long-lived `text/event-stream` GET. The
//! stream's first `endpoint` event names the URL outbound messages are
//! POSTed to, per the MCP SSE transport convention.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use super::{Transport, TransportError};

/// How long to wait for the server to announce its endpoint
const ENDPOINT_WAIT: std::time::Duration = std::time::Duration::from_secs(10);

pub struct SseTransport {
    client: reqwest::Client,
    post_url: Url,
    events_rx: mpsc::Receiver<Value>,
    reader: JoinHandle<()>,
}

/// Open the event stream and wait for the endpoint announcement
pub(crate) async fn connect(url: Url) -> Result<Box<dyn Transport>, TransportError> {
    let client = reqwest::Client::new();

    let response = client
        .get(url.clone())
        .header("Accept", "text/event-stream")
        .send()
        .await
        .map_err(|e| TransportError::Connect(format!("SSE connection failed: {e}")))?
        .error_for_status()
        .map_err(|e| TransportError::Connect(format!("SSE endpoint rejected the stream: {e}")))?;

    let (events_tx, events_rx) = mpsc::channel(64);
    let (endpoint_tx, endpoint_rx) = oneshot::channel();

    let reader = tokio::spawn(read_events(response, events_tx, endpoint_tx));

    let endpoint = tokio::time::timeout(ENDPOINT_WAIT, endpoint_rx)
        .await
        .map_err(|_| TransportError::Connect("timed out waiting for SSE endpoint event".to_string()))?
        .map_err(|_| TransportError::Connect("SSE stream ended before announcing an endpoint".to_string()))?;

    let post_url = url
        .join(&endpoint)
        .map_err(|e| TransportError::Connect(format!("invalid SSE endpoint '{endpoint}': {e}")))?;

    Ok(Box::new(SseTransport {
        client,
        post_url,
        events_rx,
        reader,
    }))
}

/// Pump the response body through the event parser
async fn read_events(response: reqwest::Response, events: mpsc::Sender<Value>, endpoint: oneshot::Sender<String>) {
    let mut endpoint = Some(endpoint);
    let mut stream = response.bytes_stream();
    let mut parser = EventParser::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::warn!(error = %e, "SSE stream read failed");
                break;
            }
        };

        for event in parser.push(&String::from_utf8_lossy(&chunk)) {
            match event {
                SseEvent::Endpoint(url) => {
                    if let Some(tx) = endpoint.take() {
                        let _ = tx.send(url);
                    }
                }
                SseEvent::Message(message) => {
                    if events.send(message).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

/// A parsed server-sent event the transport cares about
#[derive(Debug, PartialEq)]
enum SseEvent {
    /// The `endpoint` event carrying the POST URL
    Endpoint(String),
    /// A JSON protocol message
    Message(Value),
}

/// Incremental `text/event-stream` parser
///
/// Handles `event:`/`data:` fields and blank-line dispatch; comments and
/// `id:`/`retry:` fields are ignored. Multi-line data joins with `\n`.
#[derive(Default)]
struct EventParser {
    buffer: String,
    event_name: String,
    data_lines: Vec<String>,
}

impl EventParser {
    /// Feed one chunk; returns every event completed by it
    fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line = self.buffer[..newline].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(name) = line.strip_prefix("event:") {
                self.event_name = name.trim().to_string();
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data_lines.push(data.trim_start().to_string());
            }
            // comments (":"), "id:" and "retry:" are intentionally ignored
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            self.event_name.clear();
            return None;
        }
        let data = self.data_lines.join("\n");
        let name = std::mem::take(&mut self.event_name);
        self.data_lines.clear();

        if name == "endpoint" {
            return Some(SseEvent::Endpoint(data));
        }

        match serde_json::from_str(&data) {
            Ok(message) => Some(SseEvent::Message(message)),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring non-JSON SSE event");
                None
            }
        }
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&mut self, message: &Value) -> Result<(), TransportError> {
        self.client
            .post(self.post_url.clone())
            .json(message)
            .send()
            .await
            .map_err(|e| TransportError::Connect(format!("SSE post failed: {e}")))?
            .error_for_status()
            .map_err(|e| TransportError::Frame(format!("SSE post rejected: {e}")))?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Value>, TransportError> {
        Ok(self.events_rx.recv().await)
    }

    async fn close(&mut self) {
        self.reader.abort();
        self.events_rx.close();
    }
}
