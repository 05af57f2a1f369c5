//! In-process scripted MCP upstream for tests
//!
//! Drives real newline-delimited framing through `tokio::io::duplex`
//! pipes, so sessions and the router exercise the same code paths they use
//! against child processes. Used by this crate's own tests and by the
//! integration harness.

#![doc(hidden)]

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use crate::transport::{Connector, StreamTransport, Transport, TransportError};

/// A scripted upstream MCP server
///
/// Answers `initialize` and `tools/list`, then echoes `tools/call`
/// requests. A handful of tool names trigger scripted behavior:
///
/// - `never` — the call is never answered
/// - `fail` — an error response with code -32050
/// - `defer` — the response is held back until the next ordinary call is
///   answered, producing out-of-order wire traffic
/// - `disconnect` — the upstream drops the connection
#[derive(Clone)]
pub struct MockUpstream {
    tools: Vec<Value>,
}

impl MockUpstream {
    pub fn new(tools: Vec<Value>) -> Self {
        Self { tools }
    }

    /// Wire-format tool descriptor
    pub fn tool(name: &str, description: &str) -> Value {
        serde_json::json!({
            "name": name,
            "description": description,
            "inputSchema": {
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"],
            },
        })
    }

    /// Connector yielding exactly one connection; reconnect attempts fail
    pub fn connector(self) -> Connector {
        let slot = std::sync::Mutex::new(Some(self.connect()));
        Box::new(move || {
            let taken = slot.lock().expect("connector lock").take();
            Box::pin(async move {
                taken.ok_or_else(|| TransportError::Connect("mock upstream refuses to reconnect".to_string()))
            })
        })
    }

    /// Connector that serves a fresh scripted connection on every call
    pub fn reconnecting_connector(self) -> Connector {
        Box::new(move || {
            let transport = self.clone().connect();
            Box::pin(async move { Ok(transport) })
        })
    }

    /// Spawn one scripted connection and return the client-side transport
    pub fn connect(self) -> Box<dyn Transport> {
        let (client, server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(self.serve(server));
        let (read, write) = tokio::io::split(client);
        Box::new(StreamTransport::new(read, write))
    }

    async fn serve(self, stream: DuplexStream) {
        let (read, write) = tokio::io::split(stream);
        let mut lines = BufReader::new(read).lines();
        let mut writer = write;
        let mut deferred: Option<u64> = None;

        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let message: Value = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(_) => continue,
            };
            let Some(method) = message.get("method").and_then(Value::as_str) else {
                continue;
            };
            let Some(id) = message.get("id").and_then(Value::as_u64) else {
                continue; // notification
            };

            let reply = match method {
                "initialize" => serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "mock-upstream", "version": "0.0.0"},
                    },
                }),
                "tools/list" => serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {"tools": self.tools.clone()},
                }),
                "tools/call" => {
                    let name = message["params"]["name"].as_str().unwrap_or("");
                    match name {
                        "never" => continue,
                        "defer" => {
                            deferred = Some(id);
                            continue;
                        }
                        "disconnect" => return,
                        "fail" => serde_json::json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": {"code": -32050, "message": "boom", "data": {"detail": "broken"}},
                        }),
                        _ => serde_json::json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "content": [{"type": "text", "text": name}],
                                "isError": false,
                                // Echo the arguments so tests can assert the
                                // router forwards them untouched
                                "arguments": message["params"]["arguments"],
                            },
                        }),
                    }
                }
                _ => continue,
            };

            if write_line(&mut writer, &reply).await.is_err() {
                return;
            }

            if let Some(deferred_id) = deferred.take_if(|d| *d != id) {
                let late = serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": deferred_id,
                    "result": {
                        "content": [{"type": "text", "text": "defer"}],
                        "isError": false,
                    },
                });
                if write_line(&mut writer, &late).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn write_line<W: tokio::io::AsyncWrite + Unpin>(writer: &mut W, message: &Value) -> std::io::Result<()> {
    let mut line = message.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await
}
