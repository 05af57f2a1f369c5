//! Test host driving the router over in-memory duplex pipes

use std::sync::Arc;
use std::time::Duration;

use plexus_mcp::RouterState;
use plexus_mcp::protocol::{JsonRpcId, JsonRpcResponse};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf};
use tokio_util::sync::CancellationToken;

/// A connected MCP host talking to an in-process router
pub struct TestHost {
    writer: WriteHalf<DuplexStream>,
    reader: tokio::io::Lines<BufReader<ReadHalf<DuplexStream>>>,
    next_id: i64,
    shutdown: CancellationToken,
}

impl TestHost {
    /// Start serving the given state and connect to it
    pub fn start(state: Arc<RouterState>) -> Self {
        let (host_side, server_side) = tokio::io::duplex(64 * 1024);
        let (host_reader, host_writer) = tokio::io::split(host_side);
        let (server_reader, server_writer) = tokio::io::split(server_side);

        let shutdown = CancellationToken::new();
        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = plexus_mcp::serve(state, server_reader, server_writer, serve_shutdown).await;
        });

        Self {
            writer: host_writer,
            reader: BufReader::new(host_reader).lines(),
            next_id: 0,
            shutdown,
        }
    }

    /// Issue a request and await its response, skipping interleaved ones
    pub async fn request(&mut self, method: &str, params: Value) -> JsonRpcResponse {
        self.next_id += 1;
        let id = self.next_id;
        let envelope = serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let mut line = envelope.to_string();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await.expect("host write");

        loop {
            let line = tokio::time::timeout(Duration::from_secs(10), self.reader.next_line())
                .await
                .expect("response within 10s")
                .expect("host read")
                .expect("router closed the stream");
            let response: JsonRpcResponse = serde_json::from_str(&line).expect("response must parse");
            if response.id == Some(JsonRpcId::Number(id)) {
                return response;
            }
        }
    }

    /// `tools/call` convenience wrapper
    pub async fn call(&mut self, name: &str, arguments: Value) -> JsonRpcResponse {
        self.request("tools/call", serde_json::json!({"name": name, "arguments": arguments}))
            .await
    }

    /// Tool names from a `tools/list` response, sorted
    pub fn tool_names(response: &JsonRpcResponse) -> Vec<String> {
        let mut names: Vec<String> = response.result.as_ref().expect("tools/list result")["tools"]
            .as_array()
            .expect("tools array")
            .iter()
            .map(|tool| tool["name"].as_str().expect("tool name").to_string())
            .collect();
        names.sort();
        names
    }
}

impl Drop for TestHost {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
