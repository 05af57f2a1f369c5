//! Host-facing MCP endpoint
//!
//! Speaks newline-delimited JSON-RPC over any byte duplex; production
//! passes stdin/stdout. Each request runs in its own task and responses
//! funnel through a single writer task, so responses may appear in any
//! order relative to the requests that produced them.

use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::RouterState;
use crate::catalog::{CatalogEntry, SEARCH_TOOL_NAME};
use crate::error::RouterError;
use crate::protocol::{self, JsonRpcError, JsonRpcRequest, JsonRpcResponse, error_codes, methods};

/// Server name advertised during `initialize`
pub const SERVER_NAME: &str = "plexus";

/// Serve the host connection until EOF or shutdown
///
/// On shutdown (token cancelled or host EOF) in-flight requests are
/// cancelled, which also purges their upstream correlation entries.
pub async fn serve<R, W>(state: Arc<RouterState>, reader: R, writer: W, shutdown: CancellationToken) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::channel::<JsonRpcResponse>(64);

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(response) = out_rx.recv().await {
            let line = match serde_json::to_string(&response) {
                Ok(mut line) => {
                    line.push('\n');
                    line
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to encode response");
                    continue;
                }
            };
            if writer.write_all(line.as_bytes()).await.is_err() || writer.flush().await.is_err() {
                break;
            }
        }
    });

    // Cancelling this token fails outstanding upstream calls promptly
    let in_flight = shutdown.child_token();

    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!("shutdown requested, draining host connection");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    dispatch_line(&state, &line, &out_tx, &in_flight).await;
                }
                Ok(None) => {
                    tracing::info!("host closed its stream");
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "host read failed");
                    break;
                }
            },
        }
    }

    in_flight.cancel();
    drop(out_tx);
    let _ = writer_task.await;

    Ok(())
}

/// Parse one wire line and either answer inline or spawn a request task
async fn dispatch_line(
    state: &Arc<RouterState>,
    line: &str,
    out_tx: &mpsc::Sender<JsonRpcResponse>,
    in_flight: &CancellationToken,
) {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable request line");
            let response = JsonRpcResponse::error(
                None,
                JsonRpcError::new(error_codes::PARSE_ERROR, format!("parse error: {e}")),
            );
            let _ = out_tx.send(response).await;
            return;
        }
    };

    if request.jsonrpc != "2.0" {
        let response = JsonRpcResponse::error(
            request.id,
            JsonRpcError::new(error_codes::INVALID_REQUEST, "invalid JSON-RPC version"),
        );
        let _ = out_tx.send(response).await;
        return;
    }

    if request.is_notification() {
        tracing::debug!(method = %request.method, "host notification");
        return;
    }

    let state = Arc::clone(state);
    let out_tx = out_tx.clone();
    let cancel = in_flight.clone();
    tokio::spawn(async move {
        let response = handle_request(&state, request, &cancel).await;
        let _ = out_tx.send(response).await;
    });
}

async fn handle_request(state: &RouterState, request: JsonRpcRequest, cancel: &CancellationToken) -> JsonRpcResponse {
    let id = request.id.clone();

    let result = match request.method.as_str() {
        methods::INITIALIZE => Ok(initialize_result()),
        methods::PING => Ok(serde_json::json!({})),
        methods::TOOLS_LIST => Ok(tools_list(state)),
        methods::TOOLS_CALL => tools_call(state, request.params, cancel).await,
        other => Err(RouterError::MethodNotFound { name: other.to_string() }),
    };

    match result {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(e) => {
            tracing::warn!(method = %request.method, error = %e, "request failed");
            JsonRpcResponse::error(id, e.to_json_rpc())
        }
    }
}

fn initialize_result() -> Value {
    serde_json::json!({
        "protocolVersion": protocol::PROTOCOL_VERSION,
        "capabilities": {"tools": {}},
        "serverInfo": {"name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION")},
    })
}

/// `tools/list`: the built-in search tool plus the deterministic default
/// subset of the catalog
fn tools_list(state: &RouterState) -> Value {
    let mut tools = Vec::with_capacity(state.list_tools_count());

    if let Some(builtin) = state.catalog().lookup(SEARCH_TOOL_NAME) {
        tools.push(descriptor(builtin));
    }

    let remaining = state.list_tools_count().saturating_sub(tools.len());
    for name in state.index().default_subset(remaining) {
        if let Some(entry) = state.catalog().lookup(name) {
            tools.push(descriptor(entry));
        }
    }

    tracing::debug!(count = tools.len(), "returning default tool subset");
    serde_json::json!({"tools": tools})
}

fn descriptor(entry: &CatalogEntry) -> Value {
    serde_json::json!({
        "name": entry.public_name,
        "description": entry.description,
        "inputSchema": entry.input_schema,
    })
}

/// `tools/call`: the built-in is served locally, everything else resolves
/// through the catalog and dispatches to the owning session
async fn tools_call(state: &RouterState, params: Option<Value>, cancel: &CancellationToken) -> Result<Value, RouterError> {
    let params = params.ok_or_else(|| RouterError::InvalidParams("missing params".to_string()))?;
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| RouterError::InvalidParams("missing tool name".to_string()))?;
    let arguments = params.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));

    if name == SEARCH_TOOL_NAME {
        return search_tools(state, &arguments).await;
    }

    let Some(entry) = state.catalog().lookup(name) else {
        return Err(unknown_tool(state, name));
    };
    let Some(upstream_id) = entry.upstream_id.as_deref() else {
        // Only the built-in has no upstream, and it was handled above
        return Err(RouterError::MethodNotFound { name: name.to_string() });
    };

    let session = state.session(upstream_id).ok_or_else(|| RouterError::UpstreamClosed {
        name: name.to_string(),
        upstream_id: upstream_id.to_string(),
    })?;
    if !session.is_ready() {
        return Err(RouterError::UpstreamClosed {
            name: name.to_string(),
            upstream_id: upstream_id.to_string(),
        });
    }

    tracing::debug!(tool = name, upstream = upstream_id, "forwarding tool call");
    let deadline = Instant::now() + state.call_timeout();

    match session.call(&entry.native_name, arguments, deadline, cancel).await {
        Ok(result) => {
            tracing::info!(tool = name, upstream = upstream_id, "tool call succeeded");
            Ok(result)
        }
        Err(e) => {
            tracing::warn!(tool = name, upstream = upstream_id, error = %e, "tool call failed");
            Err(RouterError::from_session(e, name, upstream_id))
        }
    }
}

/// Distinguish a tool on an unavailable upstream from a name nothing owns
///
/// The public name splits at the first period; if the prefix belongs to a
/// configured upstream the tool is unreachable rather than unknown.
fn unknown_tool(state: &RouterState, name: &str) -> RouterError {
    if let Some((prefix, _)) = name.split_once('.') {
        if let Some(upstream_id) = state.upstream_for_prefix(prefix) {
            let ready = state.session(upstream_id).is_some_and(crate::session::UpstreamSession::is_ready);
            if !ready {
                return RouterError::UpstreamClosed {
                    name: name.to_string(),
                    upstream_id: upstream_id.to_string(),
                };
            }
        }
    }
    RouterError::MethodNotFound { name: name.to_string() }
}

/// Serve the built-in `search_tools` call
///
/// The ranked list is returned as a single text content block whose text
/// is the JSON-encoded list, for wire compatibility with clients that
/// expect plain text content.
async fn search_tools(state: &RouterState, arguments: &Value) -> Result<Value, RouterError> {
    let query = arguments
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| RouterError::InvalidParams("search_tools requires a 'query' string".to_string()))?;

    let context: Vec<String> = match arguments.get("context") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| RouterError::InvalidParams("context entries must be strings".to_string()))
            })
            .collect::<Result<_, _>>()?,
        Some(_) => {
            return Err(RouterError::InvalidParams("context must be an array of strings".to_string()));
        }
    };

    let hits = state.search().search(query, &context).await?;
    tracing::info!(query, results = hits.len(), "search_tools served");

    let list: Vec<Value> = hits
        .iter()
        .map(|hit| {
            serde_json::json!({
                "public_name": hit.public_name,
                "description": hit.description,
                "similarity": hit.similarity,
            })
        })
        .collect();

    Ok(serde_json::json!({
        "content": [{"type": "text", "text": Value::Array(list).to_string()}],
        "isError": false,
    }))
}
