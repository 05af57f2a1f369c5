//! Upstream session: one transport, one correlation table, one state machine
//!
//! The session handle is cheap to share; all mutable state (the correlation
//! table in particular) lives inside a single connection task, so no locking
//! discipline beyond message passing is needed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::catalog::NativeTool;
use crate::protocol::{self, methods};
use crate::transport::{Connector, Transport, TransportError};

/// How long `stop` waits for the connection task to acknowledge
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Session lifecycle states
///
/// `init → connecting → ready`; `ready ↔ degraded` on transient transport
/// errors (one reconnect attempt); `closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Init,
    Connecting,
    Ready,
    Degraded,
    Closed,
}

/// Errors from one upstream session
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport could not be opened
    #[error("upstream unreachable: {0}")]
    Unreachable(TransportError),

    /// The MCP initialization handshake was rejected or malformed
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The upstream's tool list could not be fetched
    #[error("tools/list failed: {0}")]
    ListToolsFailed(String),

    /// The per-call deadline elapsed
    #[error("upstream call timed out")]
    Timeout,

    /// The upstream answered with a protocol error; its code, message and
    /// data are carried through untouched
    #[error("upstream error {code}: {message}")]
    Upstream {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    /// The session is not (or no longer) ready
    #[error("upstream session closed")]
    Closed,

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,
}

/// Handle to a running upstream session
#[derive(Debug)]
pub struct UpstreamSession {
    id: String,
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<SessionStatus>,
    next_id: Arc<AtomicU64>,
}

enum Command {
    Request {
        id: u64,
        method: String,
        params: Value,
        reply: oneshot::Sender<Result<Value, SessionError>>,
    },
    /// Purge the correlation entry of a timed-out or cancelled call
    Cancel { id: u64 },
    Stop { done: oneshot::Sender<()> },
}

impl UpstreamSession {
    /// Open the transport, perform the MCP handshake, and fetch the
    /// upstream's tool list
    ///
    /// On success the session is `Ready`, its connection task is running,
    /// and the native tool list is returned alongside the handle.
    pub async fn start(upstream_id: impl Into<String>, connector: Connector) -> Result<(Self, Vec<NativeTool>), SessionError> {
        let upstream_id = upstream_id.into();
        let (status_tx, status_rx) = watch::channel(SessionStatus::Init);
        let next_id = Arc::new(AtomicU64::new(0));

        status_tx.send_replace(SessionStatus::Connecting);

        let mut transport = (connector)().await.map_err(SessionError::Unreachable)?;

        handshake(transport.as_mut(), &next_id).await?;
        let tools = list_tools(transport.as_mut(), &next_id).await?;

        status_tx.send_replace(SessionStatus::Ready);
        tracing::info!(upstream = %upstream_id, tools = tools.len(), "upstream session ready");

        let (commands_tx, commands_rx) = mpsc::channel(32);

        let connection = Connection {
            upstream_id: upstream_id.clone(),
            transport,
            connector,
            pending: HashMap::new(),
            status: status_tx,
            next_id: Arc::clone(&next_id),
            commands: commands_rx,
            reconnected: false,
        };
        tokio::spawn(connection.run());

        Ok((
            Self {
                id: upstream_id,
                commands: commands_tx,
                status: status_rx,
                next_id,
            },
            tools,
        ))
    }

    /// The upstream id this session serves
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Whether calls can currently be dispatched
    pub fn is_ready(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    /// Invoke a tool by its native (un-namespaced) name
    pub async fn call(
        &self,
        native_name: &str,
        arguments: Value,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Value, SessionError> {
        self.request(
            methods::TOOLS_CALL,
            serde_json::json!({"name": native_name, "arguments": arguments}),
            deadline,
            cancel,
        )
        .await
    }

    /// Submit a correlated request and await its response
    ///
    /// The deadline is absolute. On timeout or cancellation the correlation
    /// entry is purged so the table cannot accumulate dead waiters.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Value, SessionError> {
        if !self.is_ready() {
            return Err(SessionError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (reply_tx, mut reply_rx) = oneshot::channel();

        self.commands
            .send(Command::Request {
                id,
                method: method.to_string(),
                params,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Closed)?;

        tokio::select! {
            outcome = tokio::time::timeout_at(deadline, &mut reply_rx) => match outcome {
                Ok(Ok(result)) => result,
                // Connection task dropped the entry while closing
                Ok(Err(_)) => Err(SessionError::Closed),
                Err(_) => {
                    let _ = self.commands.try_send(Command::Cancel { id });
                    Err(SessionError::Timeout)
                }
            },
            () = cancel.cancelled() => {
                let _ = self.commands.try_send(Command::Cancel { id });
                Err(SessionError::Cancelled)
            }
        }
    }

    /// Initiate graceful shutdown
    ///
    /// Pending calls fail with [`SessionError::Closed`]; the transport is
    /// released. Waits briefly for the connection task to acknowledge.
    pub async fn stop(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Stop { done: done_tx }).await.is_ok() {
            let _ = tokio::time::timeout(STOP_WAIT, done_rx).await;
        }
    }
}

/// MCP initialization handshake: `initialize` request then the
/// `notifications/initialized` notification
async fn handshake(transport: &mut dyn Transport, next_id: &AtomicU64) -> Result<(), SessionError> {
    let id = next_id.fetch_add(1, Ordering::Relaxed) + 1;
    let init = protocol::request(
        id,
        methods::INITIALIZE,
        serde_json::json!({
            "protocolVersion": protocol::PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "plexus", "version": env!("CARGO_PKG_VERSION")},
        }),
    );

    transport
        .send(&init)
        .await
        .map_err(|e| SessionError::HandshakeFailed(e.to_string()))?;

    let response = await_response(transport, id).await.map_err(SessionError::HandshakeFailed)?;
    if let Err(e) = into_result(response) {
        return Err(SessionError::HandshakeFailed(e.to_string()));
    }

    transport
        .send(&protocol::notification(methods::INITIALIZED))
        .await
        .map_err(|e| SessionError::HandshakeFailed(e.to_string()))?;

    Ok(())
}

/// Fetch the upstream's native tool list
async fn list_tools(transport: &mut dyn Transport, next_id: &AtomicU64) -> Result<Vec<NativeTool>, SessionError> {
    let id = next_id.fetch_add(1, Ordering::Relaxed) + 1;
    let request = protocol::request(id, methods::TOOLS_LIST, serde_json::json!({}));

    transport
        .send(&request)
        .await
        .map_err(|e| SessionError::ListToolsFailed(e.to_string()))?;

    let response = await_response(transport, id).await.map_err(SessionError::ListToolsFailed)?;
    let result = into_result(response).map_err(|e| SessionError::ListToolsFailed(e.to_string()))?;

    let tools = result
        .get("tools")
        .and_then(Value::as_array)
        .ok_or_else(|| SessionError::ListToolsFailed("response carried no tools array".to_string()))?
        .iter()
        .filter_map(NativeTool::from_wire)
        .collect();

    Ok(tools)
}

/// Read messages until the response with the given id arrives
///
/// Notifications received meanwhile are logged and skipped.
async fn await_response(transport: &mut dyn Transport, id: u64) -> Result<Value, String> {
    loop {
        let message = transport
            .recv()
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| "connection closed before response".to_string())?;

        if protocol::is_response(&message) && protocol::response_id(&message) == Some(id) {
            return Ok(message);
        }

        tracing::debug!(message = %message, "skipping out-of-band message during startup");
    }
}

/// Split a response envelope into its result or carried error
fn into_result(message: Value) -> Result<Value, SessionError> {
    if let Some(error) = message.get("error") {
        return Err(SessionError::Upstream {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-32603) as i32,
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown upstream error")
                .to_string(),
            data: error.get("data").cloned(),
        });
    }
    Ok(message.get("result").cloned().unwrap_or(Value::Null))
}

/// The connection task: owns the transport and the correlation table
struct Connection {
    upstream_id: String,
    transport: Box<dyn Transport>,
    connector: Connector,
    pending: HashMap<u64, oneshot::Sender<Result<Value, SessionError>>>,
    status: watch::Sender<SessionStatus>,
    next_id: Arc<AtomicU64>,
    commands: mpsc::Receiver<Command>,
    /// Whether a reconnect already happened with no successful traffic since
    reconnected: bool,
}

impl Connection {
    async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Request { id, method, params, reply }) => {
                        let envelope = protocol::request(id, &method, params);
                        self.pending.insert(id, reply);
                        if let Err(e) = self.transport.send(&envelope).await {
                            tracing::warn!(upstream = %self.upstream_id, error = %e, "upstream send failed");
                            if !self.degrade().await {
                                break;
                            }
                        }
                    }
                    Some(Command::Cancel { id }) => {
                        self.pending.remove(&id);
                    }
                    Some(Command::Stop { done }) => {
                        self.shutdown().await;
                        let _ = done.send(());
                        break;
                    }
                    // Handle dropped: nothing can reach this session anymore
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },
                inbound = self.transport.recv() => match inbound {
                    Ok(Some(message)) => self.handle_message(message).await,
                    Ok(None) => {
                        tracing::info!(upstream = %self.upstream_id, "upstream closed its stream");
                        if !self.degrade().await {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(upstream = %self.upstream_id, error = %e, "upstream read failed");
                        if !self.degrade().await {
                            break;
                        }
                    }
                },
            }
        }
    }

    async fn handle_message(&mut self, message: Value) {
        if protocol::is_response(&message) {
            let Some(id) = protocol::response_id(&message) else {
                tracing::warn!(upstream = %self.upstream_id, "response without usable id");
                return;
            };
            match self.pending.remove(&id) {
                Some(reply) => {
                    self.reconnected = false;
                    let _ = reply.send(into_result(message));
                }
                // Late response to a timed-out or cancelled call
                None => tracing::debug!(upstream = %self.upstream_id, id, "uncorrelated response"),
            }
            return;
        }

        let method = message.get("method").and_then(Value::as_str).unwrap_or("");
        if let Some(id) = message.get("id").cloned() {
            // Upstreams may issue reverse requests (sampling etc); the
            // router does not support them
            tracing::debug!(upstream = %self.upstream_id, method, "rejecting reverse request");
            let reply = serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": protocol::error_codes::METHOD_NOT_FOUND,
                    "message": format!("method not supported by router: {method}"),
                },
            });
            if let Err(e) = self.transport.send(&reply).await {
                tracing::debug!(upstream = %self.upstream_id, error = %e, "failed to reject reverse request");
            }
        } else {
            tracing::debug!(upstream = %self.upstream_id, method, "upstream notification");
        }
    }

    /// Transition to `Degraded`, fail in-flight calls, and attempt at most
    /// one reconnect; returns whether the session recovered
    async fn degrade(&mut self) -> bool {
        self.status.send_replace(SessionStatus::Degraded);
        self.fail_pending();

        if self.reconnected {
            tracing::error!(upstream = %self.upstream_id, "second consecutive transport failure, closing session");
            self.close().await;
            return false;
        }
        self.reconnected = true;

        tracing::warn!(upstream = %self.upstream_id, "transport failure, attempting reconnect");
        self.transport.close().await;

        let reconnected = match (self.connector)().await {
            Ok(mut transport) => match handshake(transport.as_mut(), &self.next_id).await {
                Ok(()) => Some(transport),
                Err(e) => {
                    tracing::error!(upstream = %self.upstream_id, error = %e, "handshake replay failed");
                    None
                }
            },
            Err(e) => {
                tracing::error!(upstream = %self.upstream_id, error = %e, "reconnect failed");
                None
            }
        };

        match reconnected {
            Some(transport) => {
                self.transport = transport;
                self.status.send_replace(SessionStatus::Ready);
                tracing::info!(upstream = %self.upstream_id, "reconnected");
                true
            }
            None => {
                tracing::error!(upstream = %self.upstream_id, "closing session");
                self.close().await;
                false
            }
        }
    }

    fn fail_pending(&mut self) {
        for (_, reply) in self.pending.drain() {
            let _ = reply.send(Err(SessionError::Closed));
        }
    }

    async fn close(&mut self) {
        self.transport.close().await;
        self.fail_pending();
        self.status.send_replace(SessionStatus::Closed);
    }

    async fn shutdown(&mut self) {
        tracing::info!(upstream = %self.upstream_id, "stopping upstream session");
        self.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockUpstream;

    fn mock() -> MockUpstream {
        MockUpstream::new(vec![
            MockUpstream::tool("one", "first tool"),
            MockUpstream::tool("two", "second tool"),
        ])
    }

    async fn started_session() -> (UpstreamSession, Vec<NativeTool>) {
        UpstreamSession::start("mock", mock().connector())
            .await
            .expect("session start")
    }

    fn in_30s() -> Instant {
        Instant::now() + Duration::from_secs(30)
    }

    #[tokio::test]
    async fn start_yields_tools_and_ready() {
        let (session, tools) = started_session().await;
        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "one");
        assert_eq!(tools[1].description, "second tool");
    }

    #[tokio::test]
    async fn call_returns_upstream_result_verbatim() {
        let (session, _) = started_session().await;
        let cancel = CancellationToken::new();

        let result = session
            .call("one", serde_json::json!({"url": "https://x"}), in_30s(), &cancel)
            .await
            .unwrap();

        assert_eq!(result["content"][0]["text"], "one");
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn responses_correlate_out_of_wire_order() {
        let (session, _) = started_session().await;
        let session = Arc::new(session);
        let cancel = CancellationToken::new();

        let deferred = {
            let session = Arc::clone(&session);
            let cancel = cancel.clone();
            tokio::spawn(async move { session.call("defer", Value::Null, in_30s(), &cancel).await })
        };
        // Give the deferred call time to reach the mock first
        tokio::time::sleep(Duration::from_millis(50)).await;

        let prompt = session.call("one", Value::Null, in_30s(), &cancel).await.unwrap();
        assert_eq!(prompt["content"][0]["text"], "one");

        let deferred = deferred.await.unwrap().unwrap();
        assert_eq!(deferred["content"][0]["text"], "defer");
    }

    #[tokio::test]
    async fn deadline_elapsing_yields_timeout() {
        let (session, _) = started_session().await;
        let cancel = CancellationToken::new();

        let deadline = Instant::now() + Duration::from_millis(100);
        let err = session.call("never", Value::Null, deadline, &cancel).await.unwrap_err();
        assert!(matches!(err, SessionError::Timeout));

        // The session stays usable for other calls
        let result = session.call("one", Value::Null, in_30s(), &cancel).await.unwrap();
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn upstream_error_is_carried_through() {
        let (session, _) = started_session().await;
        let cancel = CancellationToken::new();

        let err = session.call("fail", Value::Null, in_30s(), &cancel).await.unwrap_err();
        match err {
            SessionError::Upstream { code, message, data } => {
                assert_eq!(code, -32050);
                assert_eq!(message, "boom");
                assert_eq!(data.unwrap()["detail"], "broken");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_fails_fast() {
        let (session, _) = started_session().await;
        let cancel = CancellationToken::new();

        let call = {
            let cancel = cancel.clone();
            async move { session.call("never", Value::Null, in_30s(), &cancel).await }
        };
        let call = tokio::spawn(call);

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let err = tokio::time::timeout(Duration::from_secs(1), call)
            .await
            .expect("cancelled call must resolve promptly")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, SessionError::Cancelled));
    }

    #[tokio::test]
    async fn lost_transport_without_reconnect_closes_session() {
        let (session, _) = started_session().await;
        let cancel = CancellationToken::new();

        // The mock drops the connection; the one-shot connector refuses to
        // reconnect, so the session must end up closed
        let err = session.call("disconnect", Value::Null, in_30s(), &cancel).await.unwrap_err();
        assert!(matches!(err, SessionError::Closed));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.status(), SessionStatus::Closed);

        let err = session.call("one", Value::Null, in_30s(), &cancel).await.unwrap_err();
        assert!(matches!(err, SessionError::Closed));
    }

    #[tokio::test]
    async fn lost_transport_recovers_through_reconnect() {
        let (session, _) = UpstreamSession::start("mock", mock().reconnecting_connector())
            .await
            .expect("session start");
        let cancel = CancellationToken::new();

        // The in-flight call is failed by the disconnect, but the session
        // replays the handshake on a fresh connection and returns to ready
        let err = session.call("disconnect", Value::Null, in_30s(), &cancel).await.unwrap_err();
        assert!(matches!(err, SessionError::Closed));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.status(), SessionStatus::Ready);

        let result = session.call("one", Value::Null, in_30s(), &cancel).await.unwrap();
        assert_eq!(result["isError"], false);
    }

    #[tokio::test]
    async fn stop_closes_the_session() {
        let (session, _) = started_session().await;
        session.stop().await;
        assert_eq!(session.status(), SessionStatus::Closed);

        let cancel = CancellationToken::new();
        let err = session.call("one", Value::Null, in_30s(), &cancel).await.unwrap_err();
        assert!(matches!(err, SessionError::Closed));
    }

    #[tokio::test]
    async fn unreachable_connector_fails_start() {
        let connector: Connector =
            Box::new(|| Box::pin(async { Err(TransportError::Connect("no such binary".to_string())) }));
        let err = UpstreamSession::start("ghost", connector).await.unwrap_err();
        assert!(matches!(err, SessionError::Unreachable(_)));
    }
}
