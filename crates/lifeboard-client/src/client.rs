//! Protocol session layered over the socket transport.
//!
//! [`LifecycleClient`] drives the connection lifecycle end to end: it dials
//! through a [`SocketManager`], performs the `initialize` handshake on every
//! fresh socket (including reconnects), correlates requests to responses by
//! id, and fans server notifications out to subscribers.
//!
//! Request ids are seeded at 1 per socket session and the pending-request
//! map lives inside the session, so a response arriving after a reconnect
//! can never settle a request from the previous socket.

use crate::protocol::{
    ClientInfo, InboundFrame, InitializeParams, InitializeResult, NotificationFrame, RequestFrame,
    ResponseFrame, PROTOCOL_VERSION,
};
use crate::state::{ConnectionState, StateCell};
use crate::transport::{Dialer, ReconnectPolicy, SessionId, SocketEvent, SocketManager, WsDialer};
use lifeboard_core::{LifeboardError, LifeboardResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ── Configuration ───────────────────────────────────────────────────────────

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_client_name() -> String {
    "lifeboard".into()
}

/// Configuration for a [`LifecycleClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// WebSocket endpoint of the lifecycle server, e.g. `ws://host:3917/mcp`.
    pub endpoint: String,
    /// Default timeout in milliseconds for a single request.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Client name reported during the handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Reconnection behaviour after an established socket drops.
    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl ClientConfig {
    /// Creates a config for `endpoint` with default timeouts and reconnect
    /// behaviour.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            request_timeout_ms: default_request_timeout_ms(),
            client_name: default_client_name(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

// ── Session bookkeeping ─────────────────────────────────────────────────────

/// Per-socket protocol state. Replaced wholesale on every reconnect.
struct Session {
    id: SessionId,
    /// Next request id; starts at 1 on every fresh socket.
    next_id: u64,
    pending: HashMap<u64, oneshot::Sender<ResponseFrame>>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            next_id: 1,
            pending: HashMap::new(),
        }
    }
}

/// Why the last connect attempt ended without reaching `Ready`.
#[derive(Debug, Clone)]
enum FailureReason {
    Handshake(String),
    Transport(String),
}

struct ClientShared {
    config: ClientConfig,
    manager: SocketManager,
    state: StateCell,
    session: Mutex<Option<Session>>,
    notifications_tx: broadcast::Sender<NotificationFrame>,
    handshake_info: RwLock<Option<InitializeResult>>,
    last_failure: RwLock<Option<FailureReason>>,
}

// ── Client ──────────────────────────────────────────────────────────────────

/// A client session to one lifecycle server.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.
pub struct LifecycleClient {
    shared: Arc<ClientShared>,
    dispatch: JoinHandle<()>,
}

impl LifecycleClient {
    /// Creates a client that dials real WebSocket connections.
    /// No connection is attempted until [`connect`](Self::connect).
    pub fn new(config: ClientConfig) -> Self {
        Self::with_dialer(config, Box::new(WsDialer))
    }

    /// Creates a client with a custom [`Dialer`]. Used by tests to run the
    /// full lifecycle against scripted sockets.
    pub fn with_dialer(config: ClientConfig, dialer: Box<dyn Dialer>) -> Self {
        let manager = SocketManager::new(dialer, config.endpoint.clone(), config.reconnect.clone());
        let events = manager.subscribe();
        let (notifications_tx, _) = broadcast::channel(256);
        let shared = Arc::new(ClientShared {
            config,
            manager,
            state: StateCell::new(),
            session: Mutex::new(None),
            notifications_tx,
            handshake_info: RwLock::new(None),
            last_failure: RwLock::new(None),
        });
        let dispatch = tokio::spawn(Self::dispatch_loop(Arc::clone(&shared), events));
        Self { shared, dispatch }
    }

    /// Connects and completes the protocol handshake.
    ///
    /// Idempotent: returns immediately when already `Ready`, and concurrent
    /// callers share the same underlying attempt. On failure the error
    /// carries the handshake or transport reason.
    pub async fn connect(&self) -> LifeboardResult<()> {
        let state = self.shared.state.get();
        if state == ConnectionState::Ready {
            return Ok(());
        }
        *self.shared.last_failure.write() = None;
        let mut states = self.shared.state.subscribe();

        if matches!(state, ConnectionState::Disconnected | ConnectionState::Failed) {
            self.shared.state.transition(ConnectionState::Connecting);
        }
        if let Err(e) = self.shared.manager.connect().await {
            self.shared.state.transition(ConnectionState::Disconnected);
            return Err(e);
        }

        loop {
            match *states.borrow_and_update() {
                ConnectionState::Ready => return Ok(()),
                ConnectionState::Failed => {
                    return Err(Self::failure_error(&self.shared, "connection failed"));
                }
                ConnectionState::Disconnected => {
                    return Err(Self::failure_error(
                        &self.shared,
                        "connection closed before becoming ready",
                    ));
                }
                _ => {}
            }
            if states.changed().await.is_err() {
                return Err(LifeboardError::ConnectionLost("client was shut down".into()));
            }
        }
    }

    /// Closes the connection and suppresses reconnection.
    ///
    /// Every in-flight request is settled with `ConnectionLost` before this
    /// returns, and the client rests at `Disconnected`.
    pub async fn disconnect(&self) {
        info!("client disconnect requested");
        self.shared.manager.disconnect().await;
        let mut states = self.shared.state.subscribe();
        loop {
            if *states.borrow_and_update() == ConnectionState::Disconnected {
                return;
            }
            if states.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sends a request and waits for its response using the configured
    /// default timeout.
    pub async fn request(&self, method: &str, params: Option<Value>) -> LifeboardResult<Value> {
        self.request_with_timeout(method, params, self.shared.config.request_timeout_ms)
            .await
    }

    /// Sends a request and waits up to `timeout_ms` for its response.
    ///
    /// Refused unless the client is `Ready`. On timeout the pending entry is
    /// removed so a late response is ignored rather than resolved.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> LifeboardResult<Value> {
        let state = self.shared.state.get();
        if state != ConnectionState::Ready {
            return Err(LifeboardError::NotConnected(format!(
                "client is {state}, not ready"
            )));
        }
        let session_id = {
            let guard = self.shared.session.lock().await;
            match guard.as_ref() {
                Some(session) => session.id,
                None => return Err(LifeboardError::NotConnected("no active session".into())),
            }
        };
        let resp = Self::raw_request(&self.shared, session_id, method, params, timeout_ms).await?;
        Self::settle(resp)
    }

    /// Sends a fire-and-forget notification. Refused unless `Ready`.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> LifeboardResult<()> {
        let state = self.shared.state.get();
        if state != ConnectionState::Ready {
            return Err(LifeboardError::NotConnected(format!(
                "client is {state}, not ready"
            )));
        }
        let guard = self.shared.session.lock().await;
        let session = guard
            .as_ref()
            .ok_or_else(|| LifeboardError::NotConnected("no active session".into()))?;
        let frame = NotificationFrame::new(method, params);
        let text = serde_json::to_string(&frame)?;
        self.shared.manager.send(session.id, text).await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Whether the client is `Ready` to carry requests.
    pub fn is_ready(&self) -> bool {
        self.shared.state.get().is_ready()
    }

    /// Subscribes to lifecycle state changes.
    pub fn subscribe_states(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Subscribes to server-initiated notifications.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<NotificationFrame> {
        self.shared.notifications_tx.subscribe()
    }

    /// The `initialize` result from the most recent successful handshake.
    pub fn server_handshake(&self) -> Option<InitializeResult> {
        self.shared.handshake_info.read().clone()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    // ── Dispatch ────────────────────────────────────────────────────────

    async fn dispatch_loop(shared: Arc<ClientShared>, mut events: broadcast::Receiver<SocketEvent>) {
        loop {
            match events.recv().await {
                Ok(SocketEvent::Opened { session }) => {
                    if !shared.state.transition(ConnectionState::Open) {
                        // A disconnect or closure raced the dial; this socket
                        // has no place in the current lifecycle. Close it
                        // instead of handshaking it, and let reconnect policy
                        // and suppression decide what follows.
                        warn!(session = %session, "socket opened in an unusable state; closing it");
                        shared.session.lock().await.take();
                        shared
                            .manager
                            .close_current(session, "socket no longer wanted")
                            .await;
                        continue;
                    }
                    {
                        let mut guard = shared.session.lock().await;
                        // Replacing the session drops any senders left over
                        // from a superseded socket.
                        *guard = Some(Session::new(session));
                    }
                    tokio::spawn(Self::run_handshake(Arc::clone(&shared), session));
                }
                Ok(SocketEvent::Message { session, text }) => {
                    Self::handle_frame(&shared, session, &text).await;
                }
                Ok(SocketEvent::Closed {
                    session,
                    reason,
                    will_reconnect,
                }) => {
                    Self::handle_closed(&shared, session, &reason, will_reconnect).await;
                }
                Ok(SocketEvent::Reconnecting { attempt }) => {
                    debug!(attempt, "transport reconnecting");
                    shared.state.transition(ConnectionState::Connecting);
                }
                Ok(SocketEvent::ConnectionFailed {
                    attempts,
                    last_error,
                }) => {
                    warn!(attempts, error = %last_error, "reconnection gave up");
                    *shared.last_failure.write() =
                        Some(FailureReason::Transport(last_error));
                    shared.state.transition(ConnectionState::Failed);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "socket event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    async fn handle_frame(shared: &Arc<ClientShared>, session: SessionId, text: &str) {
        let frame = match InboundFrame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        match frame {
            InboundFrame::Response(resp) => {
                let sender = {
                    let mut guard = shared.session.lock().await;
                    match guard.as_mut() {
                        Some(current) if current.id == session => current.pending.remove(&resp.id),
                        _ => None,
                    }
                };
                match sender {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => {
                        debug!(id = resp.id, "response without a pending request ignored");
                    }
                }
            }
            InboundFrame::Notification(note) => {
                debug!(method = %note.method, "notification received");
                let _ = shared.notifications_tx.send(note);
            }
        }
    }

    async fn handle_closed(
        shared: &Arc<ClientShared>,
        session: SessionId,
        reason: &str,
        will_reconnect: bool,
    ) {
        let rejected = {
            let mut guard = shared.session.lock().await;
            let matches = match guard.as_ref() {
                Some(current) => current.id == session || session.is_nil(),
                None => true,
            };
            if !matches {
                debug!(session = %session, "closure of superseded session ignored");
                return;
            }
            // Dropping the session drops every pending sender, which settles
            // the waiting requests with ConnectionLost before any state
            // observer can see the closure.
            match guard.take() {
                Some(old) => old.pending.len(),
                None => 0,
            }
        };

        info!(session = %session, reason = %reason, rejected, will_reconnect, "session closed");
        if will_reconnect {
            shared.state.transition(ConnectionState::Connecting);
        } else {
            shared.state.transition(ConnectionState::Disconnected);
        }
    }

    // ── Handshake ───────────────────────────────────────────────────────

    async fn run_handshake(shared: Arc<ClientShared>, session: SessionId) {
        // A closure may have raced past the Opened event.
        if !shared.state.transition(ConnectionState::Initializing) {
            return;
        }
        match Self::handshake(&shared, session).await {
            Ok(info) => {
                let server = info
                    .server_info
                    .as_ref()
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| "unknown".into());
                info!(server = %server, protocol = %info.protocol_version, "handshake complete");
                *shared.handshake_info.write() = Some(info);
                shared.state.transition(ConnectionState::Ready);
            }
            Err(e) => match e {
                // The socket died under the handshake. The transport already
                // saw the closure and owns what happens next, so the armed
                // reconnect (if any) gets to run its own handshake.
                LifeboardError::ConnectionLost(_)
                | LifeboardError::NotConnected(_)
                | LifeboardError::Transport(_) => {
                    debug!(error = %e, "socket closed during handshake");
                }
                e => {
                    warn!(error = %e, "handshake failed");
                    *shared.last_failure.write() = Some(FailureReason::Handshake(e.to_string()));
                    // A protocol-level rejection will not improve on retry,
                    // so the socket is closed without arming reconnection.
                    shared.manager.disconnect().await;
                }
            },
        }
    }

    async fn handshake(
        shared: &Arc<ClientShared>,
        session: SessionId,
    ) -> LifeboardResult<InitializeResult> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: shared.config.client_name.clone(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };
        let params = serde_json::to_value(&params)?;

        let resp = Self::raw_request(
            shared,
            session,
            "initialize",
            Some(params),
            shared.config.request_timeout_ms,
        )
        .await
        .map_err(|e| match e {
            LifeboardError::ConnectionLost(_)
            | LifeboardError::NotConnected(_)
            | LifeboardError::Transport(_) => e,
            other => LifeboardError::Handshake(format!("initialize failed: {other}")),
        })?;

        if let Some(err) = resp.error {
            return Err(LifeboardError::Handshake(format!(
                "server rejected initialize: {} (code {})",
                err.message, err.code
            )));
        }
        let result = resp
            .result
            .ok_or_else(|| LifeboardError::Handshake("initialize response had no result".into()))?;
        let info: InitializeResult = serde_json::from_value(result)
            .map_err(|e| LifeboardError::Handshake(format!("invalid initialize result: {e}")))?;

        let ack = NotificationFrame::new("notifications/initialized", Some(serde_json::json!({})));
        let text = serde_json::to_string(&ack)?;
        shared.manager.send(session, text).await?;

        Ok(info)
    }

    // ── Correlation core ────────────────────────────────────────────────

    /// Sends one request on `session_id` and waits for the matching
    /// response frame.
    async fn raw_request(
        shared: &Arc<ClientShared>,
        session_id: SessionId,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> LifeboardResult<ResponseFrame> {
        let (id, rx) = {
            let mut guard = shared.session.lock().await;
            let session = match guard.as_mut() {
                Some(s) if s.id == session_id => s,
                _ => {
                    return Err(LifeboardError::NotConnected(
                        "session ended before the request was sent".into(),
                    ))
                }
            };
            let id = session.next_id;
            session.next_id += 1;

            let frame = RequestFrame::new(id, method, params);
            let text = serde_json::to_string(&frame)?;

            let (tx, rx) = oneshot::channel();
            session.pending.insert(id, tx);

            // Sent while holding the session lock so wire order matches id
            // order and a concurrent closure cannot strand the entry.
            if let Err(e) = shared.manager.send(session_id, text).await {
                session.pending.remove(&id);
                return Err(e);
            }
            debug!(id, method, "request sent");
            (id, rx)
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(resp)) => Ok(resp),
            // The sender was dropped: the session was torn down.
            Ok(Err(_)) => Err(LifeboardError::ConnectionLost(
                "connection lost while waiting for response".into(),
            )),
            Err(_) => {
                // Remove the entry so a late response is ignored.
                let mut guard = shared.session.lock().await;
                if let Some(session) = guard.as_mut() {
                    if session.id == session_id {
                        session.pending.remove(&id);
                    }
                }
                Err(LifeboardError::Timeout {
                    method: method.to_string(),
                    timeout_ms,
                })
            }
        }
    }

    /// Converts a settled response frame into the caller's result.
    fn settle(resp: ResponseFrame) -> LifeboardResult<Value> {
        if let Some(err) = resp.error {
            return Err(LifeboardError::Remote {
                code: err.code,
                message: err.message,
            });
        }
        Ok(resp.result.unwrap_or(Value::Null))
    }

    fn failure_error(shared: &Arc<ClientShared>, fallback: &str) -> LifeboardError {
        match shared.last_failure.read().clone() {
            Some(FailureReason::Handshake(msg)) => LifeboardError::Handshake(msg),
            Some(FailureReason::Transport(msg)) => LifeboardError::Transport(msg),
            None => LifeboardError::NotConnected(fallback.into()),
        }
    }
}

impl Drop for LifecycleClient {
    fn drop(&mut self) {
        self.dispatch.abort();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transport::{SocketConn, SocketInbound};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc;

    /// How a scripted server behaves once its socket is up.
    #[derive(Clone, Copy)]
    enum ServerKind {
        /// Handshakes, then echoes an ok result for every request.
        Normal,
        /// Responds to `initialize` with an error frame.
        RejectInitialize,
        /// Closes the socket upon receiving `initialize`.
        DieOnInitialize,
        /// Handshakes, then delays request replies by the given millis.
        SlowReplies(u64),
        /// Handshakes, then replies to requests with an error object.
        ErrorReplies,
        /// Handshakes, then sends two malformed frames before each reply.
        GarbageThenReply,
    }

    /// A dialer whose sockets are served by in-process scripted servers.
    #[derive(Clone)]
    struct ScriptedDialer {
        /// Server behaviour per dial, popped from the front. When exhausted,
        /// dials fail.
        kinds: Arc<Mutex<Vec<ServerKind>>>,
        dial_count: Arc<AtomicU32>,
        /// Every frame any server received, in arrival order.
        received: Arc<Mutex<Vec<Value>>>,
        /// Inbound senders of dialed sockets, for injecting frames and
        /// closures from tests.
        handles: Arc<Mutex<Vec<mpsc::Sender<SocketInbound>>>>,
    }

    impl ScriptedDialer {
        fn new(kinds: Vec<ServerKind>) -> Self {
            Self {
                kinds: Arc::new(Mutex::new(kinds)),
                dial_count: Arc::new(AtomicU32::new(0)),
                received: Arc::new(Mutex::new(Vec::new())),
                handles: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn dials(&self) -> u32 {
            self.dial_count.load(Ordering::SeqCst)
        }

        async fn received_frames(&self) -> Vec<Value> {
            self.received.lock().await.clone()
        }

        /// Kills the most recently dialed socket from the server side.
        async fn drop_current_socket(&self) {
            let handle = self.handles.lock().await.last().cloned();
            if let Some(tx) = handle {
                let _ = tx
                    .send(SocketInbound::Closed("server went away".into()))
                    .await;
            }
        }

        /// Injects a raw inbound frame on the most recent socket.
        async fn inject(&self, text: impl Into<String>) {
            let handle = self.handles.lock().await.last().cloned();
            if let Some(tx) = handle {
                let _ = tx.send(SocketInbound::Text(text.into())).await;
            }
        }
    }

    #[async_trait]
    impl crate::transport::Dialer for ScriptedDialer {
        async fn dial(&self, _endpoint: &str) -> LifeboardResult<SocketConn> {
            self.dial_count.fetch_add(1, Ordering::SeqCst);
            let kind = {
                let mut kinds = self.kinds.lock().await;
                if kinds.is_empty() {
                    return Err(LifeboardError::Transport(
                        "scripted dialer: no more sockets".into(),
                    ));
                }
                kinds.remove(0)
            };
            let (out_tx, out_rx) = mpsc::channel(32);
            let (in_tx, in_rx) = mpsc::channel(32);
            self.handles.lock().await.push(in_tx.clone());
            tokio::spawn(run_server(kind, out_rx, in_tx, Arc::clone(&self.received)));
            Ok(SocketConn {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }

    async fn run_server(
        kind: ServerKind,
        mut out_rx: mpsc::Receiver<String>,
        in_tx: mpsc::Sender<SocketInbound>,
        received: Arc<Mutex<Vec<Value>>>,
    ) {
        while let Some(text) = out_rx.recv().await {
            let frame: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
            received.lock().await.push(frame.clone());

            // Owned, not borrowed from `frame`: the SlowReplies arm moves it
            // into a task that outlives this loop iteration.
            let method = frame
                .get("method")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let Some(id) = frame.get("id").and_then(Value::as_u64) else {
                continue; // notifications expect no reply
            };

            if method == "initialize" {
                if matches!(kind, ServerKind::DieOnInitialize) {
                    let _ = in_tx
                        .send(SocketInbound::Closed("server died mid-handshake".into()))
                        .await;
                    return;
                }
                let reply = match kind {
                    ServerKind::RejectInitialize => {
                        json!({"id": id, "error": {"code": -32600, "message": "unsupported protocol"}})
                    }
                    _ => json!({"id": id, "result": {
                        "protocolVersion": "2024-11-05",
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "scripted", "version": "0.0.1"}
                    }}),
                };
                let _ = in_tx.send(SocketInbound::Text(reply.to_string())).await;
                continue;
            }

            match kind {
                ServerKind::SlowReplies(delay_ms) => {
                    let in_tx = in_tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        let reply = json!({"id": id, "result": {"echo": method}});
                        let _ = in_tx.send(SocketInbound::Text(reply.to_string())).await;
                    });
                }
                ServerKind::ErrorReplies => {
                    let reply =
                        json!({"id": id, "error": {"code": -32000, "message": "tool exploded"}});
                    let _ = in_tx.send(SocketInbound::Text(reply.to_string())).await;
                }
                ServerKind::GarbageThenReply => {
                    let _ = in_tx.send(SocketInbound::Text("{not json".into())).await;
                    let _ = in_tx
                        .send(SocketInbound::Text(json!({"result": 42}).to_string()))
                        .await;
                    let reply = json!({"id": id, "result": {"echo": method}});
                    let _ = in_tx.send(SocketInbound::Text(reply.to_string())).await;
                }
                _ => {
                    let reply = json!({"id": id, "result": {"echo": method}});
                    let _ = in_tx.send(SocketInbound::Text(reply.to_string())).await;
                }
            }
        }
    }

    fn test_config(reconnect: ReconnectPolicy) -> ClientConfig {
        ClientConfig {
            endpoint: "ws://test.invalid/ws".into(),
            request_timeout_ms: 5_000,
            client_name: "lifeboard-test".into(),
            reconnect,
        }
    }

    fn no_reconnect() -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: 0,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
            connect_timeout_ms: 500,
        }
    }

    fn instant_reconnect(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
            connect_timeout_ms: 500,
        }
    }

    fn client_with(kinds: Vec<ServerKind>, reconnect: ReconnectPolicy) -> (LifecycleClient, ScriptedDialer) {
        let dialer = ScriptedDialer::new(kinds);
        let client = LifecycleClient::with_dialer(test_config(reconnect), Box::new(dialer.clone()));
        (client, dialer)
    }

    async fn wait_for_state(client: &LifecycleClient, target: ConnectionState) {
        let mut states = client.subscribe_states();
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if *states.borrow_and_update() == target {
                    return;
                }
                states.changed().await.expect("state channel closed");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {target}"));
    }

    // ── Test 1: handshake is exactly two frames ──────────────────────────

    #[tokio::test]
    async fn connect_performs_two_frame_handshake() {
        let (client, dialer) = client_with(vec![ServerKind::Normal], no_reconnect());

        client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Ready);

        let frames = dialer.received_frames().await;
        assert_eq!(frames.len(), 2, "handshake should be exactly two frames");

        assert_eq!(frames[0]["method"], "initialize");
        assert_eq!(frames[0]["id"], 1);
        assert_eq!(frames[0]["params"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(frames[0]["params"]["clientInfo"]["name"], "lifeboard-test");

        assert_eq!(frames[1]["method"], "notifications/initialized");
        assert!(frames[1].get("id").is_none(), "ack must carry no id");

        let info = client.server_handshake().unwrap();
        assert_eq!(info.server_info.unwrap().name, "scripted");
    }

    // ── Test 2: connect is idempotent ────────────────────────────────────

    #[tokio::test]
    async fn connect_is_idempotent() {
        let (client, dialer) = client_with(vec![ServerKind::Normal], no_reconnect());

        client.connect().await.unwrap();
        client.connect().await.unwrap();
        client.connect().await.unwrap();

        assert_eq!(dialer.dials(), 1);
        assert_eq!(dialer.received_frames().await.len(), 2);
    }

    // ── Test 3: requests are refused unless ready ────────────────────────

    #[tokio::test]
    async fn request_refused_when_not_ready() {
        let (client, _dialer) = client_with(vec![ServerKind::Normal], no_reconnect());

        let err = client.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, LifeboardError::NotConnected(_)));

        client.connect().await.unwrap();
        client.disconnect().await;

        let err = client.request("tools/list", None).await.unwrap_err();
        assert!(matches!(err, LifeboardError::NotConnected(_)));
    }

    // ── Test 4: request ids are monotonic after the handshake ────────────

    #[tokio::test]
    async fn request_ids_count_up_from_the_handshake() {
        let (client, dialer) = client_with(vec![ServerKind::Normal], no_reconnect());
        client.connect().await.unwrap();

        client.request("a", None).await.unwrap();
        client.request("b", None).await.unwrap();
        client.request("c", None).await.unwrap();

        let ids: Vec<u64> = dialer
            .received_frames()
            .await
            .iter()
            .filter_map(|f| f.get("id").and_then(Value::as_u64))
            .collect();
        // initialize took id 1; the three requests follow in order.
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    // ── Test 5: timeout removes the entry; late responses are ignored ────

    #[tokio::test]
    async fn timeout_then_late_response_is_ignored() {
        let (client, _dialer) = client_with(vec![ServerKind::SlowReplies(200)], no_reconnect());
        client.connect().await.unwrap();

        let err = client
            .request_with_timeout("slow/op", None, 50)
            .await
            .unwrap_err();
        match err {
            LifeboardError::Timeout { method, timeout_ms } => {
                assert_eq!(method, "slow/op");
                assert_eq!(timeout_ms, 50);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }

        // Let the late reply arrive; it must be dropped, not crash anything.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(client.state(), ConnectionState::Ready);

        // The session still works for fresh requests.
        let value = client
            .request_with_timeout("next/op", None, 1_000)
            .await
            .unwrap();
        assert_eq!(value["echo"], "next/op");
    }

    // ── Test 6: remote error objects map to Remote ───────────────────────

    #[tokio::test]
    async fn remote_error_maps_to_remote_variant() {
        let (client, _dialer) = client_with(vec![ServerKind::ErrorReplies], no_reconnect());
        client.connect().await.unwrap();

        let err = client.request("tools/call", None).await.unwrap_err();
        match err {
            LifeboardError::Remote { code, message } => {
                assert_eq!(code, -32000);
                assert!(message.contains("tool exploded"));
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    // ── Test 7: disconnect settles pending with ConnectionLost ───────────

    #[tokio::test]
    async fn disconnect_rejects_pending_requests() {
        let (client, _dialer) =
            client_with(vec![ServerKind::SlowReplies(60_000)], no_reconnect());
        let client = Arc::new(client);
        client.connect().await.unwrap();

        let pending = {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                client
                    .request_with_timeout("never/answered", None, 30_000)
                    .await
            })
        };
        // Let the request reach the wire before tearing down.
        tokio::time::sleep(Duration::from_millis(50)).await;

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let err = pending.await.unwrap().unwrap_err();
        assert!(
            matches!(err, LifeboardError::ConnectionLost(_)),
            "expected ConnectionLost, got {err:?}"
        );
    }

    // ── Test 8: rejected handshake fails connect ─────────────────────────

    #[tokio::test]
    async fn rejected_handshake_fails_connect() {
        let (client, dialer) = client_with(vec![ServerKind::RejectInitialize], no_reconnect());

        let err = client.connect().await.unwrap_err();
        match err {
            LifeboardError::Handshake(msg) => assert!(msg.contains("unsupported protocol")),
            other => panic!("expected Handshake, got {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(dialer.dials(), 1, "a protocol rejection must not retry");
    }

    // ── Test 9: reconnect re-handshakes with fresh ids ───────────────────

    #[tokio::test]
    async fn reconnect_rehandshakes_with_fresh_ids() {
        let (client, dialer) = client_with(
            vec![ServerKind::Normal, ServerKind::Normal],
            instant_reconnect(3),
        );
        client.connect().await.unwrap();
        client.request("warmup", None).await.unwrap();

        dialer.drop_current_socket().await;

        // Wait until the replacement socket finished its own handshake. The
        // watch channel coalesces, so polling the wire is the reliable signal.
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let handshakes = dialer
                    .received_frames()
                    .await
                    .iter()
                    .filter(|f| f["method"] == "initialize")
                    .count();
                if handshakes == 2 && client.is_ready() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("reconnect handshake never completed");

        // The replacement session carries requests again.
        let value = client.request("after/reconnect", None).await.unwrap();
        assert_eq!(value["echo"], "after/reconnect");
        assert_eq!(dialer.dials(), 2);

        // Each socket ran its own handshake, and ids were reseeded: both
        // initialize frames carry id 1, and the second socket's request got
        // id 2 even though the first socket had already used it.
        let frames = dialer.received_frames().await;
        let init_ids: Vec<u64> = frames
            .iter()
            .filter(|f| f["method"] == "initialize")
            .filter_map(|f| f["id"].as_u64())
            .collect();
        assert_eq!(init_ids, vec![1, 1]);
        let after: Vec<u64> = frames
            .iter()
            .filter(|f| f["method"] == "after/reconnect")
            .filter_map(|f| f["id"].as_u64())
            .collect();
        assert_eq!(after, vec![2]);
    }

    // ── Test 10: malformed frames are dropped, not fatal ─────────────────

    #[tokio::test]
    async fn malformed_frames_are_dropped() {
        let (client, _dialer) = client_with(vec![ServerKind::GarbageThenReply], no_reconnect());
        client.connect().await.unwrap();

        let value = client.request("solid/op", None).await.unwrap();
        assert_eq!(value["echo"], "solid/op");
        assert_eq!(client.state(), ConnectionState::Ready);
    }

    // ── Test 11: notifications fan out to subscribers ────────────────────

    #[tokio::test]
    async fn notifications_reach_subscribers() {
        let (client, dialer) = client_with(vec![ServerKind::Normal], no_reconnect());
        client.connect().await.unwrap();

        let mut notes = client.subscribe_notifications();
        dialer
            .inject(json!({"method": "notifications/progress", "params": {"pct": 50}}).to_string())
            .await;

        let note = tokio::time::timeout(Duration::from_secs(2), notes.recv())
            .await
            .expect("timed out waiting for notification")
            .unwrap();
        assert_eq!(note.method, "notifications/progress");
        assert_eq!(note.params.unwrap()["pct"], 50);
    }

    // ── Test 12: exhausted reconnects park the client at Failed ──────────

    #[tokio::test]
    async fn exhausted_reconnects_park_at_failed() {
        let (client, dialer) = client_with(vec![ServerKind::Normal], instant_reconnect(2));
        client.connect().await.unwrap();

        dialer.drop_current_socket().await;
        wait_for_state(&client, ConnectionState::Failed).await;

        let err = client.request("anything", None).await.unwrap_err();
        assert!(matches!(err, LifeboardError::NotConnected(_)));

        // An explicit connect tries again from scratch and surfaces the
        // dial failure.
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, LifeboardError::Transport(_)));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(dialer.dials(), 4); // initial + 2 reconnects + explicit retry
    }

    // ── Test 13: a socket dying mid-handshake leaves reconnect armed ─────

    #[tokio::test]
    async fn handshake_survives_a_socket_death() {
        let (client, dialer) = client_with(
            vec![ServerKind::DieOnInitialize, ServerKind::Normal],
            instant_reconnect(3),
        );

        // The first socket closes while initialize is in flight; the
        // replacement socket must complete its own handshake instead of the
        // failure tearing the connection down for good.
        client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Ready);
        assert_eq!(dialer.dials(), 2);

        let value = client.request("after/death", None).await.unwrap();
        assert_eq!(value["echo"], "after/death");
    }

    // ── Test 14: config defaults ─────────────────────────────────────────

    #[test]
    fn config_fills_defaults() {
        let config: ClientConfig =
            serde_json::from_value(json!({"endpoint": "ws://localhost:3917/mcp"})).unwrap();
        assert_eq!(config.endpoint, "ws://localhost:3917/mcp");
        assert_eq!(config.request_timeout_ms, 30_000);
        assert_eq!(config.client_name, "lifeboard");
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.backoff_base_ms, 500);
    }

    // ── Test 15: a socket the state machine refuses is closed, not used ──

    #[tokio::test]
    async fn stray_socket_open_is_closed_not_handshaken() {
        let (client, dialer) = client_with(vec![ServerKind::Normal], no_reconnect());

        // Dial the transport directly, so the socket arrives while the
        // client still considers itself disconnected.
        client.shared.manager.connect().await.unwrap();

        // The dispatch loop must drop the socket rather than handshake it.
        tokio::time::timeout(Duration::from_secs(2), async {
            while client.shared.manager.is_connected().await {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stray socket was never closed");

        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(
            dialer.received_frames().await.is_empty(),
            "no handshake may reach a stray socket"
        );

        // A proper connect afterwards starts from scratch and works.
        dialer.kinds.lock().await.push(ServerKind::Normal);
        client.connect().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Ready);
    }
}
