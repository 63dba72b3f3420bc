//! WebSocket transport and connection supervision.
//!
//! [`SocketManager`] owns at most one active socket at a time. `connect` is
//! idempotent: concurrent callers share a single in-flight dial attempt and
//! all observe its outcome. When an established socket drops, the manager
//! reconnects with capped exponential backoff and broadcasts the lifecycle
//! as [`SocketEvent`]s; an explicit `disconnect` suppresses reconnection.
//!
//! The dial itself is abstracted behind the [`Dialer`] trait so tests can
//! substitute scripted sockets for a real WebSocket endpoint.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use lifeboard_core::{LifeboardError, LifeboardResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Type alias for the injectable sleep function used in tests.
#[cfg(test)]
type SleepFn = Box<
    dyn Fn(u64) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync,
>;

/// Identifies one physical socket. A reconnect produces a new session id, so
/// state keyed by session can never leak across socket generations.
pub type SessionId = Uuid;

// ── Reconnect policy ────────────────────────────────────────────────────────

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

/// Configures automatic reconnection after an established socket drops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Timeout in milliseconds for a single dial attempt.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

/// Computes the backoff delay for a given attempt using exponential backoff
/// capped at `backoff_max_ms`.
fn compute_backoff(policy: &ReconnectPolicy, attempt: u32) -> u64 {
    let delay = policy.backoff_base_ms.saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

// ── Socket events and connections ───────────────────────────────────────────

/// Lifecycle and traffic events broadcast by the [`SocketManager`].
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// A socket was established and is ready to carry frames.
    Opened {
        /// Session id of the new socket.
        session: SessionId,
    },
    /// A text frame arrived on the socket.
    Message {
        /// Session the frame arrived on.
        session: SessionId,
        /// Raw frame payload.
        text: String,
    },
    /// The socket closed. `will_reconnect` tells observers whether a
    /// reconnect loop has been armed or the closure is final.
    Closed {
        /// Session that closed. [`Uuid::nil`] when a disconnect was
        /// requested before any socket existed.
        session: SessionId,
        /// Human-readable closure reason.
        reason: String,
        /// Whether the manager will attempt to reconnect.
        will_reconnect: bool,
    },
    /// A reconnect attempt is starting (1-based attempt counter).
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// All reconnect attempts were exhausted; no further attempts happen
    /// until an explicit `connect`.
    ConnectionFailed {
        /// How many attempts were made.
        attempts: u32,
        /// The error from the final attempt.
        last_error: String,
    },
}

/// Messages surfaced by a dialed socket's read side.
#[derive(Debug)]
pub enum SocketInbound {
    /// A complete text frame.
    Text(String),
    /// The socket closed with the given reason.
    Closed(String),
}

/// The two halves of a dialed socket: a sender for outbound text frames and
/// a receiver for inbound traffic. Dropping `outbound` closes the socket.
pub struct SocketConn {
    /// Outbound frame sink.
    pub outbound: mpsc::Sender<String>,
    /// Inbound frame source.
    pub inbound: mpsc::Receiver<SocketInbound>,
}

/// Establishes duplex socket connections to an endpoint.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dials `endpoint` and returns the connected socket pair.
    async fn dial(&self, endpoint: &str) -> LifeboardResult<SocketConn>;
}

/// [`Dialer`] backed by a real WebSocket connection.
pub struct WsDialer;

#[async_trait]
impl Dialer for WsDialer {
    async fn dial(&self, endpoint: &str) -> LifeboardResult<SocketConn> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| LifeboardError::Transport(format!("WebSocket connect error: {e}")))?;
        let (mut write, mut read) = ws_stream.split();
        debug!(endpoint = %endpoint, "WebSocket established");

        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (in_tx, in_rx) = mpsc::channel::<SocketInbound>(64);

        // Writer pump: forwards outbound frames until the sender is dropped,
        // then closes the socket politely.
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text)).await {
                    warn!(error = %e, "WebSocket send failed");
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        // Reader pump: forwards text frames and reports the closure reason.
        tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(SocketInbound::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .unwrap_or_else(|| "closed by server".into());
                        let _ = in_tx.send(SocketInbound::Closed(reason)).await;
                        break;
                    }
                    // Ping/pong are answered by tungstenite; binary frames
                    // are not part of the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = in_tx
                            .send(SocketInbound::Closed(format!("WebSocket error: {e}")))
                            .await;
                        break;
                    }
                    None => {
                        let _ = in_tx
                            .send(SocketInbound::Closed("connection closed".into()))
                            .await;
                        break;
                    }
                }
            }
        });

        Ok(SocketConn { outbound: out_tx, inbound: in_rx })
    }
}

// ── Socket manager ──────────────────────────────────────────────────────────

type ConnectWaiter = oneshot::Sender<Result<(), String>>;

struct ActiveConn {
    session: SessionId,
    outbound: mpsc::Sender<String>,
    pump: JoinHandle<()>,
}

#[derive(Default)]
struct ManagerInner {
    conn: Option<ActiveConn>,
    /// True while a dial attempt is in flight (explicit or reconnect).
    connecting: bool,
    /// Callers waiting on the in-flight attempt.
    waiters: Vec<ConnectWaiter>,
    reconnect_task: Option<JoinHandle<()>>,
    /// Set by `disconnect`; closures observed while set do not reconnect.
    suppress_reconnect: bool,
}

struct ManagerShared {
    dialer: Box<dyn Dialer>,
    endpoint: String,
    policy: ReconnectPolicy,
    events_tx: broadcast::Sender<SocketEvent>,
    inner: Mutex<ManagerInner>,
    /// Injectable sleep function for testing (allows skipping real delays).
    #[cfg(test)]
    sleep_fn: Option<SleepFn>,
}

/// Supervises the single socket to the lifecycle server.
///
/// All methods are cheap to call from any task; the manager serializes its
/// own bookkeeping internally.
pub struct SocketManager {
    shared: Arc<ManagerShared>,
}

impl SocketManager {
    /// Creates a manager for `endpoint` using the given dialer and policy.
    /// No connection is attempted until [`connect`](Self::connect).
    pub fn new(dialer: Box<dyn Dialer>, endpoint: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            shared: Arc::new(ManagerShared {
                dialer,
                endpoint: endpoint.into(),
                policy,
                events_tx,
                inner: Mutex::new(ManagerInner::default()),
                #[cfg(test)]
                sleep_fn: None,
            }),
        }
    }

    /// Subscribes to socket lifecycle and traffic events.
    pub fn subscribe(&self) -> broadcast::Receiver<SocketEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Ensures a socket is established.
    ///
    /// Returns immediately when already connected. When a dial is already in
    /// flight the call waits for that attempt instead of starting another,
    /// so any number of concurrent callers produce exactly one dial.
    pub async fn connect(&self) -> LifeboardResult<()> {
        let rx = {
            let mut inner = self.shared.inner.lock().await;
            if inner.conn.is_some() {
                return Ok(());
            }
            inner.suppress_reconnect = false;
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            if !inner.connecting {
                // Preempt any armed backoff timer; this call dials now.
                if let Some(task) = inner.reconnect_task.take() {
                    task.abort();
                }
                inner.connecting = true;
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    let _ = SocketManager::attempt_and_settle(&shared).await;
                });
            }
            rx
        };

        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(msg)) => Err(LifeboardError::Transport(msg)),
            Err(_) => Err(LifeboardError::ConnectionLost("connect attempt abandoned".into())),
        }
    }

    /// Closes the current socket (if any) and suppresses reconnection until
    /// the next explicit [`connect`](Self::connect).
    ///
    /// Always emits a final `Closed` event with `will_reconnect: false`,
    /// even when no socket was established at the time of the call.
    pub async fn disconnect(&self) {
        let session = {
            let mut inner = self.shared.inner.lock().await;
            inner.suppress_reconnect = true;
            if let Some(task) = inner.reconnect_task.take() {
                task.abort();
            }
            for waiter in std::mem::take(&mut inner.waiters) {
                let _ = waiter.send(Err("disconnected".into()));
            }
            match inner.conn.take() {
                Some(ActiveConn { session, outbound, pump }) => {
                    pump.abort();
                    drop(outbound);
                    session
                }
                None => Uuid::nil(),
            }
        };

        info!(session = %session, "socket disconnected");
        let _ = self.shared.events_tx.send(SocketEvent::Closed {
            session,
            reason: "disconnect requested".into(),
            will_reconnect: false,
        });
    }

    /// Closes the socket identified by `session` without suppressing
    /// reconnection, unlike [`disconnect`](Self::disconnect): whatever
    /// reconnect policy and suppression are in force decide what follows
    /// the emitted `Closed`. A stale `session` is ignored.
    pub async fn close_current(&self, session: SessionId, reason: impl Into<String>) {
        {
            let mut inner = self.shared.inner.lock().await;
            match &inner.conn {
                Some(conn) if conn.session == session => {
                    if let Some(ActiveConn { outbound, pump, .. }) = inner.conn.take() {
                        pump.abort();
                        drop(outbound);
                    }
                }
                _ => return,
            }
        }
        Self::emit_closed(&self.shared, session, reason.into()).await;
    }

    /// Sends a text frame on the socket identified by `session`.
    ///
    /// The session check prevents a caller that raced a reconnect from
    /// writing onto a socket it never handshook with.
    pub async fn send(&self, session: SessionId, text: String) -> LifeboardResult<()> {
        let outbound = {
            let inner = self.shared.inner.lock().await;
            match &inner.conn {
                Some(conn) if conn.session == session => conn.outbound.clone(),
                Some(_) => {
                    return Err(LifeboardError::NotConnected("socket was superseded".into()))
                }
                None => return Err(LifeboardError::NotConnected("socket is not open".into())),
            }
        };
        outbound
            .send(text)
            .await
            .map_err(|e| LifeboardError::Transport(format!("socket send error: {e}")))
    }

    /// Whether a socket is currently established.
    pub async fn is_connected(&self) -> bool {
        self.shared.inner.lock().await.conn.is_some()
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Runs one dial attempt and resolves every pending connect waiter with
    /// its outcome. Expects `connecting` to have been set by the caller.
    async fn attempt_and_settle(shared: &Arc<ManagerShared>) -> Result<(), String> {
        let result = Self::attempt(shared).await.map_err(|e| e.to_string());
        let waiters = {
            let mut inner = shared.inner.lock().await;
            inner.connecting = false;
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
        result
    }

    async fn attempt(shared: &Arc<ManagerShared>) -> LifeboardResult<()> {
        let timeout = Duration::from_millis(shared.policy.connect_timeout_ms);
        let conn = match tokio::time::timeout(timeout, shared.dialer.dial(&shared.endpoint)).await
        {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(LifeboardError::Transport(format!(
                    "connect to {} timed out after {}ms",
                    shared.endpoint, shared.policy.connect_timeout_ms
                )))
            }
        };

        let session = Uuid::new_v4();
        let SocketConn { outbound, inbound } = conn;

        {
            let mut inner = shared.inner.lock().await;
            if inner.suppress_reconnect {
                // A disconnect raced the dial; abandon the fresh socket.
                drop(outbound);
                return Err(LifeboardError::ConnectionLost("disconnected during connect".into()));
            }
            // Pump spawn, registration and the Opened announcement happen
            // under one lock: a closure reported by the pump can neither find
            // the conn unregistered nor overtake the Opened event.
            let pump = tokio::spawn(Self::pump_inbound(Arc::clone(shared), session, inbound));
            if let Some(old) = inner.conn.replace(ActiveConn { session, outbound, pump }) {
                old.pump.abort();
            }
            info!(endpoint = %shared.endpoint, session = %session, "socket connected");
            let _ = shared.events_tx.send(SocketEvent::Opened { session });
        }
        Ok(())
    }

    /// Forwards inbound traffic for one socket until it closes.
    async fn pump_inbound(
        shared: Arc<ManagerShared>,
        session: SessionId,
        mut inbound: mpsc::Receiver<SocketInbound>,
    ) {
        loop {
            match inbound.recv().await {
                Some(SocketInbound::Text(text)) => {
                    let _ = shared.events_tx.send(SocketEvent::Message { session, text });
                }
                Some(SocketInbound::Closed(reason)) => {
                    Self::handle_closure(&shared, session, reason).await;
                    return;
                }
                None => {
                    Self::handle_closure(&shared, session, "socket channel dropped".into()).await;
                    return;
                }
            }
        }
    }

    /// Handles a closure reported by the pump for `session`.
    async fn handle_closure(shared: &Arc<ManagerShared>, session: SessionId, reason: String) {
        {
            let mut inner = shared.inner.lock().await;
            match &inner.conn {
                Some(conn) if conn.session == session => {
                    // The pump reported its own closure and is about to
                    // return, so there is nothing to abort.
                    inner.conn = None;
                }
                _ => {
                    debug!(session = %session, "closure of superseded socket ignored");
                    return;
                }
            }
        }
        Self::emit_closed(shared, session, reason).await;
    }

    /// Emits the `Closed` event and arms the reconnect loop unless an
    /// explicit disconnect suppressed it.
    async fn emit_closed(shared: &Arc<ManagerShared>, session: SessionId, reason: String) {
        let will_reconnect = {
            let inner = shared.inner.lock().await;
            !inner.suppress_reconnect && shared.policy.max_attempts > 0
        };
        warn!(session = %session, reason = %reason, will_reconnect, "socket closed");
        let _ = shared.events_tx.send(SocketEvent::Closed {
            session,
            reason,
            will_reconnect,
        });

        if will_reconnect {
            let task = tokio::spawn(Self::reconnect_loop(Arc::clone(shared)));
            let mut inner = shared.inner.lock().await;
            if let Some(old) = inner.reconnect_task.replace(task) {
                old.abort();
            }
        }
    }

    /// Boxed rather than an `async fn`: this future re-enters `attempt`,
    /// whose pump task can land back here via `emit_closed`, and that cycle
    /// of opaque futures cannot be proven `Send`.
    fn reconnect_loop(shared: Arc<ManagerShared>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let max = shared.policy.max_attempts;
            let mut last_error = String::from("no attempts made");

            for attempt in 0..max {
                let delay = compute_backoff(&shared.policy, attempt);
                Self::do_sleep(&shared, delay).await;

                {
                    let mut inner = shared.inner.lock().await;
                    // Superseded by an explicit disconnect or connect.
                    if inner.suppress_reconnect || inner.conn.is_some() || inner.connecting {
                        return;
                    }
                    inner.connecting = true;
                }

                info!(attempt = attempt + 1, max, delay_ms = delay, "reconnecting");
                let _ = shared
                    .events_tx
                    .send(SocketEvent::Reconnecting { attempt: attempt + 1 });

                match Self::attempt_and_settle(&shared).await {
                    Ok(()) => return,
                    Err(e) => {
                        warn!(attempt = attempt + 1, error = %e, "reconnect attempt failed");
                        last_error = e;
                    }
                }
            }

            warn!(attempts = max, last_error = %last_error, "reconnect attempts exhausted");
            let _ = shared.events_tx.send(SocketEvent::ConnectionFailed {
                attempts: max,
                last_error,
            });
        })
    }

    /// Perform a sleep for the given duration in milliseconds.
    #[cfg_attr(not(test), allow(unused_variables))]
    async fn do_sleep(shared: &ManagerShared, ms: u64) {
        #[cfg(test)]
        if let Some(ref f) = shared.sleep_fn {
            f(ms).await;
            return;
        }
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
