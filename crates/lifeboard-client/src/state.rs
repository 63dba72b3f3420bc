//! Explicit connection state machine.
//!
//! A connection moves Disconnected -> Connecting -> Open -> Initializing ->
//! Ready. Closures fall back to Connecting (when a reconnect is pending) or
//! Disconnected; exhausted reconnects end in Failed until the next explicit
//! connect.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle state of the connection to the lifecycle server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no pending reconnect.
    Disconnected,
    /// A dial or reconnect attempt is in progress.
    Connecting,
    /// The socket is open; the protocol handshake has not started yet.
    Open,
    /// The initialize exchange is in flight.
    Initializing,
    /// Handshake complete; requests are accepted.
    Ready,
    /// Reconnect attempts are exhausted; waiting for an explicit connect.
    Failed,
}

impl ConnectionState {
    /// Whether the protocol layer accepts requests in this state.
    pub fn is_ready(self) -> bool {
        matches!(self, ConnectionState::Ready)
    }

    /// Whether a transition from `self` to `next` is legal. Staying in the
    /// same state is always legal.
    pub fn allows(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Open)
                | (Connecting, Disconnected)
                | (Connecting, Failed)
                | (Open, Initializing)
                | (Open, Connecting)
                | (Open, Disconnected)
                | (Initializing, Ready)
                | (Initializing, Connecting)
                | (Initializing, Disconnected)
                | (Ready, Connecting)
                | (Ready, Disconnected)
                | (Failed, Connecting)
                | (Failed, Disconnected)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Initializing => "initializing",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Watch-backed holder of the current [`ConnectionState`].
///
/// Several tasks transition the cell concurrently (connect callers, the
/// dispatch loop, the handshake task). The check and the store in
/// [`transition`](Self::transition) run atomically under the channel's own
/// lock, so every sequence of states the cell passes through is one the
/// transition table permits.
pub struct StateCell {
    tx: watch::Sender<ConnectionState>,
}

impl StateCell {
    /// Creates a cell starting at [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self { tx }
    }

    /// Current state.
    pub fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Subscribes to state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Applies a transition. Illegal transitions are logged and refused;
    /// returns whether the cell now holds `next`.
    ///
    /// The closure passed to `send_if_modified` holds the channel lock, so a
    /// concurrent writer cannot slip its own store between this check and
    /// this write. Refusals and same-state writes do not wake subscribers.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut refused_from = None;
        let mut changed_from = None;
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.allows(next) {
                refused_from = Some(*current);
                return false;
            }
            changed_from = Some(*current);
            *current = next;
            true
        });
        if let Some(from) = refused_from {
            warn!(%from, to = %next, "illegal state transition refused");
            return false;
        }
        if let Some(from) = changed_from {
            debug!(%from, to = %next, "connection state changed");
        }
        true
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ConnectionState::*;

    // ── Test 1: transition table ─────────────────────────────────────────

    #[test]
    fn legal_transitions() {
        assert!(Disconnected.allows(Connecting));
        assert!(Connecting.allows(Open));
        assert!(Open.allows(Initializing));
        assert!(Initializing.allows(Ready));
        assert!(Ready.allows(Disconnected));
        assert!(Ready.allows(Connecting));
        assert!(Connecting.allows(Failed));
        assert!(Failed.allows(Connecting));
        assert!(Initializing.allows(Connecting));
    }

    #[test]
    fn illegal_transitions() {
        assert!(!Disconnected.allows(Ready));
        assert!(!Disconnected.allows(Open));
        assert!(!Connecting.allows(Ready));
        assert!(!Connecting.allows(Initializing));
        assert!(!Open.allows(Ready));
        assert!(!Ready.allows(Open));
        assert!(!Ready.allows(Failed));
        assert!(!Failed.allows(Ready));
    }

    #[test]
    fn same_state_is_always_legal() {
        for state in [Disconnected, Connecting, Open, Initializing, Ready, Failed] {
            assert!(state.allows(state));
        }
    }

    // ── Test 2: state cell behaviour ─────────────────────────────────────

    #[test]
    fn cell_refuses_illegal_and_keeps_state() {
        let cell = StateCell::new();
        assert_eq!(cell.get(), Disconnected);
        assert!(!cell.transition(Ready));
        assert_eq!(cell.get(), Disconnected);
        assert!(cell.transition(Connecting));
        assert_eq!(cell.get(), Connecting);
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();
        assert_eq!(*rx.borrow_and_update(), Disconnected);

        cell.transition(Connecting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Connecting);

        cell.transition(Open);
        cell.transition(Initializing);
        cell.transition(Ready);
        rx.changed().await.unwrap();
        // watch keeps only the latest value.
        assert_eq!(*rx.borrow_and_update(), Ready);
    }

    #[tokio::test]
    async fn refused_transitions_do_not_wake_subscribers() {
        let cell = StateCell::new();
        let mut rx = cell.subscribe();
        assert_eq!(*rx.borrow_and_update(), Disconnected);

        assert!(!cell.transition(Ready));
        assert!(!rx.has_changed().unwrap());

        // Same-state writes are accepted but equally quiet.
        assert!(cell.transition(Disconnected));
        assert!(!rx.has_changed().unwrap());

        assert!(cell.transition(Connecting));
        assert!(rx.has_changed().unwrap());
    }
}
