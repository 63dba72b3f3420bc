//! Core types and error definitions for the Lifeboard client engine.
//!
//! This crate provides the foundational types shared across all Lifeboard
//! crates: the unified error taxonomy, retryability classification, and the
//! lifecycle entity model the dashboard edits.
//!
//! # Main types
//!
//! - [`LifeboardError`] — Unified error enum for all Lifeboard subsystems.
//! - [`LifeboardResult`] — Convenience alias for `Result<T, LifeboardError>`.
//! - [`entities::Requirement`] — A tracked product requirement.
//! - [`entities::Task`] — A unit of implementation work.
//! - [`entities::ArchitectureDecision`] — A recorded architecture decision.

/// Lifecycle entity model shared by the service facades and the CLI.
pub mod entities;

// --- Error types ---

/// Top-level error type for the Lifeboard client engine.
///
/// Each variant corresponds to a failure class callers may want to branch on.
#[derive(Debug, thiserror::Error)]
pub enum LifeboardError {
    /// An operation required a ready connection and there was none.
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// The initialize/initialized exchange with the server failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// A request did not receive a response within its deadline.
    #[error("Request '{method}' timed out after {timeout_ms}ms")]
    Timeout {
        /// The method of the request that timed out.
        method: String,
        /// The deadline that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The server answered a request with an error frame.
    #[error("Remote error {code}: {message}")]
    Remote {
        /// Machine-readable error code reported by the server.
        code: i64,
        /// Human-readable message reported by the server.
        message: String,
    },

    /// The connection dropped while a request was outstanding.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// A tool discovery pass failed.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// A socket-level failure (dial, send, or protocol transport).
    #[error("Transport error: {0}")]
    Transport(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LifeboardError {
    /// Determines whether this error is transient and worth retrying.
    ///
    /// Returns `true` for timeouts, lost connections, and transport-level
    /// failures, which a reconnect or a later attempt may resolve. Returns
    /// `false` for remote rejections, handshake failures, and local errors,
    /// which are not expected to succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LifeboardError::Timeout { .. }
                | LifeboardError::ConnectionLost(_)
                | LifeboardError::Transport(_)
                | LifeboardError::NotConnected(_)
        )
    }
}

/// A convenience `Result` alias using [`LifeboardError`].
pub type LifeboardResult<T> = Result<T, LifeboardError>;

// ─── Tests ───────────────────────────────────────────────────────────────────
