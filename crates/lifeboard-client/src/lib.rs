//! WebSocket client for the lifecycle tool server.
//!
//! This crate owns the connection to the remote lifecycle server: the raw
//! socket with reconnection ([`SocketManager`]), the explicit connection
//! state machine ([`ConnectionState`]), the wire frames ([`protocol`]), and
//! the request correlator with the protocol handshake ([`LifecycleClient`]).
//!
//! # Main types
//!
//! - [`LifecycleClient`] — Issues requests, drives the handshake, fans out
//!   notifications.
//! - [`ClientConfig`] — Endpoint, timeouts, and reconnect policy.
//! - [`SocketManager`] — Socket lifecycle with exponential-backoff reconnect.
//! - [`Dialer`] — The seam for opening sockets; [`WsDialer`] is the
//!   production implementation.
//! - [`ConnectionState`] — Observable lifecycle state of the connection.

/// Wire frame types for the lifecycle dashboard protocol.
pub mod protocol;
/// The connection state machine.
pub mod state;
/// Socket lifecycle management and the dialer seam.
pub mod transport;

mod client;

pub use client::{ClientConfig, LifecycleClient};
pub use protocol::{
    InitializeResult, NotificationFrame, ServerCapabilities, ServerInfo, ToolDef, ToolListResult,
};
pub use state::ConnectionState;
pub use transport::{
    Dialer, ReconnectPolicy, SessionId, SocketConn, SocketEvent, SocketInbound, SocketManager,
    WsDialer,
};
