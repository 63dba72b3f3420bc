//! Tool discovery across lifecycle servers.
//!
//! The dashboard can talk to several lifecycle servers at once; this crate
//! keeps their tool catalogs fresh. [`DiscoveryRegistry`] tracks one
//! [`Discoverer`] per server, sweeps them on demand or on an interval, and
//! broadcasts [`DiscoveryEvent`]s whenever a catalog changes.
//!
//! Discovery is best effort by design: a server that fails to list its tools
//! contributes an empty catalog instead of an error, so one broken server
//! never hides the others.

/// The discoverer seam and tool descriptor types.
pub mod discoverer;
/// The registry of servers and the auto-discovery loop.
pub mod registry;
/// Discoverer backed by a live client session.
pub mod socket;

pub use discoverer::{DiscoveredServer, Discoverer, ToolDescriptor, TransportKind};
pub use registry::{DiscoveryEvent, DiscoveryRegistry};
pub use socket::SocketDiscoverer;
