use crate::discoverer::{
    sanitize_tools, DiscoveredServer, Discoverer, ToolDescriptor, TransportKind,
};
use chrono::{DateTime, Utc};
use lifeboard_core::{LifeboardError, LifeboardResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Catalog changes broadcast by the [`DiscoveryRegistry`].
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A server's tool catalog was refreshed.
    ToolsUpdated {
        /// The server whose catalog changed.
        server_id: String,
        /// The full refreshed catalog.
        tools: Vec<ToolDescriptor>,
    },
    /// A server went offline or was unregistered.
    ServerDisconnected {
        /// The affected server.
        server_id: String,
    },
}

/// Internal state for a registered server.
struct ServerEntry {
    discoverer: Arc<dyn Discoverer>,
    server_name: String,
    transport: TransportKind,
    connected: bool,
    tools: Vec<ToolDescriptor>,
    last_updated: Option<DateTime<Utc>>,
    /// Serializes discoveries per server so sweeps never overlap.
    in_flight: Arc<Mutex<()>>,
}

struct RegistryInner {
    servers: RwLock<HashMap<String, ServerEntry>>,
    events_tx: broadcast::Sender<DiscoveryEvent>,
}

/// Tracks tool catalogs across every registered lifecycle server.
///
/// Discovery never fails loudly: servers that are disconnected are skipped,
/// and servers that error contribute an empty catalog while keeping their
/// last known tools for display.
pub struct DiscoveryRegistry {
    inner: Arc<RegistryInner>,
    auto_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl DiscoveryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(RegistryInner {
                servers: RwLock::new(HashMap::new()),
                events_tx,
            }),
            auto_task: parking_lot::Mutex::new(None),
        }
    }

    /// Subscribes to catalog change events.
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Registers a server. A discoverer already registered under the same id
    /// is replaced. When the server is connected, its catalog is seeded in
    /// the background right away instead of waiting for the next sweep.
    pub async fn register(&self, discoverer: Arc<dyn Discoverer>) {
        let server_id = discoverer.server_id().to_string();
        let server_name = discoverer.server_name().to_string();
        let transport = discoverer.transport();
        let connected = discoverer.is_connected().await;
        let gate = Arc::new(Mutex::new(()));
        {
            let mut servers = self.inner.servers.write().await;
            if servers.contains_key(&server_id) {
                warn!(server = %server_id, "replacing existing discoverer");
            }
            servers.insert(
                server_id.clone(),
                ServerEntry {
                    discoverer: Arc::clone(&discoverer),
                    server_name,
                    transport,
                    connected,
                    tools: Vec::new(),
                    last_updated: None,
                    in_flight: Arc::clone(&gate),
                },
            );
        }
        info!(server = %server_id, transport = %transport, connected, "server registered");

        if connected {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                run_discovery(&inner, &server_id, discoverer, gate).await;
            });
        }
    }

    /// Removes a server. Any discovery still in flight for it is discarded
    /// when it completes. Returns whether the server was known.
    pub async fn unregister(&self, server_id: &str) -> bool {
        let removed = self.inner.servers.write().await.remove(server_id).is_some();
        if removed {
            info!(server = %server_id, "server unregistered");
            let _ = self.inner.events_tx.send(DiscoveryEvent::ServerDisconnected {
                server_id: server_id.to_string(),
            });
        }
        removed
    }

    /// Refreshes one server's catalog.
    ///
    /// Errors only for an unknown `server_id`. A disconnected server or a
    /// failed listing yields an empty catalog.
    pub async fn discover_tools_for_server(
        &self,
        server_id: &str,
    ) -> LifeboardResult<Vec<ToolDescriptor>> {
        let (discoverer, gate) = {
            let servers = self.inner.servers.read().await;
            match servers.get(server_id) {
                Some(entry) => (Arc::clone(&entry.discoverer), Arc::clone(&entry.in_flight)),
                None => {
                    return Err(LifeboardError::Discovery(format!(
                        "unknown server '{server_id}'"
                    )))
                }
            }
        };
        Ok(run_discovery(&self.inner, server_id, discoverer, gate).await)
    }

    /// Refreshes every connected server's catalog.
    ///
    /// Disconnected servers are skipped without being queried and do not
    /// appear in the result. A server whose listing fails maps to an empty
    /// catalog so the others still come through.
    pub async fn discover_all_tools(&self) -> HashMap<String, Vec<ToolDescriptor>> {
        sweep(&self.inner).await
    }

    /// Starts the periodic discovery loop: one sweep immediately, then one
    /// per `interval`. Calling this again replaces the running loop instead
    /// of stacking a second one.
    pub fn start_auto_discovery(&self, interval: Duration) {
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            loop {
                timer.tick().await;
                sweep(&inner).await;
            }
        });

        info!(interval_ms = interval.as_millis() as u64, "auto-discovery started");
        let mut slot = self.auto_task.lock();
        if let Some(old) = slot.replace(task) {
            old.abort();
            debug!("previous auto-discovery loop replaced");
        }
    }

    /// Stops the periodic discovery loop. Safe to call when none is running.
    pub fn stop_auto_discovery(&self) {
        if let Some(task) = self.auto_task.lock().take() {
            task.abort();
            info!("auto-discovery stopped");
        }
    }

    /// Polls every discoverer's live connectivity flag against the last
    /// known record. Servers flipping to connected are rediscovered
    /// immediately; servers flipping to disconnected keep their last known
    /// catalog and emit [`DiscoveryEvent::ServerDisconnected`].
    pub async fn update_server_statuses(&self) {
        let targets: Vec<(String, Arc<dyn Discoverer>, bool, Arc<Mutex<()>>)> = {
            let servers = self.inner.servers.read().await;
            servers
                .iter()
                .map(|(id, entry)| {
                    (
                        id.clone(),
                        Arc::clone(&entry.discoverer),
                        entry.connected,
                        Arc::clone(&entry.in_flight),
                    )
                })
                .collect()
        };

        for (server_id, discoverer, was_connected, gate) in targets {
            let connected = discoverer.is_connected().await;
            if connected == was_connected {
                continue;
            }
            {
                let mut servers = self.inner.servers.write().await;
                match servers.get_mut(&server_id) {
                    Some(entry) => entry.connected = connected,
                    // Unregistered while we were polling.
                    None => continue,
                }
            }
            if connected {
                info!(server = %server_id, "server came online, refreshing catalog");
                run_discovery(&self.inner, &server_id, discoverer, gate).await;
            } else {
                info!(server = %server_id, "server went offline");
                let _ = self.inner.events_tx.send(DiscoveryEvent::ServerDisconnected {
                    server_id,
                });
            }
        }
    }

    /// Status snapshot of every registered server, ordered by id.
    pub async fn servers(&self) -> Vec<DiscoveredServer> {
        let servers = self.inner.servers.read().await;
        let mut list: Vec<DiscoveredServer> = servers
            .iter()
            .map(|(id, entry)| DiscoveredServer {
                server_id: id.clone(),
                server_name: entry.server_name.clone(),
                transport: entry.transport,
                connected: entry.connected,
                tool_count: entry.tools.len(),
                last_updated: entry.last_updated,
            })
            .collect();
        list.sort_by(|a, b| a.server_id.cmp(&b.server_id));
        list
    }

    /// Last known catalog of one server.
    pub async fn tools_for(&self, server_id: &str) -> Option<Vec<ToolDescriptor>> {
        let servers = self.inner.servers.read().await;
        servers.get(server_id).map(|entry| entry.tools.clone())
    }

    /// Every known tool across all servers.
    pub async fn all_tools(&self) -> Vec<ToolDescriptor> {
        let servers = self.inner.servers.read().await;
        servers
            .values()
            .flat_map(|entry| entry.tools.iter().cloned())
            .collect()
    }

    /// Number of registered servers.
    pub async fn server_count(&self) -> usize {
        self.inner.servers.read().await.len()
    }

    /// Stops the discovery loop and forgets every server.
    pub async fn shutdown(&self) {
        self.stop_auto_discovery();
        self.inner.servers.write().await.clear();
        info!("discovery registry shut down");
    }
}

impl Default for DiscoveryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DiscoveryRegistry {
    fn drop(&mut self) {
        if let Some(task) = self.auto_task.lock().take() {
            task.abort();
        }
    }
}

/// One full pass over every registered server.
async fn sweep(inner: &Arc<RegistryInner>) -> HashMap<String, Vec<ToolDescriptor>> {
    let targets: Vec<(String, Arc<dyn Discoverer>, Arc<Mutex<()>>)> = {
        let servers = inner.servers.read().await;
        servers
            .iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    Arc::clone(&entry.discoverer),
                    Arc::clone(&entry.in_flight),
                )
            })
            .collect()
    };

    let mut results = HashMap::new();
    for (server_id, discoverer, gate) in targets {
        if !discoverer.is_connected().await {
            debug!(server = %server_id, "skipping disconnected server");
            continue;
        }
        let tools = run_discovery(inner, &server_id, discoverer, gate).await;
        results.insert(server_id, tools);
    }
    results
}

/// Queries one server and publishes the refreshed catalog.
///
/// Returns an empty catalog when the server is disconnected, errors, or was
/// unregistered while the query ran. On failure the entry keeps its last
/// known tools.
async fn run_discovery(
    inner: &Arc<RegistryInner>,
    server_id: &str,
    discoverer: Arc<dyn Discoverer>,
    gate: Arc<Mutex<()>>,
) -> Vec<ToolDescriptor> {
    let _guard = gate.lock().await;

    if !discoverer.is_connected().await {
        debug!(server = %server_id, "server not connected, skipping discovery");
        return Vec::new();
    }

    let tools = match discoverer.discover_tools().await {
        Ok(tools) => sanitize_tools(server_id, tools),
        Err(e) => {
            warn!(server = %server_id, error = %e, "tool discovery failed");
            return Vec::new();
        }
    };

    {
        let mut servers = inner.servers.write().await;
        match servers.get_mut(server_id) {
            Some(entry) => {
                entry.connected = true;
                entry.tools = tools.clone();
                entry.last_updated = Some(Utc::now());
            }
            None => {
                debug!(server = %server_id, "result for unregistered server discarded");
                return Vec::new();
            }
        }
    }

    info!(server = %server_id, tools = tools.len(), "catalog refreshed");
    let _ = inner.events_tx.send(DiscoveryEvent::ToolsUpdated {
        server_id: server_id.to_string(),
        tools: tools.clone(),
    });
    tools
}

// ─── Tests ───────────────────────────────────────────────────────────────────
