use crate::discoverer::{Discoverer, TransportKind};
use lifeboard_client::{LifecycleClient, ServerCapabilities, ToolDef, ToolListResult};
use lifeboard_core::{LifeboardError, LifeboardResult};
use std::sync::Arc;
use tracing::debug;

/// [`Discoverer`] backed by a socket-transport [`LifecycleClient`].
///
/// Tool listings go over the client's live connection; capabilities come
/// from the handshake result the client cached when the connection came up.
pub struct SocketDiscoverer {
    server_id: String,
    server_name: String,
    client: Arc<LifecycleClient>,
}

impl SocketDiscoverer {
    /// Wraps `client` as a discoverer for the server identified by
    /// `server_id`.
    pub fn new(
        server_id: impl Into<String>,
        server_name: impl Into<String>,
        client: Arc<LifecycleClient>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            server_name: server_name.into(),
            client,
        }
    }

    /// The underlying client, for callers that need direct requests.
    pub fn client(&self) -> &Arc<LifecycleClient> {
        &self.client
    }
}

#[async_trait::async_trait]
impl Discoverer for SocketDiscoverer {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn transport(&self) -> TransportKind {
        TransportKind::Socket
    }

    async fn is_connected(&self) -> bool {
        self.client.is_ready()
    }

    async fn discover_tools(&self) -> LifeboardResult<Vec<ToolDef>> {
        let value = self.client.request("tools/list", None).await?;
        let listing: ToolListResult = serde_json::from_value(value)?;
        debug!(server = %self.server_id, tools = listing.tools.len(), "listed tools");
        Ok(listing.tools)
    }

    async fn capabilities(&self) -> LifeboardResult<ServerCapabilities> {
        match self.client.server_handshake() {
            Some(init) => Ok(init.capabilities),
            None => Err(LifeboardError::NotConnected(
                "handshake has not completed".into(),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lifeboard_client::ClientConfig;

    fn offline_discoverer() -> SocketDiscoverer {
        let client = Arc::new(LifecycleClient::new(ClientConfig::new(
            "ws://127.0.0.1:1/mcp",
        )));
        SocketDiscoverer::new("lifecycle", "Lifecycle MCP", client)
    }

    #[tokio::test]
    async fn reports_socket_transport_and_identity() {
        let disco = offline_discoverer();
        assert_eq!(disco.server_id(), "lifecycle");
        assert_eq!(disco.server_name(), "Lifecycle MCP");
        assert_eq!(disco.transport(), TransportKind::Socket);
    }

    #[tokio::test]
    async fn offline_client_is_not_connected() {
        let disco = offline_discoverer();
        assert!(!disco.is_connected().await);
    }

    #[tokio::test]
    async fn discover_tools_fails_fast_when_offline() {
        let disco = offline_discoverer();
        let err = disco.discover_tools().await.unwrap_err();
        assert!(matches!(err, LifeboardError::NotConnected(_)));
    }

    #[tokio::test]
    async fn capabilities_require_a_completed_handshake() {
        let disco = offline_discoverer();
        let err = disco.capabilities().await.unwrap_err();
        assert!(matches!(err, LifeboardError::NotConnected(_)));
    }
}
