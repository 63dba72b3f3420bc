use chrono::{DateTime, Utc};
use lifeboard_client::{ServerCapabilities, ToolDef};
use lifeboard_core::LifeboardResult;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// How a discoverer reaches its server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Persistent WebSocket session.
    Socket,
    /// Child process spoken to over stdio pipes.
    Stdio,
    /// Stateless request/response over HTTP.
    Http,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TransportKind::Socket => "socket",
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
        };
        write!(f, "{label}")
    }
}

/// A source of tools for one lifecycle server.
///
/// Implementations wrap whatever transport reaches the server; the registry
/// treats them uniformly and only cares that a connected discoverer can
/// produce tool definitions.
#[async_trait::async_trait]
pub trait Discoverer: Send + Sync {
    /// Stable identifier of the server this discoverer reaches.
    fn server_id(&self) -> &str;

    /// Human-readable server name for status displays.
    fn server_name(&self) -> &str;

    /// The transport this discoverer speaks.
    fn transport(&self) -> TransportKind;

    /// Whether the server can currently be queried.
    async fn is_connected(&self) -> bool;

    /// Fetches the server's tool definitions.
    async fn discover_tools(&self) -> LifeboardResult<Vec<ToolDef>>;

    /// Capabilities advertised by the server.
    async fn capabilities(&self) -> LifeboardResult<ServerCapabilities>;
}

/// A tool definition annotated with the server it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Server that advertises the tool.
    pub server_id: String,
    /// Tool name, unique per server.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the tool's input.
    pub input_schema: serde_json::Value,
    /// Optional grouping label passed through from the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Snapshot of one registered server for status displays.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredServer {
    /// Server identifier.
    pub server_id: String,
    /// Human-readable server name.
    pub server_name: String,
    /// Transport the server is reached over.
    pub transport: TransportKind,
    /// Whether the server was connected at the last status report.
    pub connected: bool,
    /// Number of tools in the last discovered catalog.
    pub tool_count: usize,
    /// When the catalog was last refreshed.
    pub last_updated: Option<DateTime<Utc>>,
}

/// Converts raw tool definitions into descriptors for `server_id`, dropping
/// definitions without a name. A nameless tool cannot be invoked, so keeping
/// it would only confuse the dashboard.
pub fn sanitize_tools(server_id: &str, tools: Vec<ToolDef>) -> Vec<ToolDescriptor> {
    let mut out = Vec::with_capacity(tools.len());
    for tool in tools {
        if tool.name.trim().is_empty() {
            warn!(server = %server_id, "dropping tool definition without a name");
            continue;
        }
        out.push(ToolDescriptor {
            server_id: server_id.to_string(),
            name: tool.name,
            description: tool.description,
            input_schema: tool.input_schema,
            category: tool.category,
        });
    }
    out
}
