//! Wire frame types for the lifecycle dashboard protocol.
//!
//! Frames are JSON objects. A request carries `{id, method, params}`, a
//! response `{id, result}` or `{id, error}`, and a notification
//! `{method, params}` with no id. Inbound parsing tolerates unknown fields.

use serde::{Deserialize, Serialize};

/// Protocol revision sent during the initialize handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Outbound request frame, correlated to its response by `id`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestFrame {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RequestFrame {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// Notification frame. Carries no id and expects no reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationFrame {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl NotificationFrame {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Inbound response frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

/// Error object carried by a response frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Why an inbound frame could not be classified.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload was not valid JSON or did not match the frame shape.
    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The payload parsed but carries neither a numeric id nor a method.
    #[error("frame has neither a numeric id nor a method")]
    Shape,
}

/// An inbound frame classified by shape.
#[derive(Debug)]
pub enum InboundFrame {
    /// A response to one of our requests.
    Response(ResponseFrame),
    /// A server-initiated notification.
    Notification(NotificationFrame),
}

impl InboundFrame {
    /// Classifies a raw text frame: a numeric `id` marks a response, a bare
    /// `method` a notification. Anything else is malformed.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("id").and_then(serde_json::Value::as_u64).is_some() {
            Ok(InboundFrame::Response(serde_json::from_value(value)?))
        } else if value.get("method").is_some() {
            Ok(InboundFrame::Notification(serde_json::from_value(value)?))
        } else {
            Err(FrameError::Shape)
        }
    }
}

// ── Handshake types ─────────────────────────────────────────────────────────

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: serde_json::Value,
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

/// Client identification sent during the handshake.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// Server capabilities from the `initialize` response.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    #[serde(default)]
    pub tools: Option<serde_json::Value>,
    #[serde(default)]
    pub resources: Option<serde_json::Value>,
    #[serde(default)]
    pub prompts: Option<serde_json::Value>,
}

/// Result of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

/// Server identification from the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

// ── Tool listing types ──────────────────────────────────────────────────────

/// Tool definition from a `tools/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_input_schema", rename = "inputSchema")]
    pub input_schema: serde_json::Value,
    /// Optional grouping label; most servers omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

fn default_input_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Payload shape of a `tools/list` result.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolListResult {
    #[serde(default)]
    pub tools: Vec<ToolDef>,
}
