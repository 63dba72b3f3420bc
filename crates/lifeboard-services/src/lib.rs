//! Feature service facades over the lifecycle client.
//!
//! Each service translates typed domain calls (requirements, tasks,
//! architecture decisions, project, database) into protocol requests and
//! folds every outcome into the uniform [`Envelope`]. Facades never return
//! `Err`: remote errors, timeouts, and connection loss all come back as
//! `Envelope { success: false, .. }`, so UI code has exactly one shape to
//! handle.

use lifeboard_client::LifecycleClient;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Requirement editing and listing.
pub mod requirements;
/// Task editing and listing.
pub mod tasks;
/// Architecture decision records.
pub mod architecture;
/// Project status and switching.
pub mod project;
/// Backing-database information.
pub mod database;

pub use architecture::{ArchitectureService, DecisionPatch, NewDecision};
pub use database::DatabaseService;
pub use project::ProjectService;
pub use requirements::{NewRequirement, RequirementPatch, RequirementsService};
pub use tasks::{NewTask, TaskPatch, TasksService};

/// Uniform result of every facade call.
///
/// `success` is `true` exactly when `data` is present; on failure `error`
/// holds a human-readable message suitable for direct display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// The typed payload, present on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Failure message, present when `success` is `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    /// A successful envelope carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// A failed envelope carrying `error`.
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Issues one protocol request and folds the outcome into an [`Envelope`].
///
/// The result payload is expected under the noun field `key` (the way
/// `tools/list` nests its catalog under `tools`); a payload that is the bare
/// entity is accepted as well.
pub(crate) async fn call<T: DeserializeOwned>(
    client: &LifecycleClient,
    method: &str,
    params: Option<Value>,
    key: &str,
) -> Envelope<T> {
    let value = match client.request(method, params).await {
        Ok(value) => value,
        Err(e) => {
            warn!(method, error = %e, "facade request failed");
            return Envelope::fail(e.to_string());
        }
    };
    match extract(value, key) {
        Ok(data) => {
            debug!(method, "facade request succeeded");
            Envelope::ok(data)
        }
        Err(e) => {
            warn!(method, error = %e, "facade payload did not deserialize");
            Envelope::fail(format!("malformed {method} response: {e}"))
        }
    }
}

/// Pulls the noun-keyed field out of a result payload, falling back to the
/// whole payload when the field is absent.
fn extract<T: DeserializeOwned>(mut value: Value, key: &str) -> Result<T, serde_json::Error> {
    if let Some(field) = value.get_mut(key) {
        return serde_json::from_value(field.take());
    }
    serde_json::from_value(value)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
