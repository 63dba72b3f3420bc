//! Requirement facade: create, list, get, and update tracked requirements.

use crate::{call, Envelope};
use lifeboard_client::LifecycleClient;
use lifeboard_core::entities::{Priority, Requirement, RequirementStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Fields for creating a requirement. The server assigns the id, the
/// `draft` status, and both timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequirement {
    /// Short human-readable title.
    pub title: String,
    /// Full description text.
    #[serde(default)]
    pub description: String,
    /// Assigned priority.
    pub priority: Priority,
    /// Free-form labels.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Partial update of a requirement; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RequirementStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Facade over the server's requirement operations.
pub struct RequirementsService {
    client: Arc<LifecycleClient>,
}

impl RequirementsService {
    /// Creates the facade over a shared client.
    pub fn new(client: Arc<LifecycleClient>) -> Self {
        Self { client }
    }

    /// Lists every requirement.
    pub async fn list(&self) -> Envelope<Vec<Requirement>> {
        call(&self.client, "requirements/list", None, "requirements").await
    }

    /// Fetches one requirement by id.
    pub async fn get(&self, id: &str) -> Envelope<Requirement> {
        call(
            &self.client,
            "requirements/get",
            Some(json!({"id": id})),
            "requirement",
        )
        .await
    }

    /// Creates a requirement and returns the stored entity.
    pub async fn create(&self, new: NewRequirement) -> Envelope<Requirement> {
        call(
            &self.client,
            "requirements/create",
            Some(json!({"requirement": new})),
            "requirement",
        )
        .await
    }

    /// Applies a partial update and returns the updated entity.
    pub async fn update(&self, id: &str, patch: RequirementPatch) -> Envelope<Requirement> {
        call(
            &self.client,
            "requirements/update",
            Some(json!({"id": id, "changes": patch})),
            "requirement",
        )
        .await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
