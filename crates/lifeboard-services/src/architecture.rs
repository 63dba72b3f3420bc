//! Architecture decision record facade.

use crate::{call, Envelope};
use lifeboard_client::LifecycleClient;
use lifeboard_core::entities::{ArchitectureDecision, DecisionStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Fields for recording a decision. The server assigns the id, the
/// `proposed` status, and both timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDecision {
    /// Short human-readable title.
    pub title: String,
    /// The forces and constraints that motivated the decision.
    #[serde(default)]
    pub context: String,
    /// The decision taken.
    #[serde(default)]
    pub decision: String,
}

/// Partial update of a decision record; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DecisionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequences: Option<String>,
}

/// Facade over the server's architecture decision operations.
pub struct ArchitectureService {
    client: Arc<LifecycleClient>,
}

impl ArchitectureService {
    /// Creates the facade over a shared client.
    pub fn new(client: Arc<LifecycleClient>) -> Self {
        Self { client }
    }

    /// Lists every recorded decision.
    pub async fn list(&self) -> Envelope<Vec<ArchitectureDecision>> {
        call(&self.client, "architecture/list", None, "decisions").await
    }

    /// Fetches one decision by id.
    pub async fn get(&self, id: &str) -> Envelope<ArchitectureDecision> {
        call(
            &self.client,
            "architecture/get",
            Some(json!({"id": id})),
            "decision",
        )
        .await
    }

    /// Records a decision and returns the stored entity.
    pub async fn create(&self, new: NewDecision) -> Envelope<ArchitectureDecision> {
        call(
            &self.client,
            "architecture/create",
            Some(json!({"decision": new})),
            "decision",
        )
        .await
    }

    /// Applies a partial update and returns the updated entity.
    pub async fn update(&self, id: &str, patch: DecisionPatch) -> Envelope<ArchitectureDecision> {
        call(
            &self.client,
            "architecture/update",
            Some(json!({"id": id, "changes": patch})),
            "decision",
        )
        .await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn status_patch_uses_snake_case_labels() {
        let patch = DecisionPatch {
            status: Some(DecisionStatus::Superseded),
            ..DecisionPatch::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({"status": "superseded"}));
    }
}
