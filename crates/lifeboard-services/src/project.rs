//! Project facade: status snapshots and switching the active project.

use crate::{call, Envelope};
use lifeboard_client::LifecycleClient;
use lifeboard_core::entities::ProjectStatus;
use serde_json::json;
use std::sync::Arc;

/// Facade over the server's project operations.
pub struct ProjectService {
    client: Arc<LifecycleClient>,
}

impl ProjectService {
    /// Creates the facade over a shared client.
    pub fn new(client: Arc<LifecycleClient>) -> Self {
        Self { client }
    }

    /// The health snapshot of the currently active project.
    pub async fn status(&self) -> Envelope<ProjectStatus> {
        call(&self.client, "project/status", None, "project").await
    }

    /// Switches the server to another project and returns its snapshot.
    pub async fn switch(&self, name: &str) -> Envelope<ProjectStatus> {
        call(
            &self.client,
            "project/switch",
            Some(json!({"project": name})),
            "project",
        )
        .await
    }
}
