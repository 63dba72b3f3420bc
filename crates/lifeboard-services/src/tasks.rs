//! Task facade: create, list, get, and update implementation tasks.

use crate::{call, Envelope};
use lifeboard_client::LifecycleClient;
use lifeboard_core::entities::{Priority, Task, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Fields for creating a task. The server assigns the id, the
/// `not_started` status, and both timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    /// Short human-readable title.
    pub title: String,
    /// Full description text.
    #[serde(default)]
    pub description: String,
    /// Assigned priority.
    pub priority: Priority,
    /// Login of the assignee, if known at creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Ids of the requirements this task implements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirement_ids: Vec<String>,
}

/// Partial update of a task; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_ids: Option<Vec<String>>,
}

/// Facade over the server's task operations.
pub struct TasksService {
    client: Arc<LifecycleClient>,
}

impl TasksService {
    /// Creates the facade over a shared client.
    pub fn new(client: Arc<LifecycleClient>) -> Self {
        Self { client }
    }

    /// Lists every task.
    pub async fn list(&self) -> Envelope<Vec<Task>> {
        call(&self.client, "tasks/list", None, "tasks").await
    }

    /// Fetches one task by id.
    pub async fn get(&self, id: &str) -> Envelope<Task> {
        call(&self.client, "tasks/get", Some(json!({"id": id})), "task").await
    }

    /// Creates a task and returns the stored entity.
    pub async fn create(&self, new: NewTask) -> Envelope<Task> {
        call(
            &self.client,
            "tasks/create",
            Some(json!({"task": new})),
            "task",
        )
        .await
    }

    /// Applies a partial update and returns the updated entity.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Envelope<Task> {
        call(
            &self.client,
            "tasks/update",
            Some(json!({"id": id, "changes": patch})),
            "task",
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
    fn new_task_serializes_camel_case_links() {
        let new = NewTask {
            title: "Wire the watch command".into(),
            description: "Stream state changes to the terminal.".into(),
            priority: Priority::Medium,
            assignee: None,
            requirement_ids: vec!["REQ-0007".into()],
        };
        let value = serde_json::to_value(&new).unwrap();
        assert_eq!(value["requirementIds"][0], "REQ-0007");
        assert!(value.get("assignee").is_none());
    }

    #[test]
    fn empty_patch_serializes_to_an_empty_object() {
        let value = serde_json::to_value(TaskPatch::default()).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
