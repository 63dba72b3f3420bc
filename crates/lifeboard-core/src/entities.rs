//! Lifecycle entity model.
//!
//! These types mirror the payloads served by the lifecycle tool server. They
//! live in `lifeboard-core` so that both `lifeboard-services` (which
//! deserializes them from responses) and `lifeboard-cli` (which renders them)
//! can share them without circular deps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Priority assigned to a requirement or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

/// Where a requirement sits in its review lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    Draft,
    UnderReview,
    Approved,
    Implemented,
    Deprecated,
}

impl std::fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RequirementStatus::Draft => "draft",
            RequirementStatus::UnderReview => "under_review",
            RequirementStatus::Approved => "approved",
            RequirementStatus::Implemented => "implemented",
            RequirementStatus::Deprecated => "deprecated",
        };
        write!(f, "{label}")
    }
}

/// Progress state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Blocked,
    Done,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TaskStatus::NotStarted => "not_started",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Done => "done",
        };
        write!(f, "{label}")
    }
}

/// Review state of an architecture decision record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Proposed,
    Accepted,
    Rejected,
    Superseded,
}

/// A tracked product requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// Server-assigned identifier, e.g. `REQ-0007`.
    pub id: String,
    /// Short human-readable title.
    pub title: String,
    /// Full description text.
    #[serde(default)]
    pub description: String,
    /// Current lifecycle status.
    pub status: RequirementStatus,
    /// Assigned priority.
    pub priority: Priority,
    /// Free-form labels attached by reviewers.
    #[serde(default)]
    pub tags: Vec<String>,
    /// UTC timestamp of creation.
    pub created_at: DateTime<Utc>,
    /// UTC timestamp of the last edit.
    pub updated_at: DateTime<Utc>,
}

/// A unit of implementation work, optionally linked to requirements.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Login of the person the task is assigned to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Ids of the requirements this task implements.
    #[serde(default)]
    pub requirement_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A recorded architecture decision (ADR-style).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureDecision {
    pub id: String,
    pub title: String,
    /// The forces and constraints that motivated the decision.
    #[serde(default)]
    pub context: String,
    /// The decision taken.
    #[serde(default)]
    pub decision: String,
    pub status: DecisionStatus,
    /// Observed or expected consequences, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consequences: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate health snapshot of the tracked project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStatus {
    pub name: String,
    /// Current delivery phase label reported by the server.
    pub phase: String,
    /// Entity counts keyed by kind (`requirements`, `tasks`, `decisions`).
    #[serde(default)]
    pub counts: HashMap<String, u64>,
    /// When the project last saw an edit, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// Storage-level information about the server's backing database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    /// Storage engine label, e.g. `sqlite`.
    pub engine: String,
    /// On-disk size in bytes, if the server reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    /// Schema version reported by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
