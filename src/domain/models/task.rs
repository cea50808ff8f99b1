//! Task domain model.
//!
//! Tasks are discrete units of work that agents claim, execute, and submit
//! for review. They form a DAG via `dependencies`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the lifecycle state machine.
///
/// See `valid_transitions` for the admissible edges; `rejected` is
/// transient — it exists only to carry feedback back to the pool via retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Reviewing,
    Completed,
    Failed,
    Cancelled,
    Rejected,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Running => "running",
            Self::Reviewing => "reviewing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "running" => Some(Self::Running),
            "reviewing" => Some(Self::Reviewing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Terminal states never transition further (cancel is the only exception,
    /// and cancel itself is terminal).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `assignee` must be non-empty for a task in this status.
    pub fn requires_assignee(self) -> bool {
        matches!(self, Self::Assigned | Self::Running | Self::Reviewing)
    }
}

/// Closed set of task kinds; drives per-type defaults (timeout, retries, priority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Research,
    Copywrite,
    Video,
    Review,
    Publish,
    Analysis,
    Design,
    Development,
    Testing,
    Deployment,
    Coordination,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Copywrite => "copywrite",
            Self::Video => "video",
            Self::Review => "review",
            Self::Publish => "publish",
            Self::Analysis => "analysis",
            Self::Design => "design",
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Deployment => "deployment",
            Self::Coordination => "coordination",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "research" => Some(Self::Research),
            "copywrite" => Some(Self::Copywrite),
            "video" => Some(Self::Video),
            "review" => Some(Self::Review),
            "publish" => Some(Self::Publish),
            "analysis" => Some(Self::Analysis),
            "design" => Some(Self::Design),
            "development" => Some(Self::Development),
            "testing" => Some(Self::Testing),
            "deployment" => Some(Self::Deployment),
            "coordination" => Some(Self::Coordination),
            _ => None,
        }
    }

    /// All variants, for validating freeform strings and for seeding defaults.
    pub const ALL: [Self; 11] = [
        Self::Research,
        Self::Copywrite,
        Self::Video,
        Self::Review,
        Self::Publish,
        Self::Analysis,
        Self::Design,
        Self::Development,
        Self::Testing,
        Self::Deployment,
        Self::Coordination,
    ];
}

/// Priority, higher claims before lower. Clamped to `[1, 10]` at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    /// Build a priority, clamping to the valid range rather than rejecting —
    /// callers that want a hard validation error should check `in_range`
    /// first (see `application::dependency_validator` / task creation).
    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub const fn in_range(value: u8) -> bool {
        value >= Self::MIN && value <= Self::MAX
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(5)
    }
}

/// A discrete unit of work that can be claimed and executed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Agent name currently holding the task, empty iff not held.
    pub assignee: Option<String>,
    pub reviewer: Option<String>,
    pub acceptance_criteria: String,
    pub parent_task_id: Option<Uuid>,
    /// Ordered list of task ids this task waits on.
    pub dependencies: Vec<Uuid>,
    pub task_tags: Vec<String>,
    pub estimated_hours: Option<f64>,
    pub timeout_minutes: Option<u32>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub result: Option<serde_json::Value>,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Construct a brand-new task in `pending` with no assignee, honoring the
    /// per-agent/per-task invariants from the start (zero retries, no
    /// timestamps beyond `created_at`/`updated_at`).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project_id: Uuid,
        title: String,
        description: String,
        task_type: TaskType,
        priority: Priority,
        acceptance_criteria: String,
        dependencies: Vec<Uuid>,
        task_tags: Vec<String>,
        timeout_minutes: Option<u32>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            title,
            description,
            task_type,
            status: TaskStatus::Pending,
            priority,
            assignee: None,
            reviewer: None,
            acceptance_criteria,
            parent_task_id: None,
            dependencies,
            task_tags,
            estimated_hours: None,
            timeout_minutes,
            retry_count: 0,
            max_retries,
            result: None,
            feedback: None,
            created_at: now,
            assigned_at: None,
            started_at: None,
            updated_at: now,
            completed_at: None,
            due_at: None,
        }
    }

    /// Whether a retry of this (terminal-recoverable) task is allowed.
    pub fn retry_eligible(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
