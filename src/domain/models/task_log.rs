//! Append-only task audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::TaskStatus;

/// One audit entry for a task status change, written in the same transaction
/// as the change it records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLogEntry {
    pub id: Uuid,
    pub task_id: Uuid,
    pub action: String,
    pub old_status: Option<TaskStatus>,
    pub new_status: Option<TaskStatus>,
    pub actor: Option<String>,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskLogEntry {
    pub fn new(
        task_id: Uuid,
        action: impl Into<String>,
        old_status: Option<TaskStatus>,
        new_status: Option<TaskStatus>,
        actor: Option<String>,
        message: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            action: action.into(),
            old_status,
            new_status,
            actor,
            message,
            created_at: Utc::now(),
        }
    }
}
