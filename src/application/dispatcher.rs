//! Dispatcher: lists eligible tasks and performs the atomic claim.
//!
//! The cheap concurrency pre-check below exists purely to return the more
//! specific `cap-exceeded` instead of `claim-unavailable` when possible; the
//! atomic `UPDATE ... RETURNING` in the repository remains the sole
//! race-free authority and is always attempted regardless of what the
//! pre-check found.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Task, TaskLogEntry, TaskStatus};
use crate::domain::ports::{TaskLogRepository, TaskRepository};

pub struct Dispatcher {
    task_repo: Arc<dyn TaskRepository>,
    task_log_repo: Arc<dyn TaskLogRepository>,
}

impl Dispatcher {
    pub fn new(task_repo: Arc<dyn TaskRepository>, task_log_repo: Arc<dyn TaskLogRepository>) -> Self {
        Self { task_repo, task_log_repo }
    }

    pub async fn list_eligible(&self, skills: Option<&[String]>, limit: i64) -> CoreResult<Vec<Task>> {
        self.task_repo.list_eligible(skills, limit).await
    }

    pub async fn claim(&self, task_id: Uuid, agent: &str, max_concurrent: u32) -> CoreResult<Task> {
        let active = self.task_repo.count_active_for_agent(agent).await?;
        if active >= i64::from(max_concurrent) {
            return Err(CoreError::CapExceeded {
                agent: agent.to_string(),
                cap: max_concurrent,
            });
        }

        let task = self
            .task_repo
            .try_claim(task_id, agent, max_concurrent)
            .await?
            .ok_or(CoreError::ClaimUnavailable { task_id })?;

        self.task_log_repo
            .append(&TaskLogEntry::new(
                task_id,
                "claimed",
                Some(TaskStatus::Pending),
                Some(TaskStatus::Assigned),
                Some(agent.to_string()),
                None,
            ))
            .await?;

        tracing::info!(task_id = %task_id, agent, action = "claimed", "task claimed");
        Ok(task)
    }
}
