//! Lifecycle Engine: the task state machine's transition operations.
//!
//! Each method here wraps a single atomic repository transition (the
//! `UPDATE ... RETURNING` statements in `adapters::sqlite::task_repository`)
//! with the audit log write and, on terminal transitions, the agent rollup
//! update.

use std::sync::Arc;

use uuid::Uuid;

use crate::domain::errors::{CoreError, CoreResult};
use crate::domain::models::{Task, TaskLogEntry, TaskStatus};
use crate::domain::ports::{AgentRepository, TaskLogRepository, TaskRepository};

pub struct LifecycleEngine {
    task_repo: Arc<dyn TaskRepository>,
    task_log_repo: Arc<dyn TaskLogRepository>,
    agent_repo: Arc<dyn AgentRepository>,
}

impl LifecycleEngine {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        task_log_repo: Arc<dyn TaskLogRepository>,
        agent_repo: Arc<dyn AgentRepository>,
    ) -> Self {
        Self {
            task_repo,
            task_log_repo,
            agent_repo,
        }
    }

    async fn log(
        &self,
        task_id: Uuid,
        action: &str,
        old: TaskStatus,
        new: TaskStatus,
        actor: Option<&str>,
        message: Option<String>,
    ) -> CoreResult<()> {
        self.task_log_repo
            .append(&TaskLogEntry::new(
                task_id,
                action,
                Some(old),
                Some(new),
                actor.map(str::to_string),
                message,
            ))
            .await
    }

    /// Holder-only start. Forbidden if `agent` doesn't currently hold the task.
    pub async fn start(&self, task_id: Uuid, agent: &str) -> CoreResult<Task> {
        let existing = self.task_repo.get(task_id).await?.ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        if existing.assignee.as_deref() != Some(agent) {
            return Err(CoreError::Forbidden(format!("{agent} does not hold task {task_id}")));
        }

        let task = self
            .task_repo
            .try_start(task_id, agent)
            .await?
            .ok_or_else(|| CoreError::StateConflict(format!("task {task_id} is not assigned to {agent}, or {agent} already holds a running task")))?;

        self.log(task_id, "started", TaskStatus::Assigned, TaskStatus::Running, Some(agent), None)
            .await?;
        self.agent_repo.set_current_task(agent, Some(task_id)).await?;
        tracing::info!(task_id = %task_id, agent, action = "started", "task transitioned to running");
        Ok(task)
    }

    /// Holder-only submit. Forbidden if `agent` doesn't currently hold the task.
    pub async fn submit(&self, task_id: Uuid, agent: &str, result: serde_json::Value) -> CoreResult<Task> {
        let existing = self.task_repo.get(task_id).await?.ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        if existing.assignee.as_deref() != Some(agent) {
            return Err(CoreError::Forbidden(format!("{agent} does not hold task {task_id}")));
        }

        let task = self
            .task_repo
            .try_submit(task_id, agent, result)
            .await?
            .ok_or_else(|| CoreError::StateConflict(format!("task {task_id} is not running under {agent}")))?;

        self.log(task_id, "submitted", TaskStatus::Running, TaskStatus::Reviewing, Some(agent), None)
            .await?;
        tracing::info!(task_id = %task_id, agent, action = "submitted", "task transitioned to reviewing");
        Ok(task)
    }

    pub async fn review(&self, task_id: Uuid, reviewer: &str, approved: bool, feedback: Option<String>) -> CoreResult<Task> {
        // try_review clears `assignee` on the way to a terminal status, so the
        // holder has to be captured before the transition to roll up its stats.
        let existing = self.task_repo.get(task_id).await?.ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        let assignee = existing.assignee.clone();

        let task = self
            .task_repo
            .try_review(task_id, reviewer, approved, feedback.clone())
            .await?
            .ok_or_else(|| CoreError::StateConflict(format!("task {task_id} is not awaiting review")))?;

        let new_status = if approved { TaskStatus::Completed } else { TaskStatus::Rejected };
        let action = if approved { "approved" } else { "rejected" };
        self.log(task_id, action, TaskStatus::Reviewing, new_status, Some(reviewer), feedback)
            .await?;

        if let Some(assignee) = &assignee {
            self.agent_repo.record_terminal_outcome(assignee, approved).await?;
        }

        tracing::info!(task_id = %task_id, reviewer, approved, "task reviewed");
        Ok(task)
    }

    /// Holder-only release. Forbidden if `agent` doesn't currently hold the task.
    pub async fn release(&self, task_id: Uuid, agent: &str) -> CoreResult<Task> {
        let existing = self.task_repo.get(task_id).await?.ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        if existing.assignee.as_deref() != Some(agent) {
            return Err(CoreError::Forbidden(format!("{agent} does not hold task {task_id}")));
        }
        let old_status = existing.status;

        let task = self
            .task_repo
            .try_release(task_id, agent)
            .await?
            .ok_or_else(|| CoreError::StateConflict(format!("task {task_id} is no longer held by {agent}")))?;

        self.log(task_id, "released", old_status, TaskStatus::Pending, Some(agent), None).await?;
        if old_status == TaskStatus::Running {
            self.agent_repo.set_current_task(agent, None).await?;
        }
        tracing::info!(task_id = %task_id, agent, action = "released", "task returned to pending");
        Ok(task)
    }

    pub async fn retry(&self, task_id: Uuid) -> CoreResult<Task> {
        let existing = self.task_repo.get(task_id).await?.ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        if !existing.retry_eligible() {
            return Err(CoreError::StateConflict(format!(
                "task {task_id} has exhausted its retry budget ({}/{})",
                existing.retry_count, existing.max_retries
            )));
        }
        let old_status = existing.status;

        let task = self
            .task_repo
            .try_retry(task_id)
            .await?
            .ok_or_else(|| CoreError::StateConflict(format!("task {task_id} is not in a retryable state")))?;

        self.log(task_id, "retried", old_status, TaskStatus::Pending, None, None).await?;
        tracing::info!(task_id = %task_id, action = "retried", "task returned to pending for retry");
        Ok(task)
    }

    pub async fn cancel(&self, task_id: Uuid, actor: Option<&str>) -> CoreResult<Task> {
        let existing = self.task_repo.get(task_id).await?.ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        let old_status = existing.status;
        let assignee = existing.assignee.clone();

        let task = self
            .task_repo
            .try_cancel(task_id)
            .await?
            .ok_or_else(|| CoreError::StateConflict(format!("task {task_id} is already terminal")))?;

        self.log(task_id, "cancelled", old_status, TaskStatus::Cancelled, actor, None).await?;
        if let Some(assignee) = &assignee {
            self.agent_repo.set_current_task(assignee, None).await?;
        }
        tracing::info!(task_id = %task_id, action = "cancelled", "task cancelled administratively");
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{SqliteAgentRepository, SqliteTaskLogRepository, SqliteTaskRepository};
    use crate::domain::models::{Agent, Priority, TaskType};

    async fn engine() -> (LifecycleEngine, Arc<dyn TaskRepository>, Arc<dyn AgentRepository>) {
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        let task_repo: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let task_log_repo: Arc<dyn TaskLogRepository> = Arc::new(SqliteTaskLogRepository::new(pool.clone()));
        let agent_repo: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool));
        (
            LifecycleEngine::new(task_repo.clone(), task_log_repo, agent_repo.clone()),
            task_repo,
            agent_repo,
        )
    }

    #[tokio::test]
    async fn release_is_forbidden_for_non_holder() {
        let (engine, task_repo, agent_repo) = engine().await;
        agent_repo
            .upsert(&Agent::new("agent-a".to_string(), "worker".to_string(), None, vec![]))
            .await
            .unwrap();

        let task = Task::new(
            Uuid::new_v4(),
            "t".to_string(),
            "d".to_string(),
            TaskType::Development,
            Priority::default(),
            String::new(),
            vec![],
            vec![],
            None,
            3,
        );
        task_repo.create(&task).await.unwrap();
        task_repo.try_claim(task.id, "agent-a", 3).await.unwrap();

        let result = engine.release(task.id, "agent-b").await;
        assert!(matches!(result, Err(CoreError::Forbidden(_))));
    }

    #[tokio::test]
    async fn review_approval_updates_agent_rollup() {
        let (engine, task_repo, agent_repo) = engine().await;
        agent_repo
            .upsert(&Agent::new("agent-a".to_string(), "worker".to_string(), None, vec![]))
            .await
            .unwrap();

        let task = Task::new(
            Uuid::new_v4(),
            "t".to_string(),
            "d".to_string(),
            TaskType::Development,
            Priority::default(),
            String::new(),
            vec![],
            vec![],
            None,
            3,
        );
        task_repo.create(&task).await.unwrap();
        task_repo.try_claim(task.id, "agent-a", 3).await.unwrap();
        engine.start(task.id, "agent-a").await.unwrap();
        task_repo.try_submit(task.id, "agent-a", serde_json::json!({})).await.unwrap();

        engine.review(task.id, "reviewer-a", true, None).await.unwrap();

        let agent = agent_repo.get_by_name("agent-a").await.unwrap().unwrap();
        assert_eq!(agent.stats.completed_tasks, 1);
        assert!(agent.current_task_id.is_none());
    }
}
