//! Reclaims `running` tasks that have exceeded their effective timeout
//! (per-task `timeout_minutes`, falling back to the task type's default).

use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::TaskStatus;
use crate::domain::ports::{AgentRepository, TaskLogRepository, TaskRepository};

use tokio_util::sync::CancellationToken;

pub struct StuckSweep {
    task_repo: Arc<dyn TaskRepository>,
    task_log_repo: Arc<dyn TaskLogRepository>,
    agent_repo: Arc<dyn AgentRepository>,
    interval: Duration,
    default_timeout_minutes: u32,
}

impl StuckSweep {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        task_log_repo: Arc<dyn TaskLogRepository>,
        agent_repo: Arc<dyn AgentRepository>,
        interval_secs: u64,
        default_timeout_minutes: u32,
    ) -> Self {
        Self {
            task_repo,
            task_log_repo,
            agent_repo,
            interval: Duration::from_secs(interval_secs),
            default_timeout_minutes,
        }
    }

    pub async fn run_once(&self) -> crate::domain::errors::CoreResult<usize> {
        // Coarse pre-filter on the smallest timeout we'd ever honor, then
        // recheck each candidate's own effective timeout precisely.
        let coarse_cutoff = chrono::Utc::now() - chrono::Duration::minutes(1);
        let candidates = self.task_repo.list_running_older_than(coarse_cutoff).await?;

        let mut reclaimed = 0usize;
        for task in candidates {
            let Some(started_at) = task.started_at else { continue };
            let timeout_minutes = task.timeout_minutes.unwrap_or(self.default_timeout_minutes);
            let deadline = started_at + chrono::Duration::minutes(i64::from(timeout_minutes));
            if chrono::Utc::now() < deadline {
                continue;
            }

            let Some(updated) = self.task_repo.try_reclaim_stuck(task.id).await? else {
                continue;
            };

            let (action, message) = if updated.status == TaskStatus::Failed {
                ("stuck_failed", Some("retry budget exhausted after timeout".to_string()))
            } else {
                ("stuck_reclaimed", Some("returned to pending after timeout".to_string()))
            };

            self.task_log_repo
                .append(&crate::domain::models::TaskLogEntry::new(
                    task.id,
                    action,
                    Some(TaskStatus::Running),
                    Some(updated.status),
                    None,
                    message,
                ))
                .await?;

            if let Some(assignee) = &task.assignee {
                if updated.status == TaskStatus::Failed {
                    self.agent_repo.record_terminal_outcome(assignee, false).await?;
                } else {
                    self.agent_repo.set_current_task(assignee, None).await?;
                }
            }

            tracing::info!(task_id = %task.id, new_status = updated.status.as_str(), "stuck sweep reclaimed task");
            reclaimed += 1;
        }

        Ok(reclaimed)
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("stuck sweep stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "stuck sweep iteration failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{SqliteAgentRepository, SqliteTaskLogRepository, SqliteTaskRepository};
    use crate::domain::models::{Priority, Task, TaskType};

    #[tokio::test]
    async fn sweep_reclaims_a_timed_out_task_to_pending() {
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        let task_repo: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let task_log_repo: Arc<dyn TaskLogRepository> = Arc::new(SqliteTaskLogRepository::new(pool.clone()));
        let agent_repo: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool));

        let mut task = Task::new(
            uuid::Uuid::new_v4(),
            "t".to_string(),
            "d".to_string(),
            TaskType::Development,
            Priority::default(),
            String::new(),
            vec![],
            vec![],
            Some(0),
            3,
        );
        task_repo.create(&task).await.unwrap();
        task_repo.try_claim(task.id, "agent-a", 3).await.unwrap();
        task_repo.try_start(task.id, "agent-a").await.unwrap();
        task.started_at = Some(chrono::Utc::now() - chrono::Duration::minutes(5));

        let sweep = StuckSweep::new(task_repo.clone(), task_log_repo, agent_repo, 60, 120);
        let reclaimed = sweep.run_once().await.unwrap();
        assert_eq!(reclaimed, 1);

        let updated = task_repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Pending);
        assert_eq!(updated.retry_count, 1);
    }
}
