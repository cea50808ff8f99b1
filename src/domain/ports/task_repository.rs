//! Task repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{Task, TaskStatus};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
}

/// The outcome of an atomic claim attempt. `None` means the predicate
/// (pending, unowned, deps satisfied, agent under cap) matched no row — the
/// caller surfaces `claim-unavailable` without further diagnosis, per the
/// dispatcher's race-freedom contract.
pub type ClaimOutcome = Option<Task>;

/// Repository interface for Task persistence.
///
/// Every method that mutates a task's status is expected to be called
/// inside a Store transaction owned by the caller (`application::lifecycle`
/// / `application::dispatcher`) so the log write and the rollup update can
/// commit atomically with it.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> CoreResult<()>;
    async fn get(&self, id: Uuid) -> CoreResult<Option<Task>>;
    async fn list(&self, filter: TaskFilter) -> CoreResult<Vec<Task>>;

    /// Tasks with status = pending, no assignee, and every dependency
    /// completed, ordered by priority desc then created_at asc. When
    /// `skills` is non-empty, only tasks whose `task_tags` intersect it are
    /// returned.
    async fn list_eligible(&self, skills: Option<&[String]>, limit: i64) -> CoreResult<Vec<Task>>;

    /// Count of this agent's tasks with status in {assigned, running, reviewing}.
    async fn count_active_for_agent(&self, agent: &str) -> CoreResult<i64>;

    /// Atomic claim per the dispatcher's `UPDATE ... WHERE status = 'pending' ... RETURNING`
    /// contract: dependency completeness and the agent's concurrency cap are
    /// evaluated inside the same statement. Returns `None` on any predicate
    /// mismatch (vanished, already claimed, deps regressed, agent at cap).
    async fn try_claim(&self, task_id: Uuid, agent: &str, max_concurrent: u32) -> CoreResult<ClaimOutcome>;

    /// `assigned -> running`, only if the agent holds no other running task.
    /// Returns `None` if the precondition (status=assigned, assignee=agent,
    /// no other running task for agent) isn't met.
    async fn try_start(&self, task_id: Uuid, agent: &str) -> CoreResult<ClaimOutcome>;

    /// `running -> reviewing`, writing `result`. `None` if the precondition
    /// (status=running, assignee=agent) isn't met.
    async fn try_submit(&self, task_id: Uuid, agent: &str, result: serde_json::Value) -> CoreResult<ClaimOutcome>;

    /// `reviewing -> completed|rejected`.
    async fn try_review(
        &self,
        task_id: Uuid,
        reviewer: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> CoreResult<ClaimOutcome>;

    /// Holder-only release. On a `running` task this also increments
    /// `retry_count` (the reclaim path). `None` if the caller doesn't hold it.
    async fn try_release(&self, task_id: Uuid, agent: &str) -> CoreResult<ClaimOutcome>;

    /// `rejected|failed -> pending`, bounded by `retry_count < max_retries`.
    async fn try_retry(&self, task_id: Uuid) -> CoreResult<ClaimOutcome>;

    /// Any non-terminal status `-> cancelled`.
    async fn try_cancel(&self, task_id: Uuid) -> CoreResult<ClaimOutcome>;

    /// Atomically transition a `running` task out of `running` because its
    /// effective timeout elapsed: to `pending` (incrementing `retry_count`)
    /// if retries remain, else to `failed`. Used by the stuck sweep.
    async fn try_reclaim_stuck(&self, task_id: Uuid) -> CoreResult<ClaimOutcome>;

    /// `running` tasks whose `started_at` is old enough to be worth checking
    /// against their effective timeout (the sweep still recomputes the exact
    /// threshold per task; this is a coarse pre-filter).
    async fn list_running_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> CoreResult<Vec<Task>>;

    async fn count_by_status(&self, project_id: Uuid) -> CoreResult<std::collections::HashMap<TaskStatus, i64>>;
}
