//! SQLite implementation of `TaskRepository`.
//!
//! The claim and lifecycle transitions are each a single `UPDATE ... WHERE
//! <preconditions> RETURNING *` statement: SQLite evaluates the whole
//! predicate (status, ownership, dependency completeness, concurrency cap)
//! and performs the write atomically, so two dispatchers racing for the same
//! task can never both succeed — the loser simply affects zero rows.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{Priority, Task, TaskStatus, TaskType};
use crate::domain::ports::{ClaimOutcome, TaskFilter, TaskRepository};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Non-terminal statuses that count against an agent's concurrency cap.
const ACTIVE_STATUSES: &str = "'assigned', 'running', 'reviewing'";

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> CoreResult<()> {
        let dependencies_json = serde_json::to_string(&task.dependencies)?;
        let task_tags_json = serde_json::to_string(&task.task_tags)?;
        let result_json = task.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO tasks (
                id, project_id, title, description, task_type, status, priority,
                assignee, reviewer, acceptance_criteria, parent_task_id, dependencies,
                task_tags, estimated_hours, timeout_minutes, retry_count, max_retries,
                result, feedback, created_at, assigned_at, started_at, updated_at,
                completed_at, due_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(task.project_id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.task_type.as_str())
        .bind(task.status.as_str())
        .bind(i64::from(task.priority.get()))
        .bind(&task.assignee)
        .bind(&task.reviewer)
        .bind(&task.acceptance_criteria)
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(&dependencies_json)
        .bind(&task_tags_json)
        .bind(task.estimated_hours)
        .bind(task.timeout_minutes.map(i64::from))
        .bind(i64::from(task.retry_count))
        .bind(i64::from(task.max_retries))
        .bind(&result_json)
        .bind(&task.feedback)
        .bind(task.created_at.to_rfc3339())
        .bind(task.assigned_at.map(|t| t.to_rfc3339()))
        .bind(task.started_at.map(|t| t.to_rfc3339()))
        .bind(task.updated_at.to_rfc3339())
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.due_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: TaskFilter) -> CoreResult<Vec<Task>> {
        let mut query = String::from("SELECT * FROM tasks WHERE 1 = 1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(project_id) = &filter.project_id {
            query.push_str(" AND project_id = ?");
            bindings.push(project_id.to_string());
        }
        if let Some(status) = &filter.status {
            query.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(assignee) = &filter.assignee {
            query.push_str(" AND assignee = ?");
            bindings.push(assignee.clone());
        }
        query.push_str(" ORDER BY priority DESC, created_at ASC");

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_eligible(&self, skills: Option<&[String]>, limit: i64) -> CoreResult<Vec<Task>> {
        let mut query = String::from(
            r#"SELECT * FROM tasks t
               WHERE t.status = 'pending' AND t.assignee IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM json_each(t.dependencies) je
                   LEFT JOIN tasks dep ON dep.id = je.value
                   WHERE dep.id IS NULL OR dep.status != 'completed'
               )"#,
        );

        let skills = skills.filter(|s| !s.is_empty());
        if let Some(skills) = skills {
            query.push_str(
                r#" AND EXISTS (
                    SELECT 1 FROM json_each(t.task_tags) tg WHERE tg.value IN ("#,
            );
            let placeholders = vec!["?"; skills.len()].join(", ");
            query.push_str(&placeholders);
            query.push_str("))");
        }

        query.push_str(" ORDER BY t.priority DESC, t.created_at ASC LIMIT ?");

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        if let Some(skills) = skills {
            for skill in skills {
                q = q.bind(skill);
            }
        }
        q = q.bind(limit);

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_active_for_agent(&self, agent: &str) -> CoreResult<i64> {
        let query = format!("SELECT COUNT(*) FROM tasks WHERE assignee = ? AND status IN ({ACTIVE_STATUSES})");
        let (count,): (i64,) = sqlx::query_as(&query).bind(agent).fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn try_claim(&self, task_id: Uuid, agent: &str, max_concurrent: u32) -> CoreResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let query = format!(
            r#"UPDATE tasks
               SET assignee = ?, status = 'assigned', assigned_at = ?, updated_at = ?
               WHERE id = ? AND status = 'pending' AND assignee IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM json_each(dependencies) je
                   LEFT JOIN tasks dep ON dep.id = je.value
                   WHERE dep.id IS NULL OR dep.status != 'completed'
               )
               AND (SELECT COUNT(*) FROM tasks t2 WHERE t2.assignee = ? AND t2.status IN ({ACTIVE_STATUSES})) < ?
               RETURNING *"#
        );

        let row: Option<TaskRow> = sqlx::query_as(&query)
            .bind(agent)
            .bind(&now)
            .bind(&now)
            .bind(task_id.to_string())
            .bind(agent)
            .bind(i64::from(max_concurrent))
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn try_start(&self, task_id: Uuid, agent: &str) -> CoreResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let row: Option<TaskRow> = sqlx::query_as(
            r#"UPDATE tasks
               SET status = 'running', started_at = ?, updated_at = ?
               WHERE id = ? AND status = 'assigned' AND assignee = ?
               AND NOT EXISTS (SELECT 1 FROM tasks t2 WHERE t2.assignee = ? AND t2.status = 'running')
               RETURNING *"#,
        )
        .bind(&now)
        .bind(&now)
        .bind(task_id.to_string())
        .bind(agent)
        .bind(agent)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn try_submit(&self, task_id: Uuid, agent: &str, result: serde_json::Value) -> CoreResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let result_json = serde_json::to_string(&result)?;
        let row: Option<TaskRow> = sqlx::query_as(
            r#"UPDATE tasks
               SET status = 'reviewing', result = ?, updated_at = ?
               WHERE id = ? AND status = 'running' AND assignee = ?
               RETURNING *"#,
        )
        .bind(&result_json)
        .bind(&now)
        .bind(task_id.to_string())
        .bind(agent)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn try_review(
        &self,
        task_id: Uuid,
        reviewer: &str,
        approved: bool,
        feedback: Option<String>,
    ) -> CoreResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let new_status = if approved { "completed" } else { "rejected" };
        let completed_at = approved.then(|| now.clone());
        let row: Option<TaskRow> = sqlx::query_as(
            r#"UPDATE tasks
               SET status = ?, assignee = NULL, reviewer = ?, feedback = ?, completed_at = ?, updated_at = ?
               WHERE id = ? AND status = 'reviewing'
               RETURNING *"#,
        )
        .bind(new_status)
        .bind(reviewer)
        .bind(&feedback)
        .bind(&completed_at)
        .bind(&now)
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn try_release(&self, task_id: Uuid, agent: &str) -> CoreResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let row: Option<TaskRow> = sqlx::query_as(
            r#"UPDATE tasks
               SET status = 'pending',
                   assignee = NULL,
                   assigned_at = NULL,
                   started_at = CASE WHEN status = 'running' THEN NULL ELSE started_at END,
                   retry_count = retry_count + (CASE WHEN status = 'running' THEN 1 ELSE 0 END),
                   updated_at = ?
               WHERE id = ? AND assignee = ? AND status IN ('assigned', 'running')
               RETURNING *"#,
        )
        .bind(&now)
        .bind(task_id.to_string())
        .bind(agent)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn try_retry(&self, task_id: Uuid) -> CoreResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let row: Option<TaskRow> = sqlx::query_as(
            r#"UPDATE tasks
               SET status = 'pending', assignee = NULL, reviewer = NULL, updated_at = ?
               WHERE id = ? AND status IN ('rejected', 'failed') AND retry_count < max_retries
               RETURNING *"#,
        )
        .bind(&now)
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn try_cancel(&self, task_id: Uuid) -> CoreResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let row: Option<TaskRow> = sqlx::query_as(
            r#"UPDATE tasks
               SET status = 'cancelled', assignee = NULL, completed_at = ?, updated_at = ?
               WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')
               RETURNING *"#,
        )
        .bind(&now)
        .bind(&now)
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn try_reclaim_stuck(&self, task_id: Uuid) -> CoreResult<ClaimOutcome> {
        let now = Utc::now().to_rfc3339();
        let row: Option<TaskRow> = sqlx::query_as(
            r#"UPDATE tasks
               SET status = CASE WHEN retry_count < max_retries THEN 'pending' ELSE 'failed' END,
                   assignee = NULL,
                   started_at = CASE WHEN retry_count < max_retries THEN NULL ELSE started_at END,
                   retry_count = CASE WHEN retry_count < max_retries THEN retry_count + 1 ELSE retry_count END,
                   completed_at = CASE WHEN retry_count < max_retries THEN completed_at ELSE ? END,
                   updated_at = ?
               WHERE id = ? AND status = 'running'
               RETURNING *"#,
        )
        .bind(&now)
        .bind(&now)
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_running_older_than(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE status = 'running' AND started_at <= ?")
            .bind(cutoff.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn count_by_status(&self, project_id: Uuid) -> CoreResult<HashMap<TaskStatus, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as("SELECT status, COUNT(*) FROM tasks WHERE project_id = ? GROUP BY status")
            .bind(project_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            if let Some(status) = TaskStatus::from_str(&status_str) {
                counts.insert(status, count);
            }
        }
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    project_id: String,
    title: String,
    description: String,
    task_type: String,
    status: String,
    priority: i64,
    assignee: Option<String>,
    reviewer: Option<String>,
    acceptance_criteria: String,
    parent_task_id: Option<String>,
    dependencies: Option<String>,
    task_tags: Option<String>,
    estimated_hours: Option<f64>,
    timeout_minutes: Option<i64>,
    retry_count: i64,
    max_retries: i64,
    result: Option<String>,
    feedback: Option<String>,
    created_at: String,
    assigned_at: Option<String>,
    started_at: Option<String>,
    updated_at: String,
    completed_at: Option<String>,
    due_at: Option<String>,
}

impl TryFrom<TaskRow> for Task {
    type Error = crate::domain::errors::CoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let dependencies: Vec<Uuid> = super::parse_json_or_default(row.dependencies)?;
        let task_tags: Vec<String> = super::parse_json_or_default(row.task_tags)?;
        let result = row.result.map(|r| serde_json::from_str(&r)).transpose()?;

        Ok(Task {
            id: super::parse_uuid(&row.id)?,
            project_id: super::parse_uuid(&row.project_id)?,
            title: row.title,
            description: row.description,
            task_type: TaskType::from_str(&row.task_type)
                .ok_or_else(|| Self::Error::Internal(format!("invalid task_type: {}", row.task_type)))?,
            status: TaskStatus::from_str(&row.status)
                .ok_or_else(|| Self::Error::Internal(format!("invalid status: {}", row.status)))?,
            priority: Priority::new(row.priority as u8),
            assignee: row.assignee,
            reviewer: row.reviewer,
            acceptance_criteria: row.acceptance_criteria,
            parent_task_id: super::parse_optional_uuid(row.parent_task_id)?,
            dependencies,
            task_tags,
            estimated_hours: row.estimated_hours,
            timeout_minutes: row.timeout_minutes.map(|v| v as u32),
            retry_count: row.retry_count as u32,
            max_retries: row.max_retries as u32,
            result,
            feedback: row.feedback,
            created_at: super::parse_datetime(&row.created_at)?,
            assigned_at: super::parse_optional_datetime(row.assigned_at)?,
            started_at: super::parse_optional_datetime(row.started_at)?,
            updated_at: super::parse_datetime(&row.updated_at)?,
            completed_at: super::parse_optional_datetime(row.completed_at)?,
            due_at: super::parse_optional_datetime(row.due_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::TaskType;

    async fn setup() -> SqliteTaskRepository {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        SqliteTaskRepository::new(pool)
    }

    fn sample(project_id: Uuid) -> Task {
        Task::new(
            project_id,
            "title".to_string(),
            "description".to_string(),
            TaskType::Development,
            Priority::default(),
            String::new(),
            vec![],
            vec![],
            None,
            3,
        )
    }

    #[tokio::test]
    async fn create_and_get_round_trips() {
        let repo = setup().await;
        let task = sample(Uuid::new_v4());
        repo.create(&task).await.unwrap();

        let fetched = repo.get(task.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "title");
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn try_claim_is_exclusive_under_race() {
        let repo = setup().await;
        let task = sample(Uuid::new_v4());
        repo.create(&task).await.unwrap();

        let first = repo.try_claim(task.id, "agent-a", 3).await.unwrap();
        assert!(first.is_some());

        let second = repo.try_claim(task.id, "agent-b", 3).await.unwrap();
        assert!(second.is_none(), "a task already assigned must not be claimable again");
    }

    #[tokio::test]
    async fn try_claim_respects_unsatisfied_dependency() {
        let repo = setup().await;
        let project_id = Uuid::new_v4();
        let dep = sample(project_id);
        repo.create(&dep).await.unwrap();

        let mut task = sample(project_id);
        task.dependencies = vec![dep.id];
        repo.create(&task).await.unwrap();

        let claimed = repo.try_claim(task.id, "agent-a", 3).await.unwrap();
        assert!(claimed.is_none(), "dependency is still pending, not completed");
    }

    #[tokio::test]
    async fn try_claim_respects_concurrency_cap() {
        let repo = setup().await;
        let project_id = Uuid::new_v4();
        let held = sample(project_id);
        repo.create(&held).await.unwrap();
        repo.try_claim(held.id, "agent-a", 1).await.unwrap().unwrap();

        let extra = sample(project_id);
        repo.create(&extra).await.unwrap();
        let outcome = repo.try_claim(extra.id, "agent-a", 1).await.unwrap();
        assert!(outcome.is_none(), "agent is already at its cap of 1");
    }

    #[tokio::test]
    async fn list_eligible_excludes_tasks_with_pending_dependency() {
        let repo = setup().await;
        let project_id = Uuid::new_v4();
        let dep = sample(project_id);
        repo.create(&dep).await.unwrap();

        let mut blocked = sample(project_id);
        blocked.dependencies = vec![dep.id];
        repo.create(&blocked).await.unwrap();

        let free = sample(project_id);
        repo.create(&free).await.unwrap();

        let eligible = repo.list_eligible(None, 10).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, free.id);
    }

    #[tokio::test]
    async fn full_lifecycle_transitions_succeed_in_order() {
        let repo = setup().await;
        let task = sample(Uuid::new_v4());
        repo.create(&task).await.unwrap();

        let claimed = repo.try_claim(task.id, "agent-a", 3).await.unwrap().unwrap();
        assert_eq!(claimed.status, TaskStatus::Assigned);

        let started = repo.try_start(task.id, "agent-a").await.unwrap().unwrap();
        assert_eq!(started.status, TaskStatus::Running);

        let submitted = repo
            .try_submit(task.id, "agent-a", serde_json::json!({"ok": true}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(submitted.status, TaskStatus::Reviewing);

        let reviewed = repo.try_review(task.id, "reviewer-a", true, None).await.unwrap().unwrap();
        assert_eq!(reviewed.status, TaskStatus::Completed);
        assert!(reviewed.completed_at.is_some());
    }

    #[tokio::test]
    async fn reject_then_retry_preserves_feedback_and_resets_status() {
        let repo = setup().await;
        let task = sample(Uuid::new_v4());
        repo.create(&task).await.unwrap();
        repo.try_claim(task.id, "agent-a", 3).await.unwrap().unwrap();
        repo.try_start(task.id, "agent-a").await.unwrap().unwrap();
        repo.try_submit(task.id, "agent-a", serde_json::json!({})).await.unwrap().unwrap();

        let rejected = repo
            .try_review(task.id, "reviewer-a", false, Some("needs work".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rejected.status, TaskStatus::Rejected);
        assert_eq!(rejected.feedback.as_deref(), Some("needs work"));

        let retried = repo.try_retry(task.id).await.unwrap().unwrap();
        assert_eq!(retried.status, TaskStatus::Pending);
        assert!(retried.assignee.is_none());
    }

    #[tokio::test]
    async fn reclaim_stuck_exhausts_retries_into_failed() {
        let repo = setup().await;
        let mut task = sample(Uuid::new_v4());
        task.max_retries = 1;
        repo.create(&task).await.unwrap();
        repo.try_claim(task.id, "agent-a", 3).await.unwrap().unwrap();
        repo.try_start(task.id, "agent-a").await.unwrap().unwrap();

        let first = repo.try_reclaim_stuck(task.id).await.unwrap().unwrap();
        assert_eq!(first.status, TaskStatus::Pending);
        assert_eq!(first.retry_count, 1);

        repo.try_claim(task.id, "agent-b", 3).await.unwrap().unwrap();
        repo.try_start(task.id, "agent-b").await.unwrap().unwrap();
        let second = repo.try_reclaim_stuck(task.id).await.unwrap().unwrap();
        assert_eq!(second.status, TaskStatus::Failed, "retries exhausted, task must fail");
    }
}
