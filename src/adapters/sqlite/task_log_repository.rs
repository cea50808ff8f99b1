//! SQLite implementation of `TaskLogRepository` — the append-only audit trail.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::CoreResult;
use crate::domain::models::{TaskLogEntry, TaskStatus};
use crate::domain::ports::TaskLogRepository;

#[derive(Clone)]
pub struct SqliteTaskLogRepository {
    pool: SqlitePool,
}

impl SqliteTaskLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskLogRepository for SqliteTaskLogRepository {
    async fn append(&self, entry: &TaskLogEntry) -> CoreResult<()> {
        sqlx::query(
            r#"INSERT INTO task_logs (id, task_id, action, old_status, new_status, actor, message, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.task_id.to_string())
        .bind(&entry.action)
        .bind(entry.old_status.map(TaskStatus::as_str))
        .bind(entry.new_status.map(TaskStatus::as_str))
        .bind(&entry.actor)
        .bind(&entry.message)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> CoreResult<Vec<TaskLogEntry>> {
        let rows: Vec<TaskLogRow> = sqlx::query_as("SELECT * FROM task_logs WHERE task_id = ? ORDER BY created_at ASC")
            .bind(task_id.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct TaskLogRow {
    id: String,
    task_id: String,
    action: String,
    old_status: Option<String>,
    new_status: Option<String>,
    actor: Option<String>,
    message: Option<String>,
    created_at: String,
}

impl TryFrom<TaskLogRow> for TaskLogEntry {
    type Error = crate::domain::errors::CoreError;

    fn try_from(row: TaskLogRow) -> Result<Self, Self::Error> {
        Ok(TaskLogEntry {
            id: super::parse_uuid(&row.id)?,
            task_id: super::parse_uuid(&row.task_id)?,
            action: row.action,
            old_status: row.old_status.as_deref().and_then(TaskStatus::from_str),
            new_status: row.new_status.as_deref().and_then(TaskStatus::from_str),
            actor: row.actor,
            message: row.message,
            created_at: super::parse_datetime(&row.created_at)?,
        })
    }
}
