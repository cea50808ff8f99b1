//! SQLite implementation of `TaskTypeDefaultsRepository`.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::CoreResult;
use crate::domain::models::{Priority, TaskType, TaskTypeDefaults};
use crate::domain::ports::TaskTypeDefaultsRepository;

#[derive(Clone)]
pub struct SqliteTaskTypeDefaultsRepository {
    pool: SqlitePool,
}

impl SqliteTaskTypeDefaultsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Seeds the built-in defaults, leaving any row a previous run (or an
    /// operator edit) already wrote untouched.
    pub async fn seed_builtin(&self) -> CoreResult<()> {
        for defaults in TaskTypeDefaults::builtin() {
            sqlx::query(
                r#"INSERT OR IGNORE INTO task_type_defaults (task_type, timeout_minutes, max_retries, priority)
                   VALUES (?, ?, ?, ?)"#,
            )
            .bind(defaults.task_type.as_str())
            .bind(i64::from(defaults.timeout_minutes))
            .bind(i64::from(defaults.max_retries))
            .bind(i64::from(defaults.priority.get()))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskTypeDefaultsRepository for SqliteTaskTypeDefaultsRepository {
    async fn get(&self, task_type: TaskType) -> CoreResult<Option<TaskTypeDefaults>> {
        let row: Option<Row> = sqlx::query_as("SELECT * FROM task_type_defaults WHERE task_type = ?")
            .bind(task_type.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct Row {
    task_type: String,
    timeout_minutes: i64,
    max_retries: i64,
    priority: i64,
}

impl TryFrom<Row> for TaskTypeDefaults {
    type Error = crate::domain::errors::CoreError;

    fn try_from(row: Row) -> Result<Self, Self::Error> {
        Ok(TaskTypeDefaults {
            task_type: TaskType::from_str(&row.task_type)
                .ok_or_else(|| Self::Error::Internal(format!("invalid task type: {}", row.task_type)))?,
            timeout_minutes: row.timeout_minutes as u32,
            max_retries: row.max_retries as u32,
            priority: Priority::new(row.priority as u8),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeded_defaults_are_retrievable_and_idempotent() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        let repo = SqliteTaskTypeDefaultsRepository::new(pool);

        repo.seed_builtin().await.unwrap();
        repo.seed_builtin().await.unwrap();

        let defaults = repo.get(TaskType::Development).await.unwrap().unwrap();
        assert_eq!(defaults.timeout_minutes, 240);
        assert_eq!(defaults.max_retries, 3);
    }
}
