//! SQLite implementation of `IdempotencyRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::CoreResult;
use crate::domain::models::IdempotencyRecord;
use crate::domain::ports::IdempotencyRepository;

#[derive(Clone)]
pub struct SqliteIdempotencyRepository {
    pool: SqlitePool,
}

impl SqliteIdempotencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for SqliteIdempotencyRepository {
    async fn get(&self, key: &str) -> CoreResult<Option<IdempotencyRecord>> {
        let row: Option<IdempotencyRow> = sqlx::query_as("SELECT * FROM idempotency_keys WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn insert(&self, record: &IdempotencyRecord) -> CoreResult<()> {
        let response_json = serde_json::to_string(&record.response)?;
        sqlx::query(
            r#"INSERT OR IGNORE INTO idempotency_keys (key, response, created_at) VALUES (?, ?, ?)"#,
        )
        .bind(&record.key)
        .bind(&response_json)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_expired_batch(&self, cutoff: DateTime<Utc>, batch_size: i64) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"DELETE FROM idempotency_keys WHERE key IN (
                SELECT key FROM idempotency_keys WHERE created_at < ? LIMIT ?
            )"#,
        )
        .bind(cutoff.to_rfc3339())
        .bind(batch_size)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    key: String,
    response: String,
    created_at: String,
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = crate::domain::errors::CoreError;

    fn try_from(row: IdempotencyRow) -> Result<Self, Self::Error> {
        Ok(IdempotencyRecord {
            key: row.key,
            response: serde_json::from_str(&row.response)?,
            created_at: super::parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_idempotent_and_lookup_never_purges() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        let repo = SqliteIdempotencyRepository::new(pool);

        let record = IdempotencyRecord::new("req-1".to_string(), serde_json::json!({"status": "ok"}));
        repo.insert(&record).await.unwrap();
        repo.insert(&record).await.unwrap();

        let fetched = repo.get("req-1").await.unwrap().unwrap();
        assert_eq!(fetched.response, serde_json::json!({"status": "ok"}));

        // An old record is still visible to a lookup; only the GC sweep purges it.
        let old = repo.get("req-1").await.unwrap();
        assert!(old.is_some());
    }

    #[tokio::test]
    async fn gc_deletes_only_expired_batch() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        let repo = SqliteIdempotencyRepository::new(pool);

        let mut old = IdempotencyRecord::new("old".to_string(), serde_json::json!(1));
        old.created_at = Utc::now() - chrono::Duration::hours(48);
        repo.insert(&old).await.unwrap();
        repo.insert(&IdempotencyRecord::new("fresh".to_string(), serde_json::json!(2)))
            .await
            .unwrap();

        let deleted = repo.delete_expired_batch(Utc::now() - chrono::Duration::hours(24), 500).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.get("fresh").await.unwrap().is_some());
        assert!(repo.get("old").await.unwrap().is_none());
    }
}
