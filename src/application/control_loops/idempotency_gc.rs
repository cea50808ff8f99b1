//! Purges idempotency records older than the configured TTL, in bounded
//! batches so the sweep never holds a long-running lock on the table.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::domain::ports::IdempotencyRepository;

pub struct IdempotencyGc {
    repo: Arc<dyn IdempotencyRepository>,
    interval: Duration,
    ttl: chrono::Duration,
    batch_size: i64,
}

impl IdempotencyGc {
    pub fn new(repo: Arc<dyn IdempotencyRepository>, interval_secs: u64, ttl_secs: i64, batch_size: i64) -> Self {
        Self {
            repo,
            interval: Duration::from_secs(interval_secs),
            ttl: chrono::Duration::seconds(ttl_secs),
            batch_size,
        }
    }

    pub async fn run_once(&self) -> crate::domain::errors::CoreResult<u64> {
        let cutoff = chrono::Utc::now() - self.ttl;
        let deleted = self.repo.delete_expired_batch(cutoff, self.batch_size).await?;
        if deleted > 0 {
            tracing::info!(deleted, "idempotency gc swept expired keys");
        }
        Ok(deleted)
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("idempotency gc stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::error!(error = %err, "idempotency gc iteration failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteIdempotencyRepository;
    use crate::domain::models::IdempotencyRecord;

    #[tokio::test]
    async fn gc_sweeps_only_records_past_ttl() {
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        let repo: Arc<dyn IdempotencyRepository> = Arc::new(SqliteIdempotencyRepository::new(pool));

        let mut stale = IdempotencyRecord::new("stale".to_string(), serde_json::json!(1));
        stale.created_at = chrono::Utc::now() - chrono::Duration::hours(30);
        repo.insert(&stale).await.unwrap();
        repo.insert(&IdempotencyRecord::new("fresh".to_string(), serde_json::json!(2))).await.unwrap();

        let gc = IdempotencyGc::new(repo.clone(), 3600, 24 * 3600, 500);
        let deleted = gc.run_once().await.unwrap();
        assert_eq!(deleted, 1);
        assert!(repo.get("fresh").await.unwrap().is_some());
    }
}
