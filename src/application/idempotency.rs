//! Idempotency Guard: at-most-once semantics for mutating operations.
//!
//! Lookup never purges expired rows (that's the GC sweep's job, see
//! `control_loops::idempotency_gc`), so a key can't be evicted out from
//! under an in-flight replay. A key past its TTL is treated as fresh for
//! replay purposes until the sweep removes it — the retention window is a
//! storage bound, not a correctness boundary.

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;

use crate::domain::errors::CoreResult;
use crate::domain::models::IdempotencyRecord;
use crate::domain::ports::IdempotencyRepository;

pub struct IdempotencyGuard {
    repo: Arc<dyn IdempotencyRepository>,
    ttl: Duration,
}

impl IdempotencyGuard {
    pub fn new(repo: Arc<dyn IdempotencyRepository>, ttl_secs: i64) -> Self {
        Self {
            repo,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    /// Executes `op` unless `key` already has a recorded response, in which
    /// case the recorded response is deserialized and returned without
    /// re-running `op`.
    pub async fn guard<T, F, Fut>(&self, key: &str, op: F) -> CoreResult<T>
    where
        T: serde::Serialize + serde::de::DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        if let Some(existing) = self.repo.get(key).await? {
            tracing::debug!(key, "idempotency key already recorded, replaying");
            return Ok(serde_json::from_value(existing.response)?);
        }

        let result = op().await?;
        let response = serde_json::to_value(&result)?;
        self.repo.insert(&IdempotencyRecord::new(key.to_string(), response)).await?;
        Ok(result)
    }

    #[allow(dead_code)]
    const fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteIdempotencyRepository;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn second_call_with_same_key_replays_without_reexecuting() {
        let pool = sqlx::SqlitePool::connect(":memory:").await.unwrap();
        crate::adapters::sqlite::migrations::run(&pool).await.unwrap();
        let repo: Arc<dyn IdempotencyRepository> = Arc::new(SqliteIdempotencyRepository::new(pool));
        let guard = IdempotencyGuard::new(repo, 86_400);

        let calls = Arc::new(AtomicU32::new(0));
        for _ in 0..3 {
            let calls = calls.clone();
            let result: u32 = guard
                .guard("submit-1", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(42)
                })
                .await
                .unwrap();
            assert_eq!(result, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "op must run exactly once for a repeated key");
    }
}
