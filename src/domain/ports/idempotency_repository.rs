//! Idempotency record repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::CoreResult;
use crate::domain::models::IdempotencyRecord;

#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Look up a key. Never purges expired entries as a side effect — see
    /// `application::idempotency` for why that matters.
    async fn get(&self, key: &str) -> CoreResult<Option<IdempotencyRecord>>;

    /// Insert a fresh record. Called in the same transaction as the
    /// operation whose response it memoizes.
    async fn insert(&self, record: &IdempotencyRecord) -> CoreResult<()>;

    /// Delete records older than `cutoff`, in batches of at most `batch_size`
    /// so the GC sweep never holds a long lock. Returns the number deleted.
    async fn delete_expired_batch(&self, cutoff: DateTime<Utc>, batch_size: i64) -> CoreResult<u64>;
}
