//! Idempotency record — the at-most-once memo for a mutating call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A recorded response for a client-supplied idempotency key.
///
/// Retention is 24h, enforced only by the background GC sweep
/// (`application::control_loops::idempotency_gc`) — the lookup path never
/// purges, so a key can't be evicted out from under an in-flight replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    /// The serialized response recorded the first time this key was seen.
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(key: String, response: serde_json::Value) -> Self {
        Self {
            key,
            response,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at > ttl
    }
}
