//! Core error taxonomy.
//!
//! One variant per code in the error handling design: callers match on the
//! variant, not on the message, to decide whether to retry, back off, or
//! give up. See `application::retry` for how `Transient` is absorbed before
//! it ever reaches a caller of `core::Core`.

use thiserror::Error;
use uuid::Uuid;

/// Core-level error returned by every fallible operation in this crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input malformed or violates a static constraint. Permanent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Dependency cycle, self-reference, or nonexistent dependency. Permanent.
    #[error("dependency invalid: {0}")]
    DependencyInvalid(String),

    /// The transition's precondition was not met (e.g. claiming a non-pending task).
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// The caller is not the current assignee of a holder-only operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The atomic claim found no eligible row. Permanent for this (task, agent) pair right now.
    #[error("claim unavailable for task {task_id}")]
    ClaimUnavailable { task_id: Uuid },

    /// The agent's per-agent concurrency cap was already reached.
    #[error("agent {agent} is at its concurrency cap ({cap})")]
    CapExceeded { agent: String, cap: u32 },

    /// Too many requests from this caller in the current rate-limit window.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Store-level timeout or connection loss. Safe to retry.
    #[error("transient store error: {0}")]
    Transient(String),

    /// Invariant violation or unexpected store error. Logged with full context.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the core's own retry loop should attempt this error again.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Machine-readable code, stable for API consumers.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::DependencyInvalid(_) => "dependency-invalid",
            Self::StateConflict(_) => "state-conflict",
            Self::Forbidden(_) => "forbidden",
            Self::ClaimUnavailable { .. } => "claim-unavailable",
            Self::CapExceeded { .. } => "cap-exceeded",
            Self::RateLimited { .. } => "rate-limited",
            Self::NotFound(_) => "not-found",
            Self::Transient(_) => "transient",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::Transient(err.to_string()),
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("serialization error: {err}"))
    }
}
