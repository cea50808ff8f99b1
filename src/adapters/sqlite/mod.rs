//! SQLite implementations of the `domain::ports` traits.

pub mod agent_repository;
pub mod connection;
pub mod idempotency_repository;
pub mod migrations;
pub mod project_repository;
pub mod task_log_repository;
pub mod task_repository;
pub mod task_type_defaults_repository;

pub use agent_repository::SqliteAgentRepository;
pub use connection::{ConnectionError, Store};
pub use idempotency_repository::SqliteIdempotencyRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use project_repository::SqliteProjectRepository;
pub use task_log_repository::SqliteTaskLogRepository;
pub use task_repository::SqliteTaskRepository;
pub use task_type_defaults_repository::SqliteTaskTypeDefaultsRepository;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::CoreError;

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(s).map_err(|e| CoreError::Internal(format!("invalid uuid {s}: {e}")))
}

/// Parse an optional UUID string from a SQLite row field.
pub fn parse_optional_uuid(s: Option<String>) -> Result<Option<Uuid>, CoreError> {
    s.map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| CoreError::Internal(format!("invalid uuid: {e}")))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CoreError> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CoreError::Internal(format!("invalid timestamp {s}: {e}")))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CoreError> {
    s.map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| CoreError::Internal(format!("invalid timestamp: {e}")))
}

/// Parse a JSON-array string from a SQLite row field, defaulting to empty.
pub fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(s: Option<String>) -> Result<T, CoreError> {
    match s {
        Some(s) if !s.is_empty() => Ok(serde_json::from_str(&s)?),
        _ => Ok(T::default()),
    }
}
