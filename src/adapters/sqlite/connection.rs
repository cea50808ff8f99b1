//! SQLite connection pool management.
//!
//! `Store` wraps the pool and the "reset at most once per cooldown" logic
//! from the resource model: repeated acquisition failures trip a reset, but
//! never more often than `reset_cooldown_secs`, so a genuinely down disk
//! doesn't turn into a reset storm.

use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::config::DatabaseConfig;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to create pool: {0}")]
    PoolCreationFailed(#[source] sqlx::Error),
    #[error("invalid database path: {0}")]
    InvalidDatabasePath(String),
    #[error("failed to create directory: {0}")]
    DirectoryCreationFailed(#[source] std::io::Error),
}

async fn build_pool(database_url: &str, min: u32, max: u32, acquire_timeout: Duration) -> Result<SqlitePool, ConnectionError> {
    ensure_database_directory(database_url)?;

    let connect_options = SqliteConnectOptions::from_str(database_url)
        .map_err(|_| ConnectionError::InvalidDatabasePath(database_url.to_string()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    SqlitePoolOptions::new()
        .max_connections(max)
        .min_connections(min)
        .acquire_timeout(acquire_timeout)
        .connect_with(connect_options)
        .await
        .map_err(ConnectionError::PoolCreationFailed)
}

fn ensure_database_directory(database_url: &str) -> Result<(), ConnectionError> {
    let path = database_url
        .strip_prefix("sqlite:")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .unwrap_or(database_url);

    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(ConnectionError::DirectoryCreationFailed)?;
        }
    }
    Ok(())
}

/// Owns the pool plus the bounded-reset bookkeeping from the resource model.
pub struct Store {
    pool: SqlitePool,
    database_url: String,
    config: DatabaseConfig,
    last_reset_epoch_secs: AtomicI64,
    consecutive_failures: AtomicI64,
}

impl Store {
    pub async fn connect(config: DatabaseConfig) -> Result<Self, ConnectionError> {
        let database_url = format!("sqlite:{}", config.path);
        let pool = build_pool(
            &database_url,
            config.pool_min,
            config.pool_max,
            Duration::from_secs(config.command_timeout_secs),
        )
        .await?;

        Ok(Self {
            pool,
            database_url,
            config,
            last_reset_epoch_secs: AtomicI64::new(0),
            consecutive_failures: AtomicI64::new(0),
        })
    }

    pub async fn connect_in_memory() -> Result<Self, ConnectionError> {
        let config = DatabaseConfig {
            path: ":memory:".to_string(),
            ..DatabaseConfig::default()
        };
        Self::connect(config).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Wraps an already-open pool with the same reset bookkeeping `connect`
    /// gives a freshly built one, for callers that construct the pool
    /// themselves (in-memory stores, tests).
    pub fn from_existing(pool: SqlitePool, database_url: String, config: DatabaseConfig) -> Self {
        Self {
            pool,
            database_url,
            config,
            last_reset_epoch_secs: AtomicI64::new(0),
            consecutive_failures: AtomicI64::new(0),
        }
    }

    /// Records a Store-level failure observed by a caller and, if the
    /// configured cooldown has elapsed since the last reset, closes and
    /// rebuilds the pool. Returns whether a reset happened.
    pub async fn reset_if_unhealthy(&mut self, now_epoch_secs: i64) -> Result<bool, ConnectionError> {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures < 3 {
            return Ok(false);
        }

        let last_reset = self.last_reset_epoch_secs.load(Ordering::SeqCst);
        if now_epoch_secs - last_reset < self.config.reset_cooldown_secs as i64 {
            return Ok(false);
        }

        self.pool.close().await;
        self.pool = build_pool(
            &self.database_url,
            self.config.pool_min,
            self.config.pool_max,
            Duration::from_secs(self.config.command_timeout_secs),
        )
        .await?;
        self.last_reset_epoch_secs.store(now_epoch_secs, Ordering::SeqCst);
        self.consecutive_failures.store(0, Ordering::SeqCst);
        Ok(true)
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
    }
}
