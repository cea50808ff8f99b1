//! Configuration: every item enumerated in the system design's "Configuration"
//! section, as typed, `Default`-implementing sub-structs, loaded via
//! `figment` layering (defaults -> file -> env).

mod loader;

pub use loader::{ConfigError, ConfigLoader};

use serde::{Deserialize, Serialize};

/// Top-level settings for the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Settings {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub control_loops: ControlLoopConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            control_loops: ControlLoopConfig::default(),
            idempotency: IdempotencyConfig::default(),
            rate_limit: RateLimitConfig::default(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Dispatcher and lifecycle concurrency knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DispatcherConfig {
    #[serde(default = "default_max_concurrent_tasks_per_agent")]
    pub max_concurrent_tasks_per_agent: u32,
    #[serde(default = "default_task_timeout_minutes")]
    pub default_task_timeout_minutes: u32,
}

const fn default_max_concurrent_tasks_per_agent() -> u32 {
    3
}

const fn default_task_timeout_minutes() -> u32 {
    120
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks_per_agent: default_max_concurrent_tasks_per_agent(),
            default_task_timeout_minutes: default_task_timeout_minutes(),
        }
    }
}

/// Background sweep intervals and thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControlLoopConfig {
    #[serde(default = "default_heartbeat_offline_threshold_secs")]
    pub heartbeat_offline_threshold_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub heartbeat_sweep_interval_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub stuck_sweep_interval_secs: u64,
    #[serde(default = "default_gc_interval_secs")]
    pub idempotency_gc_interval_secs: u64,
}

const fn default_heartbeat_offline_threshold_secs() -> u64 {
    300
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

const fn default_gc_interval_secs() -> u64 {
    3600
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            heartbeat_offline_threshold_secs: default_heartbeat_offline_threshold_secs(),
            heartbeat_sweep_interval_secs: default_sweep_interval_secs(),
            stuck_sweep_interval_secs: default_sweep_interval_secs(),
            idempotency_gc_interval_secs: default_gc_interval_secs(),
        }
    }
}

/// Idempotency key retention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IdempotencyConfig {
    #[serde(default = "default_idempotency_ttl_secs")]
    pub ttl_secs: i64,
    #[serde(default = "default_gc_batch_size")]
    pub gc_batch_size: i64,
}

const fn default_idempotency_ttl_secs() -> i64 {
    24 * 3600
}

const fn default_gc_batch_size() -> i64 {
    500
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_idempotency_ttl_secs(),
            gc_batch_size: default_gc_batch_size(),
        }
    }
}

/// Fixed-window rate limiting knobs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_rate_limit_max")]
    pub max_requests: u32,
    #[serde(default = "default_rate_limit_max_store_size")]
    pub max_store_size: usize,
}

const fn default_rate_limit_window_secs() -> u64 {
    60
}

const fn default_rate_limit_max() -> u32 {
    100
}

const fn default_rate_limit_max_store_size() -> usize {
    100_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_rate_limit_window_secs(),
            max_requests: default_rate_limit_max(),
            max_store_size: default_rate_limit_max_store_size(),
        }
    }
}

/// Database pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
    #[serde(default = "default_pool_min")]
    pub pool_min: u32,
    #[serde(default = "default_pool_max")]
    pub pool_max: u32,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_reset_cooldown_secs")]
    pub reset_cooldown_secs: u64,
    #[serde(default = "default_retry_max_elapsed_secs")]
    pub retry_max_elapsed_secs: u64,
}

fn default_database_path() -> String {
    ".fleetwork/fleetwork.db".to_string()
}

const fn default_pool_min() -> u32 {
    1
}

const fn default_pool_max() -> u32 {
    10
}

const fn default_command_timeout_secs() -> u64 {
    5
}

const fn default_reset_cooldown_secs() -> u64 {
    30
}

/// Bound on how long `core::Core` retries a `Transient` store error before
/// giving up and surfacing it to the caller.
const fn default_retry_max_elapsed_secs() -> u64 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            pool_min: default_pool_min(),
            pool_max: default_pool_max(),
            command_timeout_secs: default_command_timeout_secs(),
            reset_cooldown_secs: default_reset_cooldown_secs(),
            retry_max_elapsed_secs: default_retry_max_elapsed_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Transport-layer concern; carried here only so a collaborator can read
    /// it from the same config surface. The core never consults it.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            cors_origins: Vec::new(),
        }
    }
}
