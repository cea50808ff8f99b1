//! Structured logging setup.
//!
//! One entry point, configured from [`crate::config::LoggingConfig`]. Every
//! lifecycle transition, dispatcher claim, and control-loop sweep logs
//! through `tracing`; this module only wires the subscriber.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber. Safe to call once per process;
/// a second call is a no-op (the underlying `try_init` error is swallowed
/// since tests commonly call this from many independent test functions).
pub fn init(config: &LoggingConfig) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(parse_level(&config.level).into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };

    if let Err(err) = result {
        tracing::debug!(%err, "tracing subscriber already initialized");
    }
}

fn parse_level(level: &str) -> tracing::Level {
    level.parse().unwrap_or(tracing::Level::INFO)
}
