//! Hierarchical configuration loading: defaults -> optional YAML file ->
//! environment variables.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use super::Settings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid max_concurrent_tasks_per_agent: {0}, must be at least 1")]
    InvalidConcurrencyCap(u32),

    #[error("invalid rate_limit.max_requests: {0}, must be at least 1")]
    InvalidRateLimitMax(u32),

    #[error("invalid log level: {0}, must be one of trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("database path cannot be empty")]
    EmptyDatabasePath,

    #[error("failed to extract configuration: {0}")]
    Extract(#[from] figment::Error),
}

/// Loads and validates [`Settings`].
pub struct ConfigLoader;

impl ConfigLoader {
    /// Precedence (lowest to highest): programmatic defaults, `config.yaml`
    /// in the given directory, `FLEETWORK_`-prefixed environment variables.
    pub fn load(config_dir: impl AsRef<std::path::Path>) -> Result<Settings, ConfigError> {
        let path = config_dir.as_ref().join("config.yaml");
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("FLEETWORK_").split("__"))
            .extract()?;

        Self::validate(&settings)?;
        Ok(settings)
    }

    pub fn validate(settings: &Settings) -> Result<(), ConfigError> {
        if settings.dispatcher.max_concurrent_tasks_per_agent == 0 {
            return Err(ConfigError::InvalidConcurrencyCap(
                settings.dispatcher.max_concurrent_tasks_per_agent,
            ));
        }
        if settings.rate_limit.max_requests == 0 {
            return Err(ConfigError::InvalidRateLimitMax(settings.rate_limit.max_requests));
        }
        if settings.database.path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&settings.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(settings.logging.level.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        assert!(ConfigLoader::validate(&Settings::default()).is_ok());
    }

    #[test]
    fn zero_concurrency_cap_is_rejected() {
        let mut settings = Settings::default();
        settings.dispatcher.max_concurrent_tasks_per_agent = 0;
        assert!(matches!(
            ConfigLoader::validate(&settings),
            Err(ConfigError::InvalidConcurrencyCap(0))
        ));
    }

    #[test]
    fn env_override_takes_precedence_over_defaults() {
        temp_env::with_var("FLEETWORK_DATABASE__POOL_MAX", Some("42"), || {
            let dir = tempfile::tempdir().unwrap();
            let settings = ConfigLoader::load(dir.path()).unwrap();
            assert_eq!(settings.database.pool_max, 42);
        });
    }
}
