//! The root [`AppConfig`] type.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, ExecutorConfig, LogFormat, LoggingConfig, ServerConfig};

/// Complete application configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to layer files and environment
/// variables over the defaults.
///
/// # Example
///
/// ```
/// use cyber_config::AppConfig;
///
/// let config = AppConfig::default();
/// assert_eq!(config.server.port, "8080");
/// assert_eq!(config.executor.max_attempts, 3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Bounded executor settings.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for an empty or non-numeric port,
    /// zero attempts, a zero base timeout, a cap below the base timeout, or a
    /// nonzero write timeout that would cut the executor's retries short.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port.is_empty() {
            return Err(ConfigError::invalid_value("server.port", "must not be empty"));
        }
        if self.server.port.parse::<u16>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.port",
                format!("not a valid port: {}", self.server.port),
            ));
        }

        if self.executor.max_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "executor.max_attempts",
                "must be at least 1",
            ));
        }
        if self.executor.base_timeout_ms == 0 {
            return Err(ConfigError::invalid_value(
                "executor.base_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.executor.max_timeout_ms < self.executor.base_timeout_ms {
            return Err(ConfigError::invalid_value(
                "executor.max_timeout_ms",
                "must not be smaller than executor.base_timeout_ms",
            ));
        }

        let worst_case = self.executor.worst_case();
        if self.executor.enabled
            && self.server.write_timeout_secs > 0
            && self.server.write_timeout() < worst_case
        {
            return Err(ConfigError::invalid_value(
                "server.write_timeout_secs",
                format!(
                    "{}s is shorter than the executor's worst case of {}ms",
                    self.server.write_timeout_secs,
                    worst_case.as_millis()
                ),
            ));
        }

        Ok(())
    }

    /// Debug logging in human-readable form.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config
    }

    /// Info logging as JSON.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();
        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(AppConfig::development().logging.format, LogFormat::Pretty);
        assert_eq!(AppConfig::development().logging.level, "debug");
        assert_eq!(AppConfig::production().logging.format, LogFormat::Json);
    }

    #[test]
    fn test_rejects_bad_port() {
        let mut config = AppConfig::default();
        config.server.port = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "server.port"
        ));

        config.server.port = "http".to_string();
        assert!(config.validate().is_err());

        config.server.port = "70000".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_executor() {
        let mut config = AppConfig::default();
        config.executor.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.executor.base_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.executor.max_timeout_ms = 5_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_timeout_must_cover_retries() {
        let mut config = AppConfig::default();
        config.server.write_timeout_secs = 60;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "server.write_timeout_secs"
        ));

        config.server.write_timeout_secs = 70;
        assert!(config.validate().is_ok());

        config.server.write_timeout_secs = 0;
        assert!(config.validate().is_ok());

        config.server.write_timeout_secs = 5;
        config.executor.enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [executor]
            max_attempts = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.executor.max_attempts, 5);
        assert_eq!(config.executor.base_timeout_ms, 10_000);
        assert_eq!(config.server.port, "8080");
    }
}
