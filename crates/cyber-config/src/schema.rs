//! Configuration section types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// HTTP server section.
///
/// # Example
///
/// ```
/// use cyber_config::ServerConfig;
///
/// let config = ServerConfig {
///     port: "3000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.bind_addr(), "0.0.0.0:3000");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Listening port. Kept as a string so `"0"` and env values pass through
    /// untouched; validated as a `u16`.
    #[serde(default = "default_port")]
    pub port: String,

    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Time allowed to read request headers, in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Time allowed to produce a response, in seconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,

    /// Time allowed for in-flight connections to drain on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Header read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Response write timeout.
    #[must_use]
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Graceful shutdown drain timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_port() -> String {
    "8080".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_read_timeout() -> u64 {
    60
}

fn default_write_timeout() -> u64 {
    90
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Bounded executor section: per-attempt timeout with retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Whether routes are wrapped with the bounded executor.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Timeout of the first attempt, in milliseconds.
    #[serde(default = "default_base_timeout")]
    pub base_timeout_ms: u64,

    /// Number of attempts before answering 504.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound for the doubled per-attempt timeout, in milliseconds.
    #[serde(default = "default_max_timeout")]
    pub max_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_timeout_ms: default_base_timeout(),
            max_attempts: default_max_attempts(),
            max_timeout_ms: default_max_timeout(),
        }
    }
}

impl ExecutorConfig {
    /// Timeout of the first attempt.
    #[must_use]
    pub const fn base_timeout(&self) -> Duration {
        Duration::from_millis(self.base_timeout_ms)
    }

    /// Cap for the per-attempt timeout.
    #[must_use]
    pub const fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }

    /// Time until the last attempt expires when every attempt hangs.
    ///
    /// ```
    /// use std::time::Duration;
    /// use cyber_config::ExecutorConfig;
    ///
    /// // 10s + 20s + 40s
    /// assert_eq!(ExecutorConfig::default().worst_case(), Duration::from_secs(70));
    /// ```
    #[must_use]
    pub fn worst_case(&self) -> Duration {
        let mut timeout = self.base_timeout();
        let mut total = Duration::ZERO;
        for _ in 0..self.max_attempts {
            total = total.saturating_add(timeout);
            timeout = timeout.saturating_mul(2).min(self.max_timeout());
        }
        total
    }
}

fn default_true() -> bool {
    true
}

fn default_base_timeout() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_max_timeout() -> u64 {
    60_000
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `cyber_server=debug,info`.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Converts the section into the telemetry crate's [`cyber_telemetry::LogConfig`].
    #[must_use]
    pub fn to_log_config(&self) -> cyber_telemetry::LogConfig {
        let mut config = match self.format {
            LogFormat::Json => cyber_telemetry::LogConfig::production(),
            LogFormat::Pretty => cyber_telemetry::LogConfig::development(),
        };
        config.level = self.level.clone();
        config
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
