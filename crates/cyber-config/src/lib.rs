//! # Cyber Config
//!
//! Typed configuration for cyber applications.
//!
//! [`AppConfig`] has three sections:
//!
//! - `server`: port, host, read/write/shutdown timeouts
//! - `executor`: base timeout, attempt ceiling and timeout cap of the
//!   bounded executor
//! - `logging`: filter level and output format
//!
//! Unknown fields are rejected, so a typo in a config file is an error
//! rather than a silently ignored setting.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = "8080"
//! shutdown_timeout_secs = 30
//!
//! [executor]
//! base_timeout_ms = 10000
//! max_attempts = 3
//! max_timeout_ms = 60000
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

#![doc(html_root_url = "https://docs.rs/cyber-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::AppConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{ExecutorConfig, LogFormat, LoggingConfig, ServerConfig};
