//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Why a configuration could not be loaded or accepted.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required file does not exist.
    #[error("config file {path} does not exist")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// A file exists but could not be read.
    #[error("cannot read config file {path}")]
    Read {
        /// The unreadable path.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, or TOML with unknown fields.
    #[error("bad TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Malformed JSON, or JSON with unknown fields.
    #[error("bad JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A `.env` file exists but could not be parsed.
    #[error("bad .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),

    /// A value parsed but is out of range, e.g. a zero attempt count.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `server.port`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// An environment override could not be converted.
    #[error("environment override {var}: {reason}")]
    Env {
        /// Variable name.
        var: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The file extension or format name is neither `toml` nor `json`.
    #[error("unsupported config format '{0}', expected toml or json")]
    UnsupportedFormat(String),
}

impl ConfigError {
    pub(crate) fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    pub(crate) fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Builds an [`InvalidValue`](Self::InvalidValue) error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn env(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            reason: reason.into(),
        }
    }
}
