//! Server error type.

use cyber_config::ConfigError;
use cyber_router::RouteError;
use cyber_telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised while building or running an application.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An I/O error on an established listener.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A route pattern was rejected by the router.
    #[error("invalid route {method} {pattern}: {source}")]
    Route {
        /// Method of the rejected route.
        method: String,
        /// Pattern as registered.
        pattern: String,
        /// Router error.
        #[source]
        source: RouteError,
    },

    /// The application configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging could not be initialised.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
