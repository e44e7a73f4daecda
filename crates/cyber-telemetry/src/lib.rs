//! Logging and request metrics for the cyber framework.
//!
//! - [`logging`]: installs the global `tracing` subscriber (JSON or pretty)
//! - [`metrics`]: the in-process [`RequestMetrics`] collector, mirrored to
//!   the `metrics` facade
//!
//! # Example
//!
//! ```rust,ignore
//! use cyber_telemetry::{init_logging, LogConfig, RequestMetrics};
//!
//! init_logging(&LogConfig::production())?;
//!
//! let metrics = RequestMetrics::global();
//! let guard = metrics.start("/users", "GET");
//! guard.finish(200);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use metrics::{InFlight, MetricsSummary, RequestMetrics};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
