//! Error types and the JSON error envelope.
//!
//! Every framework-generated error response uses the flat [`ErrorBody`]
//! shape:
//!
//! ```json
//! {"code": "TIMEOUT", "message": "Request timed out after maximum retries"}
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::ValidationErrors;

/// Machine-readable error codes written by the framework.
pub mod codes {
    /// No route matched (404).
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// A handler panicked (500).
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    /// Every attempt of the bounded executor expired (504).
    pub const TIMEOUT: &str = "TIMEOUT";
    /// The caller's token bucket was empty (429).
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    /// Missing or invalid credentials (401).
    pub const UNAUTHORIZED: &str = "UNAUTHORIZED";
    /// The request body failed schema validation (400).
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    /// The request body could not be read or parsed (400).
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
}

/// The JSON error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code, e.g. `TIMEOUT`.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl ErrorBody {
    /// Creates an error body.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Errors from the typed accessors of the request store.
///
/// These are ordinary return values; nothing in the framework panics on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// No value is stored under the key.
    #[error("key not found: {key}")]
    KeyNotFound {
        /// The requested key.
        key: String,
    },

    /// A value exists but is not of the requested type.
    #[error("value for '{key}' is not a {expected}")]
    TypeMismatch {
        /// The requested key.
        key: String,
        /// Name of the requested type.
        expected: &'static str,
    },
}

impl ContextError {
    pub(crate) fn not_found(key: &str) -> Self {
        Self::KeyNotFound {
            key: key.to_string(),
        }
    }

    pub(crate) fn mismatch(key: &str, expected: &'static str) -> Self {
        Self::TypeMismatch {
            key: key.to_string(),
            expected,
        }
    }
}

/// Errors from binding a request body.
#[derive(Debug, Error)]
pub enum BindError {
    /// The body is not valid JSON for the target type.
    #[error("invalid request body: {0}")]
    Json(#[from] serde_json::Error),

    /// The query string does not match the target type.
    #[error("invalid query string: {0}")]
    Query(#[from] serde_urlencoded::de::Error),

    /// The body parsed but failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

impl BindError {
    /// Converts the error into the envelope a handler would usually send.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        match self {
            Self::Json(_) | Self::Query(_) => ErrorBody::new(codes::BAD_REQUEST, self.to_string()),
            Self::Validation(e) => ErrorBody::new(codes::VALIDATION_ERROR, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_serializes_flat() {
        let body = ErrorBody::new(codes::TIMEOUT, "late");
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({"code": "TIMEOUT", "message": "late"}));
    }

    #[test]
    fn test_context_error_display() {
        assert_eq!(ContextError::not_found("user").to_string(), "key not found: user");
        assert_eq!(
            ContextError::mismatch("age", "i64").to_string(),
            "value for 'age' is not a i64"
        );
    }

    #[test]
    fn test_bind_error_envelope() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let body = BindError::from(err).to_body();
        assert_eq!(body.code, codes::BAD_REQUEST);
    }
}
