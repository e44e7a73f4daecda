//! Route registration errors.

use thiserror::Error;

/// Errors raised when a route pattern cannot be registered.
///
/// Matching never fails with an error; a miss is reported as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// A `*` segment appeared before the last position.
    #[error("wildcard must be the last segment in '{pattern}'")]
    WildcardNotLast {
        /// The offending pattern.
        pattern: String,
    },

    /// A parameter marker with no name (`/users/:`).
    #[error("empty parameter name in '{pattern}'")]
    EmptyParamName {
        /// The offending pattern.
        pattern: String,
    },

    /// A parameter named `*`, which is the wildcard's capture key.
    #[error("parameter name '*' is reserved for the wildcard in '{pattern}'")]
    ReservedParamName {
        /// The offending pattern.
        pattern: String,
    },

    /// The same parameter name appears twice in one pattern.
    #[error("parameter '{name}' declared twice in '{pattern}'")]
    DuplicateParam {
        /// The offending pattern.
        pattern: String,
        /// The repeated name.
        name: String,
    },
}
