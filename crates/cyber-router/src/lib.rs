//! Prefix tree router for cyber.
//!
//! Routes are stored in one tree per HTTP method. Each node is one path
//! segment; matching walks the request path segment by segment with
//! backtracking.
//!
//! # Features
//!
//! - **Static segments**: `/users/profile`
//! - **Parameters**: `/users/:id` binds `id`
//! - **Terminal wildcard**: `/files/*` consumes the rest of the path, exposed as `*`
//! - **Precedence**: static > parameter > wildcard, with backtracking
//!
//! # Example
//!
//! ```rust
//! use cyber_router::Router;
//! use http::Method;
//!
//! let mut router = Router::new();
//! router.add_route(Method::GET, "/users/profile", "profile").unwrap();
//! router.add_route(Method::GET, "/users/:id", "user").unwrap();
//! router.add_route(Method::GET, "/files/*", "files").unwrap();
//!
//! let m = router.match_route(&Method::GET, "/users/profile").unwrap();
//! assert_eq!(*m.handler, "profile");
//!
//! let m = router.match_route(&Method::GET, "/files/a/b/c").unwrap();
//! assert_eq!(m.params.get("*"), Some("a/b/c"));
//! ```
//!
//! # Architecture
//!
//! ```text
//!                 GET (root)
//!                     │
//!           ┌─────────┴─────────┐
//!           │                   │
//!        "users"             "files"
//!           │                   │
//!     ┌─────┴─────┐            "*"
//!     │           │          [files]
//! "profile"      ":"
//! [profile]    [user]
//! ```

mod error;
mod node;
mod params;
mod path;
mod router;

pub use error::RouteError;
pub use node::{Node, Route, SegmentKind};
pub use params::Params;
pub use path::{is_segment_prefix, normalize_path, segments, PARAM_MARKER, WILDCARD};
pub use router::Router;

/// A successful match: the handler, the pattern it was registered under, and
/// the captured parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a, H> {
    /// The matched handler.
    pub handler: &'a H,
    /// The normalized pattern that matched.
    pub pattern: &'a str,
    /// Captured parameter values, verbatim from the path.
    pub params: Params,
}
