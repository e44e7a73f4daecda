//! # Cyber
//!
//! A request-dispatch web framework:
//!
//! - a per-method segment trie router with `:param` and trailing `*`
//!   segments, matched static > parameter > wildcard with backtracking
//! - three-tier middleware (global, group, route) composed once per route
//!   when the application is built
//! - a bounded executor that runs each handler attempt under a deadline,
//!   retries with doubled timeouts, isolates panics and answers `504` when
//!   the attempts run out
//! - a request context with a write-once response
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use cyber::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServerError> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("cyber.toml")?
//!         .with_env_prefix("CYBER")
//!         .load()?;
//!
//!     let mut app = App::new(config);
//!     app.init_logging()?;
//!     app.use_global([stages::recovery(), stages::logger(), stages::cors()]);
//!
//!     let mut api = app.group("/api");
//!     api.get("/users/:id", handler_fn(|ctx| async move {
//!         let id = ctx.param("id").unwrap_or_default();
//!         ctx.success(&serde_json::json!({ "id": id }));
//!     }));
//!
//!     app.run().await
//! }
//! ```
//!
//! ## Request flow
//!
//! ```text
//! Request → Router → global → groups → route → BoundedExecutor → Handler
//!                                                                   ↓
//! Response ←──────────── write-once RequestContext ←────────────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/cyber/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Re-export core types
pub use cyber_core as core;

// Re-export the router
pub use cyber_router as router;

// Re-export middleware and the built-in stages
pub use cyber_middleware as middleware;

// Re-export logging and metrics
pub use cyber_telemetry as telemetry;

// Re-export configuration
pub use cyber_config as config;

// Re-export the application and server
pub use cyber_server as server;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use cyber::prelude::*;
///
/// let mut app = App::default();
/// app.get("/", handler_fn(|ctx| async move {
///     ctx.string(StatusCode::OK, "hi");
/// }));
/// assert_eq!(app.build().unwrap().route_count(), 1);
/// ```
pub mod prelude {
    pub use cyber_core::{
        codes, handler_fn, middleware_fn, BindError, CancellationToken, Ctx, ErrorBody, Handler,
        Middleware, RequestContext, RequestId, Rule, Schema,
    };

    pub use cyber_middleware::{stages, MiddlewareChain, MiddlewareRegistry};

    pub use cyber_config::{AppConfig, ConfigLoader};

    pub use cyber_server::{App, Dispatcher, RouteGroup, ServerError, ShutdownSignal};

    pub use http::{Method, StatusCode};
}
