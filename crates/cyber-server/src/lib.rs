//! # Cyber Server
//!
//! Application facade and HTTP transport for cyber.
//!
//! - [`App`] / [`RouteGroup`] - route and middleware registration
//! - [`Dispatcher`] - the immutable route table produced by [`App::build`]
//! - [`ShutdownSignal`] / [`ConnectionTracker`] - graceful shutdown
//!
//! ## Request flow
//!
//! ```text
//! TCP ──► hyper http1 ──► RequestContext ──► Dispatcher
//!                                               │ match (method, path)
//!                                               ▼
//!                  global ─► groups ─► route ─► bounded executor ─► handler
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use cyber_core::handler_fn;
//! use cyber_server::App;
//! use http::StatusCode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cyber_server::ServerError> {
//!     let mut app = App::default();
//!     app.init_logging()?;
//!     app.get("/hello/:name", handler_fn(|ctx| async move {
//!         let name = ctx.param("name").unwrap_or_default();
//!         ctx.string(StatusCode::OK, format!("hello {name}"));
//!     }));
//!     app.run().await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/cyber-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod app;
mod dispatcher;
mod error;
mod server;
mod shutdown;

pub use app::{App, RouteGroup};
pub use dispatcher::{Dispatcher, X_REQUEST_ID};
pub use error::{ServerError, ServerResult};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
