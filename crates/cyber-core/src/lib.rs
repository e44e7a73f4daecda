//! # Cyber Core
//!
//! Core types for the cyber request-dispatch framework.
//!
//! - [`RequestContext`] - per-request state: params, key/value store,
//!   cancellation token and the write-once response slot
//! - [`RequestId`] - UUID v7 request identifier
//! - [`CancellationToken`] - hierarchical cancellation with deadlines
//! - [`Handler`] / [`Middleware`] - the handler and decorator function types
//! - [`ErrorBody`] - the `{code, message}` error envelope
//! - [`validation`] - declarative request body validation

#![doc(html_root_url = "https://docs.rs/cyber-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod cancel;
mod context;
mod error;
mod handler;
pub mod validation;

pub use cancel::CancellationToken;
pub use context::{RequestContext, RequestId, UNMATCHED_ROUTE};
pub use error::{codes, BindError, ContextError, ErrorBody};
pub use handler::{handler_fn, middleware_fn, BoxFuture, Ctx, Handler, Middleware};
pub use validation::{Rule, Schema, ValidationErrors};

pub use cyber_router::Params;
