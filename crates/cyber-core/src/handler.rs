//! Handler and middleware function types.
//!
//! A [`Handler`] is an async function over a shared [`RequestContext`]; it
//! produces its response by writing through the context. A [`Middleware`]
//! is a decorator `(next: Handler) -> Handler`, so a chain of them composes
//! into a single handler before any request arrives.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::RequestContext;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Shared handle to the per-request context.
pub type Ctx = Arc<RequestContext>;

/// A type-erased request handler.
pub type Handler = Arc<dyn Fn(Ctx) -> BoxFuture<'static, ()> + Send + Sync>;

/// A handler decorator.
pub type Middleware = Arc<dyn Fn(Handler) -> Handler + Send + Sync>;

/// Wraps an async function as a [`Handler`].
///
/// # Example
///
/// ```rust
/// use cyber_core::{handler_fn, Handler};
/// use http::StatusCode;
///
/// let hello: Handler = handler_fn(|ctx| async move {
///     ctx.string(StatusCode::OK, "hello");
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Handler
where
    F: Fn(Ctx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// Wraps a decorator function as a [`Middleware`].
///
/// # Example
///
/// ```rust
/// use cyber_core::{handler_fn, middleware_fn, Handler, Middleware};
/// use http::{HeaderValue, header};
///
/// let powered_by: Middleware = middleware_fn(|next: Handler| {
///     handler_fn(move |ctx| {
///         let next = next.clone();
///         async move {
///             ctx.set_header(header::SERVER, HeaderValue::from_static("cyber"));
///             next(ctx).await;
///         }
///     })
/// });
/// ```
pub fn middleware_fn<F>(f: F) -> Middleware
where
    F: Fn(Handler) -> Handler + Send + Sync + 'static,
{
    Arc::new(f)
}
