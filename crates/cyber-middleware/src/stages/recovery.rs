//! Panic recovery.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use cyber_core::{codes, handler_fn, middleware_fn, Handler, Middleware};
use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

/// Catches a panic from the inner handler and answers
/// `500 INTERNAL_ERROR`.
///
/// Register it first so it wraps every other stage.
pub fn recovery() -> Middleware {
    middleware_fn(|next: Handler| {
        handler_fn(move |ctx| {
            let next = next.clone();
            async move {
                let result = AssertUnwindSafe(next(Arc::clone(&ctx)))
                    .catch_unwind()
                    .await;
                if let Err(panic) = result {
                    error!(
                        request_id = %ctx.request_id(),
                        method = %ctx.method(),
                        path = %ctx.path(),
                        panic = panic_message(panic.as_ref()),
                        "recovered from panic"
                    );
                    ctx.error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        codes::INTERNAL_ERROR,
                        "Internal Server Error",
                    );
                }
            }
        })
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
