//! Request logging.

use std::sync::Arc;

use cyber_core::{handler_fn, middleware_fn, Handler, Middleware};
use tracing::{info, warn};

/// Emits one event per request once the inner handler returns.
///
/// Requests answered with a `5xx` status are logged at `warn`.
pub fn logger() -> Middleware {
    middleware_fn(|next: Handler| {
        handler_fn(move |ctx| {
            let next = next.clone();
            async move {
                next(Arc::clone(&ctx)).await;

                let status = ctx.status_code().as_u16();
                let latency_ms = ctx.elapsed().as_secs_f64() * 1000.0;
                let remote_addr = ctx
                    .remote_addr()
                    .map_or_else(|| "-".to_string(), |a| a.to_string());

                if status >= 500 {
                    warn!(
                        request_id = %ctx.request_id(),
                        method = %ctx.method(),
                        path = %ctx.path(),
                        remote_addr = %remote_addr,
                        status,
                        latency_ms,
                        "request completed"
                    );
                } else {
                    info!(
                        request_id = %ctx.request_id(),
                        method = %ctx.method(),
                        path = %ctx.path(),
                        remote_addr = %remote_addr,
                        status,
                        latency_ms,
                        "request completed"
                    );
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyber_core::RequestContext;
    use http::StatusCode;

    #[tokio::test]
    async fn test_logger_is_transparent() {
        let handler = logger()(handler_fn(|ctx| async move {
            ctx.string(StatusCode::ACCEPTED, "queued");
        }));
        let ctx = Arc::new(RequestContext::mock());
        handler(Arc::clone(&ctx)).await;
        assert_eq!(ctx.status_code(), StatusCode::ACCEPTED);
    }
}
