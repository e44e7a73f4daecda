//! Request metrics collection and the built-in metrics endpoints.

use std::sync::Arc;

use cyber_core::{handler_fn, middleware_fn, Handler, Middleware};
use cyber_telemetry::RequestMetrics;
use http::StatusCode;

/// Metrics middleware settings.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Collector the middleware records into.
    pub collector: Arc<RequestMetrics>,
    /// Paths that are not recorded.
    pub skip_paths: Vec<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            collector: RequestMetrics::global(),
            skip_paths: ["/metrics", "/health", "/favicon.ico"]
                .map(String::from)
                .to_vec(),
        }
    }
}

/// Records every request into the process-wide collector.
pub fn metrics() -> Middleware {
    metrics_with(MetricsConfig::default())
}

/// Records requests into `config.collector`.
///
/// Requests are keyed by the route pattern the dispatcher recorded, with
/// every unmatched request sharing one key. A context that was never
/// dispatched is keyed by its raw path.
pub fn metrics_with(config: MetricsConfig) -> Middleware {
    let config = Arc::new(config);
    middleware_fn(move |next: Handler| {
        let config = Arc::clone(&config);
        handler_fn(move |ctx| {
            let next = next.clone();
            let config = Arc::clone(&config);
            async move {
                if config.skip_paths.iter().any(|p| p == ctx.path()) {
                    next(ctx).await;
                    return;
                }
                let key = ctx.route().unwrap_or_else(|| ctx.path().to_string());
                let in_flight = config.collector.start(&key, ctx.method().as_str());
                next(Arc::clone(&ctx)).await;
                in_flight.finish(ctx.status_code().as_u16());
            }
        })
    })
}

/// Serves the collector's summary as JSON.
pub fn metrics_handler(collector: Arc<RequestMetrics>) -> Handler {
    handler_fn(move |ctx| {
        let summary = collector.summary();
        async move {
            ctx.success(&summary);
        }
    })
}

/// Serves the collector's summary as an HTML page.
pub fn metrics_view_handler(collector: Arc<RequestMetrics>) -> Handler {
    handler_fn(move |ctx| {
        let page = collector.render_html();
        async move {
            ctx.html(StatusCode::OK, page);
        }
    })
}
