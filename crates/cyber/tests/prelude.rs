//! The prelude is enough to assemble and dispatch an application.

use std::sync::Arc;

use bytes::Bytes;
use cyber::prelude::*;
use cyber::telemetry::RequestMetrics;

async fn get(dispatcher: &Dispatcher, uri: &str) -> http::Response<Bytes> {
    let request = http::Request::builder()
        .uri(uri)
        .body(Bytes::new())
        .unwrap();
    dispatcher
        .dispatch(Arc::new(RequestContext::from_request(request)))
        .await
}

#[tokio::test]
async fn metrics_endpoint_reports_dispatched_requests() {
    let collector = Arc::new(RequestMetrics::new());

    let mut app = App::default();
    app.use_global([stages::metrics_with(stages::MetricsConfig {
        collector: Arc::clone(&collector),
        ..Default::default()
    })]);
    app.get(
        "/items/:id",
        handler_fn(|ctx| async move {
            ctx.string(StatusCode::OK, ctx.param("id").unwrap_or_default());
        }),
    );
    app.get("/metrics", stages::metrics_handler(Arc::clone(&collector)));
    let dispatcher = app.build().unwrap();

    get(&dispatcher, "/items/1").await;
    get(&dispatcher, "/items/2").await;
    get(&dispatcher, "/missing").await;

    let response = get(&dispatcher, "/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
    assert_eq!(summary["total_requests"], 3);
    assert_eq!(summary["error_count"], 1);
    assert_eq!(summary["requests_per_path"]["/items/:id"], 2);
    assert_eq!(summary["requests_per_path"]["<unmatched>"], 1);
}

#[test]
fn config_presets_build() {
    for config in [AppConfig::development(), AppConfig::production()] {
        assert!(config.validate().is_ok());
        assert!(App::new(config).build().is_ok());
    }
}
