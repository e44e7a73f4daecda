//! Dispatch through a built application, without a network listener.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cyber_config::AppConfig;
use cyber_core::{codes, handler_fn, middleware_fn, ErrorBody, Handler, Middleware, RequestContext};
use cyber_core::{Rule, Schema};
use cyber_middleware::stages;
use cyber_server::{App, Dispatcher, X_REQUEST_ID};
use http::{header, Method, Request, Response, StatusCode};
use parking_lot::Mutex;
use serde::Deserialize;

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(name: &'static str, log: &Log) -> Middleware {
    let log = Arc::clone(log);
    middleware_fn(move |next: Handler| {
        let log = Arc::clone(&log);
        handler_fn(move |ctx| {
            let next = next.clone();
            let log = Arc::clone(&log);
            async move {
                log.lock().push(format!("{name}>"));
                next(ctx).await;
                log.lock().push(format!("<{name}"));
            }
        })
    })
}

fn text(body: &'static str) -> Handler {
    handler_fn(move |ctx| async move {
        ctx.string(StatusCode::OK, body);
    })
}

fn fast_executor() -> AppConfig {
    let mut config = AppConfig::default();
    config.executor.base_timeout_ms = 1_000;
    config.executor.max_attempts = 3;
    config.executor.max_timeout_ms = 2_000;
    config
}

async fn send(dispatcher: &Dispatcher, request: Request<Bytes>) -> Response<Bytes> {
    dispatcher
        .dispatch(Arc::new(RequestContext::from_request(request)))
        .await
}

async fn get(dispatcher: &Dispatcher, uri: &str) -> Response<Bytes> {
    let request = Request::builder().uri(uri).body(Bytes::new()).unwrap();
    send(dispatcher, request).await
}

fn error_code(response: &Response<Bytes>) -> String {
    serde_json::from_slice::<ErrorBody>(response.body())
        .unwrap()
        .code
}

#[tokio::test]
async fn static_beats_param_and_wildcard_consumes_rest() {
    let mut app = App::default();
    app.get("/users/profile", text("profile"))
        .get(
            "/users/:id",
            handler_fn(|ctx| async move {
                let id = ctx.param("id").unwrap_or_default();
                ctx.string(StatusCode::OK, format!("user {id}"));
            }),
        )
        .get(
            "/files/*",
            handler_fn(|ctx| async move {
                let rest = ctx.param("*").unwrap_or_default();
                ctx.string(StatusCode::OK, rest);
            }),
        );
    let dispatcher = app.build().unwrap();

    assert_eq!(get(&dispatcher, "/users/profile").await.body(), "profile");
    assert_eq!(get(&dispatcher, "/users/42").await.body(), "user 42");
    assert_eq!(get(&dispatcher, "/files/a/b/c").await.body(), "a/b/c");
    assert_eq!(
        get(&dispatcher, "/files").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn middleware_registered_after_routes_still_applies() {
    let log: Log = Arc::default();
    let mut app = App::default();
    app.get("/api/items", text("items"));
    app.use_route("GET", "/api/items", [recorder("route", &log)]);
    app.use_group("/api", [recorder("api", &log)]);
    app.use_global([recorder("global", &log)]);

    let dispatcher = app.build().unwrap();
    let response = get(&dispatcher, "/api/items").await;

    assert_eq!(response.body(), "items");
    assert_eq!(
        *log.lock(),
        ["global>", "api>", "route>", "<route", "<api", "<global"]
    );
}

#[tokio::test]
async fn group_does_not_cover_sibling_with_shared_prefix() {
    let log: Log = Arc::default();
    let mut app = App::default();
    app.group("/user").use_([recorder("user", &log)]);
    app.get("/username/:id", text("name"));
    app.get("/user/:id", text("user"));
    let dispatcher = app.build().unwrap();

    get(&dispatcher, "/username/5").await;
    assert!(log.lock().is_empty());

    get(&dispatcher, "/user/5").await;
    assert_eq!(*log.lock(), ["user>", "<user"]);
}

#[tokio::test]
async fn unsupported_route_middleware_method_is_dropped() {
    let log: Log = Arc::default();
    let mut app = App::default();
    app.use_route("BREW", "/coffee", [recorder("brew", &log)]);
    app.get("/coffee", text("hot"));
    let dispatcher = app.build().unwrap();

    assert_eq!(get(&dispatcher, "/coffee").await.body(), "hot");
    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn not_found_passes_through_global_middleware() {
    let mut app = App::default();
    app.use_global([stages::cors()]);
    app.group("/api").use_([middleware_fn(|_next: Handler| {
        handler_fn(|ctx| async move {
            ctx.string(StatusCode::FORBIDDEN, "group ran");
        })
    })]);
    let dispatcher = app.build().unwrap();

    let response = get(&dispatcher, "/api/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(error_code(&response), codes::NOT_FOUND);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    assert!(response.headers().contains_key(X_REQUEST_ID));
}

#[tokio::test]
async fn incoming_request_id_is_echoed() {
    let mut app = App::default();
    app.get("/", text("root"));
    let dispatcher = app.build().unwrap();

    let id = "01890a5d-ac96-774b-bcce-b302099a8057";
    let request = Request::builder()
        .uri("/")
        .header("x-request-id", id)
        .body(Bytes::new())
        .unwrap();
    let response = send(&dispatcher, request).await;
    assert_eq!(response.headers()[X_REQUEST_ID], id);
}

#[tokio::test(start_paused = true)]
async fn fast_handler_runs_once() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let mut app = App::new(fast_executor());
    app.get(
        "/fast",
        handler_fn(move |ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
            async move {
                ctx.string(StatusCode::OK, "done");
            }
        }),
    );
    let dispatcher = app.build().unwrap();

    let response = get(&dispatcher, "/fast").await;
    assert_eq!(response.body(), "done");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_handler_exhausts_attempts_with_504() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let mut app = App::new(fast_executor());
    app.get(
        "/hang",
        handler_fn(move |_ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
            std::future::pending()
        }),
    );
    let dispatcher = app.build().unwrap();

    let started = tokio::time::Instant::now();
    let response = get(&dispatcher, "/hang").await;

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(error_code(&response), codes::TIMEOUT);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 1s + 2s + 2s (capped).
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_yields_single_500() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&calls);
    let mut app = App::new(fast_executor());
    app.get(
        "/boom",
        handler_fn(move |_ctx| {
            seen.fetch_add(1, Ordering::SeqCst);
            async { panic!("boom") }
        }),
    );
    app.get("/ok", text("still up"));
    let dispatcher = app.build().unwrap();

    let response = get(&dispatcher, "/boom").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&response), codes::INTERNAL_ERROR);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert_eq!(get(&dispatcher, "/ok").await.body(), "still up");
}

#[tokio::test(start_paused = true)]
async fn abandoned_attempt_cannot_overwrite_timeout_response() {
    let mut config = fast_executor();
    config.executor.max_attempts = 1;
    let mut app = App::new(config);
    app.get(
        "/late",
        handler_fn(|ctx| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ctx.string(StatusCode::OK, "too late");
        }),
    );
    let dispatcher = app.build().unwrap();

    let ctx = Arc::new(RequestContext::from_request(
        Request::builder().uri("/late").body(Bytes::new()).unwrap(),
    ));
    let response = dispatcher.dispatch(Arc::clone(&ctx)).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(ctx.status_code(), StatusCode::GATEWAY_TIMEOUT);
    assert!(ctx.with_response(|_| ()).is_none());
}

#[tokio::test]
async fn executor_can_be_disabled() {
    let mut config = AppConfig::default();
    config.executor.enabled = false;
    let mut app = App::new(config);
    app.get(
        "/token",
        handler_fn(|ctx| async move {
            let has_deadline = ctx.context().deadline().is_some();
            ctx.string(StatusCode::OK, has_deadline.to_string());
        }),
    );
    let dispatcher = app.build().unwrap();
    assert_eq!(get(&dispatcher, "/token").await.body(), "false");
}

#[tokio::test]
async fn validation_failure_is_rejected_with_400() {
    #[derive(Deserialize)]
    struct Signup {
        #[allow(dead_code)]
        email: String,
    }

    let schema = Arc::new(Schema::new().field("email", [Rule::Required, Rule::Email]));
    let mut app = App::default();
    app.post(
        "/signup",
        handler_fn(move |ctx| {
            let schema = Arc::clone(&schema);
            async move {
                match ctx.bind_and_validate::<Signup>(&schema) {
                    Ok(_) => ctx.status(StatusCode::CREATED),
                    Err(e) => ctx.reject(&e),
                };
            }
        }),
    );
    let dispatcher = app.build().unwrap();

    let post = |body: &'static str| {
        Request::builder()
            .method(Method::POST)
            .uri("/signup")
            .body(Bytes::from_static(body.as_bytes()))
            .unwrap()
    };

    let response = send(&dispatcher, post(r#"{"email":"ada@example.com"}"#)).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(&dispatcher, post(r#"{"email":"nope"}"#)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response), codes::VALIDATION_ERROR);

    let response = send(&dispatcher, post("{")).await;
    assert_eq!(error_code(&response), codes::BAD_REQUEST);
}
