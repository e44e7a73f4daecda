//! Request dispatch over a built route table.

use std::fmt;

use bytes::Bytes;
use cyber_core::{codes, handler_fn, Ctx, Handler, UNMATCHED_ROUTE};
use cyber_router::Router;
use http::header::HeaderName;
use http::{HeaderValue, Method, Response, StatusCode};
use tracing::debug;

/// Header carrying the request id on every response.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Immutable route table produced by [`App::build`](crate::App::build).
///
/// Every handler in the table already carries its full middleware chain
/// and, when enabled, the bounded executor. Dispatching does no
/// composition work.
pub struct Dispatcher {
    router: Router<Handler>,
    not_found: Handler,
}

impl Dispatcher {
    pub(crate) fn new(router: Router<Handler>, not_found: Handler) -> Self {
        Self { router, not_found }
    }

    /// Routes `ctx` and returns its committed response.
    ///
    /// Captured parameters are written into the context before the handler
    /// runs. A miss runs the not-found handler. A handler that returns
    /// without writing yields an empty `200`.
    pub async fn dispatch(&self, ctx: Ctx) -> Response<Bytes> {
        let handler = match self.router.match_route(ctx.method(), ctx.path()) {
            Some(matched) => {
                ctx.set_params(matched.params);
                ctx.set_route(matched.pattern);
                matched.handler.clone()
            }
            None => {
                debug!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    "no route matched"
                );
                ctx.set_route(UNMATCHED_ROUTE);
                self.not_found.clone()
            }
        };

        if let Ok(value) = HeaderValue::from_str(&ctx.request_id().to_string()) {
            ctx.set_header(X_REQUEST_ID, value);
        }

        handler(ctx.clone()).await;
        ctx.take_response()
    }

    /// Returns `true` if `method` and `path` match a route.
    #[must_use]
    pub fn has_route(&self, method: &Method, path: &str) -> bool {
        self.router.match_route(method, path).is_some()
    }

    /// Number of registered routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.router.len()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("routes", &self.router.len())
            .finish_non_exhaustive()
    }
}

/// The default handler for unmatched requests.
pub(crate) fn not_found_handler() -> Handler {
    handler_fn(|ctx| async move {
        ctx.error(
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            format!("no route for {} {}", ctx.method(), ctx.path()),
        );
    })
}

/// A JSON error response built outside any request context.
pub(crate) fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Bytes> {
    let body = serde_json::to_vec(&cyber_core::ErrorBody::new(code, message)).unwrap_or_default();
    let mut response = Response::new(Bytes::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyber_core::RequestContext;
    use http::Request;
    use std::sync::Arc;

    fn ctx(method: Method, uri: &str) -> Ctx {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap();
        Arc::new(RequestContext::from_request(req))
    }

    fn dispatcher() -> Dispatcher {
        let mut router = Router::new();
        router
            .add_route(
                Method::GET,
                "/users/:id",
                handler_fn(|ctx| async move {
                    let id = ctx.param("id").unwrap_or_default();
                    ctx.string(StatusCode::OK, id);
                }),
            )
            .unwrap();
        router
            .add_route(Method::POST, "/silent", handler_fn(|_ctx| async {}))
            .unwrap();
        Dispatcher::new(router, not_found_handler())
    }

    #[tokio::test]
    async fn test_dispatch_writes_params() {
        let response = dispatcher().dispatch(ctx(Method::GET, "/users/42")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "42");
        assert!(response.headers().contains_key(X_REQUEST_ID));
    }

    #[tokio::test]
    async fn test_miss_is_not_found() {
        let response = dispatcher().dispatch(ctx(Method::GET, "/nope")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: cyber_core::ErrorBody = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.code, codes::NOT_FOUND);

        // Method mismatch is a miss as well.
        let response = dispatcher().dispatch(ctx(Method::DELETE, "/users/1")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_records_matched_route() {
        let d = dispatcher();

        let hit = ctx(Method::GET, "/users/42");
        d.dispatch(Arc::clone(&hit)).await;
        assert_eq!(hit.route().as_deref(), Some("/users/:id"));

        let miss = ctx(Method::GET, "/random/9f2c");
        d.dispatch(Arc::clone(&miss)).await;
        assert_eq!(miss.route().as_deref(), Some(UNMATCHED_ROUTE));
    }

    #[tokio::test]
    async fn test_unwritten_response_is_empty_ok() {
        let response = dispatcher().dispatch(ctx(Method::POST, "/silent")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_route_queries() {
        let d = dispatcher();
        assert_eq!(d.route_count(), 2);
        assert!(d.has_route(&Method::GET, "/users/7"));
        assert!(!d.has_route(&Method::GET, "/users"));
    }

    #[test]
    fn test_error_response_envelope() {
        let response = error_response(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, "bad body");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["code"], "BAD_REQUEST");
        assert_eq!(body["message"], "bad body");
    }
}
