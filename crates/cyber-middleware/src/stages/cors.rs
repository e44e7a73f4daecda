//! CORS (Cross-Origin Resource Sharing) headers.
//!
//! Every response carries the configured `Access-Control-*` headers.
//! `OPTIONS` preflight requests are answered with `200` directly and never
//! reach the handler.
//!
//! ## Example
//!
//! ```
//! use cyber_middleware::stages::{cors_with, CorsConfig};
//!
//! let cors = cors_with(CorsConfig {
//!     allow_origins: vec!["https://app.example.com".to_string()],
//!     allow_credentials: true,
//!     ..Default::default()
//! });
//! # let _ = cors;
//! ```

use std::sync::Arc;

use cyber_core::{handler_fn, middleware_fn, Handler, Middleware, RequestContext};
use http::{header, HeaderName, HeaderValue, Method, StatusCode};
use tracing::warn;

/// CORS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsConfig {
    /// Values of `Access-Control-Allow-Origin`.
    pub allow_origins: Vec<String>,
    /// Values of `Access-Control-Allow-Methods`.
    pub allow_methods: Vec<String>,
    /// Values of `Access-Control-Allow-Headers`.
    pub allow_headers: Vec<String>,
    /// Values of `Access-Control-Expose-Headers`; omitted when empty.
    pub expose_headers: Vec<String>,
    /// Sends `Access-Control-Allow-Credentials: true`.
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds; omitted when zero.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allow_headers: ["Origin", "Content-Type", "Accept", "Authorization"]
                .map(String::from)
                .to_vec(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: 7200,
        }
    }
}

/// Header values rendered once when the middleware is built.
#[derive(Debug)]
struct CorsHeaders(Vec<(HeaderName, HeaderValue)>);

impl CorsHeaders {
    fn from_config(config: &CorsConfig) -> Self {
        let mut headers = Vec::new();
        let mut push = |name: HeaderName, value: String| match HeaderValue::from_str(&value) {
            Ok(value) => headers.push((name, value)),
            Err(_) => warn!(header = %name, value = %value, "skipping invalid CORS header value"),
        };

        push(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            config.allow_origins.join(","),
        );
        push(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            config.allow_methods.join(","),
        );
        push(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            config.allow_headers.join(","),
        );
        if !config.expose_headers.is_empty() {
            push(
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                config.expose_headers.join(","),
            );
        }
        if config.allow_credentials {
            push(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                "true".to_string(),
            );
        }
        if config.max_age_secs > 0 {
            push(header::ACCESS_CONTROL_MAX_AGE, config.max_age_secs.to_string());
        }
        Self(headers)
    }

    fn apply(&self, ctx: &RequestContext) {
        for (name, value) in &self.0 {
            ctx.set_header(name.clone(), value.clone());
        }
    }
}

/// CORS with the permissive defaults.
pub fn cors() -> Middleware {
    cors_with(CorsConfig::default())
}

/// CORS with custom settings.
pub fn cors_with(config: CorsConfig) -> Middleware {
    let headers = Arc::new(CorsHeaders::from_config(&config));
    middleware_fn(move |next: Handler| {
        let headers = Arc::clone(&headers);
        handler_fn(move |ctx| {
            let next = next.clone();
            let headers = Arc::clone(&headers);
            async move {
                headers.apply(&ctx);
                if ctx.method() == Method::OPTIONS {
                    ctx.status(StatusCode::OK);
                    return;
                }
                next(ctx).await;
            }
        })
    })
}
