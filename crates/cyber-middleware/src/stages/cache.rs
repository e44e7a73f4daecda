//! Response caching.
//!
//! Responses to cacheable methods are stored under a key derived from the
//! method, path, sorted query and the `Accept` / `Accept-Encoding` headers.
//! A hit is answered from the store with `X-Cache: HIT`; a freshly stored
//! response carries `X-Cache: MISS`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cyber_core::{handler_fn, middleware_fn, Handler, Middleware, RequestContext};
use dashmap::DashMap;
use http::{header, HeaderName, HeaderValue, Method, Response, StatusCode};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::debug;

/// Name of the hit/miss marker header.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// A stored response.
#[derive(Debug, Clone)]
pub struct CacheItem {
    /// Response status.
    pub status: StatusCode,
    /// Stored headers.
    pub headers: Vec<(HeaderName, HeaderValue)>,
    /// Response body.
    pub body: Bytes,
    /// When the item stops being served.
    pub expires_at: Instant,
}

impl CacheItem {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn to_response(&self) -> Response<Bytes> {
        let mut response = Response::new(self.body.clone());
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            headers.insert(name.clone(), value.clone());
        }
        headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
        response
    }
}

/// Storage backend for cached responses.
pub trait CacheStore: Send + Sync {
    /// Returns a live item.
    fn get(&self, key: &str) -> Option<CacheItem>;

    /// Stores `item`, replacing any previous value.
    fn set(&self, key: String, item: CacheItem);

    /// Removes an item.
    fn delete(&self, key: &str);
}

/// In-memory store. Expired items are dropped on read and by
/// [`purge_expired`](Self::purge_expired).
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: DashMap<String, CacheItem>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes every expired item and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.items.len();
        self.items.retain(|_, item| !item.is_expired(now));
        before.saturating_sub(self.items.len())
    }

    /// Number of stored items, expired or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<CacheItem> {
        let now = Instant::now();
        let item = self.items.get(key).map(|entry| entry.value().clone())?;
        if item.is_expired(now) {
            self.items.remove_if(key, |_, item| item.is_expired(now));
            return None;
        }
        Some(item)
    }

    fn set(&self, key: String, item: CacheItem) {
        self.items.insert(key, item);
    }

    fn delete(&self, key: &str) {
        self.items.remove(key);
    }
}

/// Derives the cache key of a request, without the prefix.
pub type KeyGenerator = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// Cache settings.
#[derive(Clone)]
pub struct CacheConfig {
    /// Lifetime of stored items.
    pub ttl: Duration,
    /// Backend.
    pub store: Arc<dyn CacheStore>,
    /// Prepended to every generated key.
    pub key_prefix: String,
    /// Statuses that are stored.
    pub cache_status_codes: Vec<StatusCode>,
    /// Methods that bypass the cache.
    pub ignore_methods: Vec<Method>,
    /// Key derivation.
    pub key_generator: KeyGenerator,
    /// Store responses with an empty body.
    pub cache_empty: bool,
    /// Response headers kept with the item.
    pub cache_headers: Vec<HeaderName>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            store: Arc::new(MemoryStore::new()),
            key_prefix: "cyber-cache:".to_string(),
            cache_status_codes: vec![StatusCode::OK],
            ignore_methods: vec![Method::POST, Method::PUT, Method::DELETE, Method::PATCH],
            key_generator: Arc::new(default_cache_key),
            cache_empty: false,
            cache_headers: vec![header::CONTENT_TYPE, header::CONTENT_LENGTH],
        }
    }
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("ttl", &self.ttl)
            .field("key_prefix", &self.key_prefix)
            .field("cache_status_codes", &self.cache_status_codes)
            .field("ignore_methods", &self.ignore_methods)
            .field("cache_empty", &self.cache_empty)
            .field("cache_headers", &self.cache_headers)
            .finish_non_exhaustive()
    }
}

/// Hex SHA-256 of `METHOD-PATH-sorted_query#Accept:..|Accept-Encoding:..`.
///
/// The header suffix is omitted when neither header is present.
#[must_use]
pub fn default_cache_key(ctx: &RequestContext) -> String {
    let mut params: Vec<&str> = ctx
        .query()
        .filter(|q| !q.is_empty())
        .map(|q| q.split('&').collect())
        .unwrap_or_default();
    params.sort_unstable();

    let mut variants: Vec<String> = ["Accept", "Accept-Encoding"]
        .into_iter()
        .filter_map(|name| {
            ctx.header(name)
                .filter(|v| !v.is_empty())
                .map(|v| format!("{name}:{v}"))
        })
        .collect();
    variants.sort_unstable();
    let suffix = if variants.is_empty() {
        String::new()
    } else {
        format!("#{}", variants.join("|"))
    };

    let raw = format!(
        "{}-{}-{}{}",
        ctx.method(),
        ctx.path(),
        params.join("&"),
        suffix
    );
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Response caching with the default settings.
pub fn response_cache() -> Middleware {
    response_cache_with(CacheConfig::default())
}

/// Response caching with custom settings.
pub fn response_cache_with(config: CacheConfig) -> Middleware {
    let config = Arc::new(config);
    middleware_fn(move |next: Handler| {
        let config = Arc::clone(&config);
        handler_fn(move |ctx| {
            let next = next.clone();
            let config = Arc::clone(&config);
            async move {
                if config.ignore_methods.contains(ctx.method()) {
                    next(ctx).await;
                    return;
                }

                let key = format!("{}{}", config.key_prefix, (config.key_generator)(&ctx));
                if let Some(item) = config.store.get(&key) {
                    debug!(request_id = %ctx.request_id(), key = %key, "cache hit");
                    ctx.write_response(item.to_response());
                    return;
                }

                next(Arc::clone(&ctx)).await;

                let item = ctx
                    .with_response(|response| capture(&config, response))
                    .flatten();
                if let Some(item) = item {
                    config.store.set(key, item);
                    ctx.set_header(X_CACHE, HeaderValue::from_static("MISS"));
                }
            }
        })
    })
}

fn capture(config: &CacheConfig, response: &Response<Bytes>) -> Option<CacheItem> {
    if !config.cache_status_codes.contains(&response.status()) {
        return None;
    }
    if response.body().is_empty() && !config.cache_empty {
        return None;
    }
    let headers = config
        .cache_headers
        .iter()
        .filter_map(|name| {
            response
                .headers()
                .get(name)
                .map(|value| (name.clone(), value.clone()))
        })
        .collect();
    Some(CacheItem {
        status: response.status(),
        headers,
        body: response.body().clone(),
        expires_at: Instant::now() + config.ttl,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request(method: Method, uri: &str) -> Arc<RequestContext> {
        let req = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Bytes::new())
            .unwrap();
        Arc::new(RequestContext::from_request(req))
    }

    fn counting_handler(calls: &Arc<AtomicU32>) -> Handler {
        let calls = Arc::clone(calls);
        handler_fn(move |ctx| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                ctx.string(StatusCode::OK, format!("call {n}"));
            }
        })
    }

    async fn run(handler: &Handler, method: Method, uri: &str) -> Response<Bytes> {
        let ctx = request(method, uri);
        handler(Arc::clone(&ctx)).await;
        ctx.take_response()
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_then_hit() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = response_cache()(counting_handler(&calls));

        let first = run(&handler, Method::GET, "/items?b=2&a=1").await;
        assert_eq!(first.headers()[X_CACHE], "MISS");
        assert_eq!(first.body(), "call 1");

        let second = run(&handler, Method::GET, "/items?a=1&b=2").await;
        assert_eq!(second.headers()[X_CACHE], "HIT");
        assert_eq!(second.body(), "call 1");
        assert_eq!(
            second.headers()[header::CONTENT_TYPE],
            first.headers()[header::CONTENT_TYPE]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_methods_bypass() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = response_cache()(counting_handler(&calls));

        run(&handler, Method::POST, "/items").await;
        let response = run(&handler, Method::POST, "/items").await;
        assert!(!response.headers().contains_key(X_CACHE));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_expire() {
        let calls = Arc::new(AtomicU32::new(0));
        let store = Arc::new(MemoryStore::new());
        let handler = response_cache_with(CacheConfig {
            ttl: Duration::from_secs(10),
            store: store.clone(),
            ..Default::default()
        })(counting_handler(&calls));

        run(&handler, Method::GET, "/items").await;
        tokio::time::advance(Duration::from_secs(11)).await;
        let response = run(&handler, Method::GET, "/items").await;
        assert_eq!(response.body(), "call 2");
        assert_eq!(store.len(), 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_cacheable_status_and_empty_body() {
        let handler = response_cache()(handler_fn(|ctx| async move {
            ctx.string(StatusCode::NOT_FOUND, "missing");
        }));
        let response = run(&handler, Method::GET, "/nope").await;
        assert!(!response.headers().contains_key(X_CACHE));

        let handler = response_cache()(handler_fn(|ctx| async move {
            ctx.status(StatusCode::OK);
        }));
        let response = run(&handler, Method::GET, "/empty").await;
        assert!(!response.headers().contains_key(X_CACHE));
    }

    #[test]
    fn test_key_varies_by_accept() {
        let plain = request(Method::GET, "/a");
        let req = http::Request::builder()
            .uri("/a")
            .header("accept", "application/json")
            .body(Bytes::new())
            .unwrap();
        let json = RequestContext::from_request(req);

        let key = default_cache_key(&plain);
        assert_eq!(key.len(), 64);
        assert_ne!(key, default_cache_key(&json));
        assert_eq!(key, default_cache_key(&request(Method::GET, "/a")));
    }

    #[test]
    fn test_store_delete() {
        let store = MemoryStore::new();
        store.set(
            "k".into(),
            CacheItem {
                status: StatusCode::OK,
                headers: Vec::new(),
                body: Bytes::from_static(b"v"),
                expires_at: Instant::now() + Duration::from_secs(60),
            },
        );
        assert!(store.get("k").is_some());
        store.delete("k");
        assert!(store.get("k").is_none());
    }
}
