//! Token-bucket rate limiting per client identity.
//!
//! Each identity (normally the client address) owns a bucket that refills
//! continuously at `rate` tokens per second up to `capacity`. A request
//! takes one token; with an empty bucket it is rejected with
//! `429 RATE_LIMITED`, optionally after waiting once for a refill.
//!
//! Buckets are created on first sight of an identity and are never evicted.

use std::sync::Arc;
use std::time::Duration;

use cyber_core::{codes, handler_fn, middleware_fn, Handler, Middleware, RequestContext};
use dashmap::DashMap;
use http::StatusCode;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Headers consulted for the client identity, in order.
pub const IDENTITY_HEADERS: [&str; 4] = [
    "x-real-ip",
    "x-forwarded-for",
    "cf-connecting-ip",
    "true-client-ip",
];

/// Message of the `429` response.
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests, please try again later";

/// A token bucket.
///
/// # Example
///
/// ```
/// use cyber_middleware::stages::TokenBucket;
///
/// let bucket = TokenBucket::new(2.0, 1.0);
/// assert!(bucket.take());
/// assert!(bucket.take());
/// assert!(!bucket.take());
/// ```
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    rate: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    #[must_use]
    pub fn new(capacity: f64, rate: f64) -> Self {
        Self {
            capacity,
            rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Refills for the time elapsed and takes one token if available.
    pub fn take(&self) -> bool {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.last_refill = now;
        state.tokens = elapsed.mul_add(self.rate, state.tokens).min(self.capacity);

        if state.tokens < 1.0 {
            return false;
        }
        state.tokens -= 1.0;
        true
    }

    /// Tokens currently available, without refilling.
    #[must_use]
    pub fn tokens(&self) -> f64 {
        self.state.lock().tokens
    }
}

/// Rate limiter settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiterConfig {
    /// Tokens added per second.
    pub rate: f64,
    /// Maximum tokens a bucket holds.
    pub capacity: f64,
    /// Wait before a second attempt when the bucket is empty; `None` rejects
    /// immediately.
    pub wait: Option<Duration>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            rate: 10.0,
            capacity: 20.0,
            wait: None,
        }
    }
}

/// Per-identity buckets.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl RateLimiter {
    /// Creates a limiter with no buckets.
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    /// Returns the bucket for `identity`, creating it on first use.
    pub fn bucket(&self, identity: &str) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(identity) {
            return Arc::clone(bucket.value());
        }
        let bucket = self
            .buckets
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(TokenBucket::new(self.config.capacity, self.config.rate)));
        Arc::clone(bucket.value())
    }

    /// Takes a token for `identity`, waiting once if configured.
    pub async fn acquire(&self, identity: &str) -> bool {
        let bucket = self.bucket(identity);
        if bucket.take() {
            return true;
        }
        match self.config.wait {
            Some(wait) if !wait.is_zero() => {
                tokio::time::sleep(wait).await;
                bucket.take()
            }
            _ => false,
        }
    }

    /// Number of identities seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Returns `true` if no identity has been seen.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Resolves the identity a request is limited under.
///
/// The first non-empty identity header wins, then the peer address.
#[must_use]
pub fn client_identity(ctx: &RequestContext) -> String {
    IDENTITY_HEADERS
        .iter()
        .filter_map(|name| ctx.header(*name))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| ctx.remote_addr().map(|addr| addr.to_string()))
        .unwrap_or_default()
}

/// Rate limiting with the default settings (20 tokens, 10 per second).
pub fn rate_limiter() -> Middleware {
    rate_limiter_with(RateLimiterConfig::default())
}

/// Rate limiting with custom settings.
pub fn rate_limiter_with(config: RateLimiterConfig) -> Middleware {
    rate_limiter_from(Arc::new(RateLimiter::new(config)))
}

/// Rate limiting over an existing limiter, so buckets can be inspected or
/// shared between routes.
pub fn rate_limiter_from(limiter: Arc<RateLimiter>) -> Middleware {
    middleware_fn(move |next: Handler| {
        let limiter = Arc::clone(&limiter);
        handler_fn(move |ctx| {
            let next = next.clone();
            let limiter = Arc::clone(&limiter);
            async move {
                let identity = client_identity(&ctx);
                if !limiter.acquire(&identity).await {
                    debug!(
                        request_id = %ctx.request_id(),
                        identity = %identity,
                        "rate limit exceeded"
                    );
                    ctx.error(
                        StatusCode::TOO_MANY_REQUESTS,
                        codes::RATE_LIMITED,
                        RATE_LIMITED_MESSAGE,
                    );
                    return;
                }
                next(ctx).await;
            }
        })
    })
}
