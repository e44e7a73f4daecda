//! Built-in middleware.
//!
//! Every stage is a [`Middleware`](cyber_core::Middleware) value that can be
//! registered at any tier. A typical global order:
//!
//! ```text
//! recovery → logger → cors → rate_limiter → metrics → ... → handler
//! ```
//!
//! The bounded executor ([`timeout`]) is normally installed by the
//! application around each route's resolved chain rather than registered by
//! hand.

pub mod cache;
pub mod cors;
pub mod jwt;
pub mod logger;
pub mod metrics;
pub mod rate_limit;
pub mod recovery;
pub mod timeout;

pub use cache::{
    default_cache_key, response_cache, response_cache_with, CacheConfig, CacheItem, CacheStore,
    MemoryStore,
};
pub use cors::{cors, cors_with, CorsConfig};
pub use jwt::{generate_token, jwt_auth, verify_token, Claims, JwtConfig, JwtError, TokenLookup};
pub use logger::logger;
pub use metrics::{metrics, metrics_handler, metrics_view_handler, metrics_with, MetricsConfig};
pub use rate_limit::{
    client_identity, rate_limiter, rate_limiter_from, rate_limiter_with, RateLimiter,
    RateLimiterConfig, TokenBucket,
};
pub use recovery::recovery;
pub use timeout::{execute, timeout, timeout_with, Outcome, TimeoutConfig};
