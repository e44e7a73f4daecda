//! Three-tier middleware registry.
//!
//! Middleware is registered at one of three tiers:
//!
//! ```text
//! global ──► groups (matching prefixes) ──► route (method, pattern) ──► handler
//! ```
//!
//! [`MiddlewareRegistry::resolve`] concatenates the tiers in that order into
//! one [`MiddlewareChain`]. Resolution is meant to run once per route when
//! the application is built, never per request.

use std::collections::HashMap;

use cyber_core::{Handler, Middleware};
use cyber_router::{is_segment_prefix, normalize_path, segments};
use http::Method;
use indexmap::IndexMap;
use tracing::{info, warn};

use crate::MiddlewareChain;

/// Methods that may carry route-level middleware.
pub const SUPPORTED_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
];

/// Global, group and route middleware chains.
///
/// # Example
///
/// ```
/// use cyber_core::{middleware_fn, Handler};
/// use cyber_middleware::MiddlewareRegistry;
/// use http::Method;
///
/// let noop = middleware_fn(|next: Handler| next);
///
/// let mut registry = MiddlewareRegistry::new();
/// registry.use_global([noop.clone()]);
/// registry.use_group("/api", [noop.clone()]);
/// registry.use_route("GET", "/api/users/:id", [noop]);
///
/// assert_eq!(registry.chain_for(&Method::GET, "/api/users/:id").len(), 3);
/// assert_eq!(registry.chain_for(&Method::GET, "/apiary").len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MiddlewareRegistry {
    global: MiddlewareChain,
    groups: IndexMap<String, MiddlewareChain>,
    routes: HashMap<(Method, String), MiddlewareChain>,
}

impl MiddlewareRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends global middleware, applied to every route and to the
    /// not-found handler.
    pub fn use_global(&mut self, middlewares: impl IntoIterator<Item = Middleware>) {
        let before = self.global.len();
        self.global.extend(middlewares);
        info!(
            added = self.global.len() - before,
            total = self.global.len(),
            "global middleware registered"
        );
    }

    /// Appends middleware for every route under `prefix`.
    ///
    /// Prefixes are compared segment by segment, so `/user` does not cover
    /// `/username`.
    pub fn use_group(&mut self, prefix: &str, middlewares: impl IntoIterator<Item = Middleware>) {
        let prefix = normalize_path(prefix).into_owned();
        let chain = self.groups.entry(prefix.clone()).or_default();
        let before = chain.len();
        chain.extend(middlewares);
        info!(
            group = %prefix,
            added = chain.len() - before,
            total = chain.len(),
            "group middleware registered"
        );
    }

    /// Appends middleware for one `(method, pattern)` route.
    ///
    /// An unsupported method name is logged and the registration dropped.
    pub fn use_route(
        &mut self,
        method: &str,
        pattern: &str,
        middlewares: impl IntoIterator<Item = Middleware>,
    ) {
        let Some(method) = parse_method(method) else {
            warn!(
                method,
                pattern, "dropping middleware registered for unsupported method"
            );
            return;
        };
        let pattern = normalize_path(pattern).into_owned();
        let chain = self
            .routes
            .entry((method.clone(), pattern.clone()))
            .or_default();
        let before = chain.len();
        chain.extend(middlewares);
        info!(
            %method,
            route = %pattern,
            added = chain.len() - before,
            total = chain.len(),
            "route middleware registered"
        );
    }

    /// Builds the effective chain for a route.
    ///
    /// Global middleware comes first, then every group whose prefix covers
    /// `pattern` (shorter prefixes first, registration order among equals),
    /// then the route's own middleware.
    #[must_use]
    pub fn chain_for(&self, method: &Method, pattern: &str) -> MiddlewareChain {
        let pattern = normalize_path(pattern);
        let mut chain = self.global.clone();

        let mut groups: Vec<(usize, &MiddlewareChain)> = self
            .groups
            .iter()
            .filter(|(prefix, _)| is_segment_prefix(prefix, &pattern))
            .map(|(prefix, group)| (segments(prefix).count(), group))
            .collect();
        groups.sort_by_key(|(depth, _)| *depth);
        for (_, group) in groups {
            chain.append(group);
        }

        if let Some(route) = self.routes.get(&(method.clone(), pattern.into_owned())) {
            chain.append(route);
        }
        chain
    }

    /// Decorates `handler` with the effective chain for a route.
    #[must_use]
    pub fn resolve(&self, method: &Method, pattern: &str, handler: Handler) -> Handler {
        self.chain_for(method, pattern).apply(handler)
    }

    /// Decorates `handler` with the global chain only.
    #[must_use]
    pub fn apply_global(&self, handler: Handler) -> Handler {
        self.global.apply(handler)
    }

    /// The global chain.
    #[must_use]
    pub fn global(&self) -> &MiddlewareChain {
        &self.global
    }
}

/// Parses a method name accepted for route middleware.
#[must_use]
pub fn parse_method(name: &str) -> Option<Method> {
    let method = Method::from_bytes(name.to_ascii_uppercase().as_bytes()).ok()?;
    SUPPORTED_METHODS.contains(&method).then_some(method)
}
