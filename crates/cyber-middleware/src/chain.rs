//! Ordered middleware sequences.

use std::fmt;

use cyber_core::{Handler, Middleware};

/// An ordered, append-only sequence of middleware.
///
/// `Clone` copies the sequence itself, so extending a clone never affects
/// the original. [`apply`](Self::apply) folds the sequence into a single
/// handler: the first registered middleware becomes the outermost wrapper
/// and runs its pre-logic first and its post-logic last.
///
/// # Example
///
/// ```
/// use cyber_core::{handler_fn, middleware_fn, Handler};
/// use cyber_middleware::MiddlewareChain;
///
/// let noop = middleware_fn(|next: Handler| next);
///
/// let mut chain = MiddlewareChain::new();
/// chain.use_(noop.clone()).use_(noop);
/// assert_eq!(chain.len(), 2);
///
/// let handler = chain.apply(handler_fn(|_ctx| async {}));
/// # let _ = handler;
/// ```
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Middleware>,
}

impl MiddlewareChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware.
    pub fn use_(&mut self, middleware: Middleware) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    /// Appends every middleware from `middlewares`, in order.
    pub fn extend(&mut self, middlewares: impl IntoIterator<Item = Middleware>) -> &mut Self {
        self.middlewares.extend(middlewares);
        self
    }

    /// Appends the contents of another chain.
    pub fn append(&mut self, other: &Self) -> &mut Self {
        self.middlewares.extend(other.middlewares.iter().cloned());
        self
    }

    /// Number of middleware in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Returns `true` if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Wraps `handler` with every middleware, first-registered outermost.
    #[must_use]
    pub fn apply(&self, handler: Handler) -> Handler {
        self.middlewares
            .iter()
            .rev()
            .fold(handler, |inner, middleware| middleware(inner))
    }
}

impl FromIterator<Middleware> for MiddlewareChain {
    fn from_iter<I: IntoIterator<Item = Middleware>>(iter: I) -> Self {
        Self {
            middlewares: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cyber_core::{handler_fn, middleware_fn, RequestContext};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    fn tracing_mw(name: &'static str, log: &Log) -> Middleware {
        let log = Arc::clone(log);
        middleware_fn(move |next: Handler| {
            let log = Arc::clone(&log);
            handler_fn(move |ctx| {
                let next = next.clone();
                let log = Arc::clone(&log);
                async move {
                    log.lock().push(format!("{name}:pre"));
                    next(ctx).await;
                    log.lock().push(format!("{name}:post"));
                }
            })
        })
    }

    fn recording_handler(log: &Log) -> Handler {
        let log = Arc::clone(log);
        handler_fn(move |_ctx| {
            let log = Arc::clone(&log);
            async move { log.lock().push("handler".to_string()) }
        })
    }

    #[tokio::test]
    async fn test_apply_is_onion_ordered() {
        let log: Log = Arc::default();
        let mut chain = MiddlewareChain::new();
        chain.use_(tracing_mw("a", &log)).use_(tracing_mw("b", &log));

        let handler = chain.apply(recording_handler(&log));
        handler(Arc::new(RequestContext::mock())).await;

        assert_eq!(
            *log.lock(),
            ["a:pre", "b:pre", "handler", "b:post", "a:post"]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_returns_handler() {
        let log: Log = Arc::default();
        let handler = MiddlewareChain::new().apply(recording_handler(&log));
        handler(Arc::new(RequestContext::mock())).await;
        assert_eq!(*log.lock(), ["handler"]);
    }

    #[test]
    fn test_clone_is_independent() {
        let log: Log = Arc::default();
        let mut original = MiddlewareChain::new();
        original.use_(tracing_mw("a", &log));

        let mut copy = original.clone();
        copy.use_(tracing_mw("b", &log));
        original.use_(tracing_mw("c", &log));

        assert_eq!(original.len(), 2);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn test_append_and_collect() {
        let log: Log = Arc::default();
        let first: MiddlewareChain = [tracing_mw("a", &log)].into_iter().collect();
        let mut second = MiddlewareChain::new();
        second.append(&first).extend([tracing_mw("b", &log)]);
        assert_eq!(second.len(), 2);
        assert!(!second.is_empty());
    }
}
