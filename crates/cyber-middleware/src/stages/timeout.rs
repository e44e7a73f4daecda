//! Bounded execution: per-attempt deadlines with retry and panic isolation.
//!
//! Each attempt runs the inner handler as its own task under a fresh child
//! of the request's cancellation token. The child is scoped to that task, so
//! `ctx.context()` inside an attempt always returns the attempt's own token:
//!
//! ```text
//! attempt 1 (base) ──timeout──► attempt 2 (2×base) ──timeout──► ... ──► 504
//!      │                             │
//!      └── completes ──► done        └── panics ──► 500, no retry
//! ```
//!
//! An attempt that misses its deadline is abandoned, not aborted. Its token
//! is cancelled, and it keeps running until it returns or notices that. Any
//! response it
//! writes after another path has responded is dropped by the context's
//! write-once guard.

use std::sync::Arc;
use std::time::Duration;

use cyber_core::{codes, handler_fn, middleware_fn, Ctx, Handler, Middleware};
use http::StatusCode;
use tracing::{debug, error, warn};

/// Message of the `504` written when every attempt expires.
pub const TIMEOUT_MESSAGE: &str = "Request timed out after maximum retries";

/// Retry policy of the bounded executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Deadline of the first attempt.
    pub base_timeout: Duration,
    /// Attempts before answering `504`.
    pub max_attempts: u32,
    /// Cap for the doubled deadline.
    pub max_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(10),
            max_attempts: 3,
            max_timeout: Duration::from_secs(60),
        }
    }
}

impl TimeoutConfig {
    /// Deadline of the attempt following one that ran under `current`.
    ///
    /// ```
    /// use std::time::Duration;
    /// use cyber_middleware::stages::TimeoutConfig;
    ///
    /// let config = TimeoutConfig::default();
    /// assert_eq!(config.next_timeout(Duration::from_secs(10)), Duration::from_secs(20));
    /// assert_eq!(config.next_timeout(Duration::from_secs(40)), Duration::from_secs(60));
    /// ```
    #[must_use]
    pub fn next_timeout(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_timeout)
    }
}

/// How a bounded execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// An attempt returned, or a response was committed before expiry.
    Completed {
        /// Attempts started.
        attempts: u32,
    },
    /// An attempt panicked; `500` was written.
    Panicked {
        /// Attempts started.
        attempts: u32,
    },
    /// Every attempt expired; `504` was written.
    TimedOut {
        /// Attempts started.
        attempts: u32,
    },
    /// The request's own token was cancelled; nothing was written.
    Cancelled {
        /// Attempts started.
        attempts: u32,
    },
}

impl Outcome {
    /// Attempts started before the execution ended.
    #[must_use]
    pub const fn attempts(self) -> u32 {
        match self {
            Self::Completed { attempts }
            | Self::Panicked { attempts }
            | Self::TimedOut { attempts }
            | Self::Cancelled { attempts } => attempts,
        }
    }
}

/// Bounded executor with the default policy (10s, 3 attempts, 60s cap).
pub fn timeout() -> Middleware {
    timeout_with(TimeoutConfig::default())
}

/// Bounded executor with a custom policy.
pub fn timeout_with(config: TimeoutConfig) -> Middleware {
    middleware_fn(move |next: Handler| {
        handler_fn(move |ctx| {
            let next = next.clone();
            async move {
                execute(&config, &next, ctx).await;
            }
        })
    })
}

/// Runs `handler` for `ctx` under `config`.
///
/// The token installed on the context is left untouched; attempts see their
/// own tokens through [`RequestContext::scope_context`].
///
/// [`RequestContext::scope_context`]: cyber_core::RequestContext::scope_context
pub async fn execute(config: &TimeoutConfig, handler: &Handler, ctx: Ctx) -> Outcome {
    let parent = ctx.context();
    let max_attempts = config.max_attempts.max(1);
    let mut timeout = config.base_timeout;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let token = parent.child_with_timeout(timeout);
        let run = {
            let handler = Arc::clone(handler);
            let ctx = Arc::clone(&ctx);
            async move { handler(ctx).await }
        };
        let mut task = tokio::spawn(ctx.scope_context(token.clone(), run));

        tokio::select! {
            biased;

            joined = &mut task => {
                token.cancel();
                match joined {
                    Ok(()) => break Outcome::Completed { attempts: attempt },
                    Err(e) => {
                        error!(
                            request_id = %ctx.request_id(),
                            path = %ctx.path(),
                            attempt,
                            error = %e,
                            "handler panicked"
                        );
                        ctx.error(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            codes::INTERNAL_ERROR,
                            "Internal Server Error",
                        );
                        break Outcome::Panicked { attempts: attempt };
                    }
                }
            }

            () = token.cancelled() => {
                if ctx.is_written() {
                    debug!(
                        request_id = %ctx.request_id(),
                        attempt,
                        "response committed before deadline, not retrying"
                    );
                    break Outcome::Completed { attempts: attempt };
                }
                if parent.is_cancelled() {
                    debug!(request_id = %ctx.request_id(), attempt, "request cancelled");
                    break Outcome::Cancelled { attempts: attempt };
                }
                if attempt >= max_attempts {
                    warn!(
                        request_id = %ctx.request_id(),
                        path = %ctx.path(),
                        attempts = attempt,
                        "request timed out after maximum retries"
                    );
                    ctx.error(StatusCode::GATEWAY_TIMEOUT, codes::TIMEOUT, TIMEOUT_MESSAGE);
                    break Outcome::TimedOut { attempts: attempt };
                }

                let next = config.next_timeout(timeout);
                warn!(
                    request_id = %ctx.request_id(),
                    path = %ctx.path(),
                    attempt,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    next_timeout_ms = u64::try_from(next.as_millis()).unwrap_or(u64::MAX),
                    "attempt timed out, retrying"
                );
                timeout = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use cyber_core::{CancellationToken, ErrorBody, RequestContext};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn body(ctx: &RequestContext) -> Bytes {
        ctx.with_response(|r| r.body().clone()).unwrap_or_default()
    }

    fn counting(calls: &Arc<AtomicU32>, f: fn(u32) -> Handler) -> Handler {
        let calls = Arc::clone(calls);
        handler_fn(move |ctx| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let inner = f(n);
            async move { inner(ctx).await }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_handler_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = counting(&calls, |_| {
            handler_fn(|ctx| async move {
                ctx.string(StatusCode::OK, "ok");
            })
        });
        let ctx = Arc::new(RequestContext::mock());

        let outcome = execute(&TimeoutConfig::default(), &handler, Arc::clone(&ctx)).await;

        assert_eq!(outcome, Outcome::Completed { attempts: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(body(&ctx), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_handler_exhausts_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = counting(&calls, |_| handler_fn(|_ctx| std::future::pending()));
        let ctx = Arc::new(RequestContext::mock());
        let started = Instant::now();

        let outcome = execute(&TimeoutConfig::default(), &handler, Arc::clone(&ctx)).await;

        assert_eq!(outcome, Outcome::TimedOut { attempts: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 10s + 20s + 40s
        assert_eq!(started.elapsed(), Duration::from_secs(70));
        assert_eq!(ctx.status_code(), StatusCode::GATEWAY_TIMEOUT);
        let err: ErrorBody = serde_json::from_slice(&body(&ctx)).unwrap();
        assert_eq!(err.code, codes::TIMEOUT);
        assert_eq!(err.message, TIMEOUT_MESSAGE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_deadlines_double_and_cap() {
        let budgets: Arc<Mutex<Vec<Duration>>> = Arc::default();
        let seen = Arc::clone(&budgets);
        let handler = handler_fn(move |ctx| {
            let seen = Arc::clone(&seen);
            async move {
                let token = ctx.context();
                if let Some(deadline) = token.deadline() {
                    seen.lock().push(deadline - Instant::now());
                }
                std::future::pending::<()>().await;
            }
        });
        let config = TimeoutConfig {
            base_timeout: Duration::from_secs(1),
            max_attempts: 4,
            max_timeout: Duration::from_secs(3),
        };

        let ctx = Arc::new(RequestContext::mock());
        let outcome = execute(&config, &handler, ctx).await;

        assert_eq!(outcome.attempts(), 4);
        assert_eq!(
            *budgets.lock(),
            [
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(3),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_yields_single_500_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = counting(&calls, |_| {
            handler_fn(|_ctx| async {
                panic!("boom");
            })
        });
        let ctx = Arc::new(RequestContext::mock());

        let outcome = execute(&TimeoutConfig::default(), &handler, Arc::clone(&ctx)).await;

        assert_eq!(outcome, Outcome::Panicked { attempts: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let err: ErrorBody = serde_json::from_slice(&body(&ctx)).unwrap();
        assert_eq!(err.code, codes::INTERNAL_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_attempt_cannot_double_write() {
        // Each attempt sleeps 15s: the first misses its 10s deadline, then
        // writes at t=15s while the second attempt is still running.
        let calls = Arc::new(AtomicU32::new(0));
        let handler = counting(&calls, |n| {
            handler_fn(move |ctx| async move {
                tokio::time::sleep(Duration::from_secs(15)).await;
                ctx.string(StatusCode::OK, n.to_string());
            })
        });
        let ctx = Arc::new(RequestContext::mock());

        let outcome = execute(&TimeoutConfig::default(), &handler, Arc::clone(&ctx)).await;

        assert_eq!(outcome, Outcome::Completed { attempts: 2 });
        assert_eq!(body(&ctx), "1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_write_after_504_is_dropped() {
        let handler = handler_fn(|ctx| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            ctx.string(StatusCode::OK, "too late");
        });
        let config = TimeoutConfig {
            base_timeout: Duration::from_secs(1),
            max_attempts: 1,
            max_timeout: Duration::from_secs(1),
        };
        let ctx = Arc::new(RequestContext::mock());

        let outcome = execute(&config, &handler, Arc::clone(&ctx)).await;
        assert_eq!(outcome, Outcome::TimedOut { attempts: 1 });

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(ctx.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancellation_stops_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let handler = counting(&calls, |_| handler_fn(|_ctx| std::future::pending()));
        let ctx = Arc::new(RequestContext::mock());
        let root = CancellationToken::new();
        ctx.with_context(root.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            root.cancel();
        });

        let outcome = execute(&TimeoutConfig::default(), &handler, Arc::clone(&ctx)).await;
        canceller.await.unwrap();

        assert_eq!(outcome, Outcome::Cancelled { attempts: 1 });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!ctx.is_written());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_attempts_observe_their_own_cancellation() {
        let stopped = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&stopped);
        let handler = handler_fn(move |ctx| {
            let seen = Arc::clone(&seen);
            async move {
                loop {
                    if ctx.context().is_cancelled() {
                        seen.fetch_add(1, Ordering::SeqCst);
                        return;
                    }
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        });
        let ctx = Arc::new(RequestContext::mock());

        let outcome = execute(&TimeoutConfig::default(), &handler, Arc::clone(&ctx)).await;
        assert_eq!(outcome, Outcome::TimedOut { attempts: 3 });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
        assert!(!ctx.context().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_installed_token_untouched() {
        let ctx = Arc::new(RequestContext::mock());
        let root = CancellationToken::new();
        ctx.with_context(root.clone());

        let handler = handler_fn(|ctx| async move {
            assert!(ctx.context().deadline().is_some());
        });
        let outcome = execute(&TimeoutConfig::default(), &handler, Arc::clone(&ctx)).await;
        assert_eq!(outcome, Outcome::Completed { attempts: 1 });

        assert!(ctx.context().deadline().is_none());
        root.cancel();
        assert!(ctx.context().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_as_middleware() {
        let config = TimeoutConfig {
            base_timeout: Duration::from_millis(100),
            max_attempts: 2,
            max_timeout: Duration::from_millis(200),
        };
        let handler = timeout_with(config)(handler_fn(|_ctx| std::future::pending()));
        let ctx = Arc::new(RequestContext::mock());
        handler(Arc::clone(&ctx)).await;
        assert_eq!(ctx.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }
}
