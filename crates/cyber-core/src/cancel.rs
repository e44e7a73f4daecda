//! Hierarchical cancellation tokens.
//!
//! A [`CancellationToken`] is cancelled explicitly, when its parent is
//! cancelled, or when its deadline passes. The bounded executor derives one
//! child token per attempt from the request's root token, so cancelling the
//! request cancels whichever attempt is currently running.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    deadline: Option<Instant>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn new(deadline: Option<Instant>) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
            deadline,
            children: Mutex::new(Vec::new()),
        }
    }

    fn cancel(&self) {
        if self
            .cancelled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.notify.notify_waiters();

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// A cloneable cancellation token.
///
/// Clones share state: cancelling one clone cancels them all.
///
/// # Example
///
/// ```rust
/// use cyber_core::CancellationToken;
///
/// let request = CancellationToken::new();
/// let attempt = request.child_token();
///
/// request.cancel();
/// assert!(attempt.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Creates a root token with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::new(None)),
        }
    }

    /// Derives a child token that inherits this token's deadline.
    #[must_use]
    pub fn child_token(&self) -> Self {
        self.derive(self.inner.deadline)
    }

    /// Derives a child token that also expires after `timeout`.
    ///
    /// The effective deadline is the earlier of the parent's deadline and
    /// `now + timeout`.
    #[must_use]
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let own = Instant::now() + timeout;
        let deadline = match self.inner.deadline {
            Some(parent) => parent.min(own),
            None => own,
        };
        self.derive(Some(deadline))
    }

    fn derive(&self, deadline: Option<Instant>) -> Self {
        let child = Arc::new(Inner::new(deadline));
        {
            let mut children = self.inner.children.lock();
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // Checked after registering so a concurrent cancel cannot slip between.
        if self.inner.cancelled.load(Ordering::Acquire) {
            child.cancel();
        }
        Self { inner: child }
    }

    /// Cancels this token and every live descendant. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    /// Returns `true` once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Returns the deadline, if this token has one.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Completes when the token is cancelled or its deadline passes.
    ///
    /// Reaching the deadline cancels the token, which propagates to its
    /// children.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.cancelled.load(Ordering::Acquire) {
                return;
            }

            match self.inner.deadline {
                Some(deadline) => {
                    tokio::select! {
                        () = &mut notified => {}
                        () = tokio::time::sleep_until(deadline) => {
                            self.cancel();
                            return;
                        }
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}
