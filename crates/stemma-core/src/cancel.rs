//! Cooperative cancellation for long-running traversals.
//!
//! Request handlers run graph traversals on blocking threads. When the
//! client disconnects, the handler future is dropped but the blocking
//! thread keeps running; the traversal must notice and bail out on its
//! own. `CancelToken` is the signal: the handler holds a [`CancelGuard`]
//! whose `Drop` trips the token, and the traversal checks `is_cancelled`
//! once per node visit.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A shared cancellation flag checked cooperatively by traversals.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new, untripped token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the token has been tripped.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Trips the token. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns a guard that trips this token when dropped without being
    /// disarmed. Hold it in the request future; call [`CancelGuard::disarm`]
    /// after the traversal completes normally.
    #[must_use]
    pub fn guard(&self) -> CancelGuard {
        CancelGuard {
            token: self.clone(),
            armed: true,
        }
    }
}

/// Drop guard that cancels its token unless disarmed first.
#[derive(Debug)]
pub struct CancelGuard {
    token: CancelToken,
    armed: bool,
}

impl CancelGuard {
    /// Disarms the guard so dropping it no longer cancels the token.
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel();
        }
    }
}
