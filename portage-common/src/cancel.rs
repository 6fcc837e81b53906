//! Cooperative cancellation token
//!
//! A single [`CancelToken`] is threaded through enumeration, queueing, and
//! every transport invocation. Workers check the flag between units of work
//! (not mid-chunk unless the transport supports partial cancellation) and
//! async waiters park on a [`Notify`] so cancellation wakes them without
//! polling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Cloneable cancellation handle
///
/// All clones observe the same underlying flag. `cancel()` is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Create a fresh, untripped token
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token and wake all waiters
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// True once the token has been tripped
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until the token is tripped
    ///
    /// Returns immediately if the token is already cancelled. Intended for
    /// use inside `tokio::select!` alongside the unit of work.
    pub async fn cancelled(&self) {
        // Create the Notified future before the flag check so a cancel
        // between the check and the await is not missed.
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
