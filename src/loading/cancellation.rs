//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is a shared flag plus a callback registry.
//! Cancelling is advisory: it wakes anything awaiting
//! [`CancellationToken::cancelled`] and runs registered callbacks, but the
//! running operation decides when to stop. In-flight I/O is not interrupted.

use crate::internals::lock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

type CancelCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct TokenInner {
    cancelled: AtomicBool,
    notify: Notify,
    callbacks: Mutex<Vec<CancelCallback>>,
}

/// Cheaply cloneable handle; all clones observe the same cancellation.
#[derive(Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent; callbacks run once, on the first call.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.notify.notify_waiters();

        let callbacks = std::mem::take(&mut *lock(&self.inner.callbacks));
        for callback in callbacks {
            callback();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel is not missed.
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Run `callback` on cancellation; immediately if already cancelled.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut callbacks = lock(&self.inner.callbacks);
            if !self.is_cancelled() {
                callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }
}
