//! Cancellation tokens shared between a caller and a running operation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
    /// Held while a request is being handed to the transport, and while cancelling
    enqueue_lock: Mutex<()>,
}

/// A token that can be triggered from any thread to cancel an operation.
///
/// Cloning gives another handle to the same token.
#[derive(Clone, Debug, Default)]
pub struct Cancellable {
    inner: Arc<Inner>,
}

impl Cancellable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers the token. Operations that already finished their network activity are not affected.
    pub fn cancel(&self) {
        let _guard = lock(&self.inner.enqueue_lock);
        if self.inner.cancelled.swap(true, Ordering::SeqCst) == false {
            log::debug!("Cancellation requested");
        }
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the token has been triggered
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Takes the lock that orders "about to enqueue" against "cancel".
    ///
    /// While the guard is alive, `cancel()` blocks, so checking [`Self::is_cancelled`] under the
    /// guard and then starting the request cannot miss a cancellation.
    pub(crate) fn enqueue_guard(&self) -> MutexGuard<'_, ()> {
        lock(&self.inner.enqueue_lock)
    }
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
