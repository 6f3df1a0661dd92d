//! Per-call abort capability
//!
//! The caller signals abort through the handle; the in-flight call races its
//! transport future against the signal. Once the call completes the handle
//! is disarmed, after which `abort()` does nothing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct AbortState {
    requested: AtomicBool,
    disarmed: AtomicBool,
    notify: Notify,
}

/// Abort capability for a single in-flight send.
///
/// Each `send` gets its own handle, so aborting one call can never reach
/// another. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    state: Arc<AbortState>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the call be aborted.
    ///
    /// Returns `false` when the call has already completed (the handle was
    /// disarmed); never panics.
    pub fn abort(&self) -> bool {
        if self.is_disarmed() {
            return false;
        }
        self.state.requested.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
        true
    }

    pub fn is_abort_requested(&self) -> bool {
        self.state.requested.load(Ordering::SeqCst)
    }

    /// True once the owning call has completed.
    pub fn is_disarmed(&self) -> bool {
        self.state.disarmed.load(Ordering::SeqCst)
    }

    /// Neutralize the handle. Idempotent.
    pub(crate) fn disarm(&self) {
        self.state.disarmed.store(true, Ordering::SeqCst);
    }

    /// Resolves once an abort has been requested.
    pub(crate) async fn requested(&self) {
        loop {
            // Register before checking the flag so a concurrent notify is not lost.
            let notified = self.state.notify.notified();
            if self.is_abort_requested() {
                return;
            }
            notified.await;
        }
    }
}
