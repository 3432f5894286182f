//! Cooperative cancellation shared across async tasks.
//!
//! A single [`ShutdownCoordinator`] is created per run and handed to every
//! component that suspends: the rate limiter queue, the credential refresh
//! lock, HTTP calls, retry delays and oracle processes. Ctrl+C flips it once
//! and every pending wait observes it.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Error returned when an operation was interrupted by a shutdown request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Coordinates graceful shutdown across async tasks.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    is_shutdown: AtomicBool,
    notify: Notify,
}

impl ShutdownCoordinator {
    /// Create a new coordinator.
    pub fn new() -> Self {
        Self {
            is_shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::new())
    }

    /// Request shutdown. Notifies all registered waiters exactly once.
    pub fn request_shutdown(&self) {
        if !self.is_shutdown.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested. Returns immediately if already set.
    pub async fn wait_for_shutdown(&self) {
        // Register interest before reading the flag so a request landing in
        // between is not lost.
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Drive `fut` to completion unless shutdown is requested first.
    ///
    /// The future is dropped as soon as shutdown fires, which releases any
    /// resources it holds (queue slots, locks, child processes).
    pub async fn guard<F>(&self, fut: F) -> Result<F::Output, Cancelled>
    where
        F: Future,
    {
        if self.is_shutdown_requested() {
            return Err(Cancelled);
        }

        tokio::select! {
            biased;
            () = self.wait_for_shutdown() => Err(Cancelled),
            output = fut => Ok(output),
        }
    }

    /// Fail fast with [`Cancelled`] if shutdown was already requested.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_shutdown_requested() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
