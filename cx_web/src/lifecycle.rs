//! ABOUTME: In-flight request tracking and graceful drain coordination
//! ABOUTME: RAII guards, idempotent shutdown flag, event-driven drain waiting

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Outcome of waiting for in-flight requests to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// All in-flight requests completed before the deadline
    Drained,
    /// The deadline elapsed with requests still in flight
    TimedOut,
}

/// Tracks in-flight requests and coordinates graceful drain.
///
/// Shared via `Arc` between the gateway middleware and the shutdown path.
/// The counter is the single source of truth: it equals requests started
/// minus requests finished at every instant and never goes negative, because
/// decrements happen only in [`RequestGuard::drop`] and each guard drops
/// exactly once.
#[derive(Debug, Default)]
pub struct RequestTracker {
    active: AtomicUsize,
    shutting_down: AtomicBool,
    drained: Notify,
}

impl RequestTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an in-flight request. The returned guard decrements the
    /// counter when dropped, whether the request succeeds, fails, or the
    /// client disconnects (the handler future is dropped either way).
    pub fn track(self: &Arc<Self>) -> RequestGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        RequestGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Number of requests currently in flight
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Flip the shutdown flag. Returns true on the first call; the flag
    /// never reverts, so repeated signals run the shutdown sequence once.
    pub fn begin_shutdown(&self) -> bool {
        let first = !self.shutting_down.swap(true, Ordering::SeqCst);
        if first {
            info!(
                active_requests = self.active_count(),
                "Shutdown initiated, rejecting new requests"
            );
        } else {
            debug!("Shutdown already in progress, ignoring repeat signal");
        }
        first
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Wait until the active counter reaches zero or the timeout elapses.
    ///
    /// Never returns an error; a timeout is an expected outcome of a
    /// degraded shutdown. Each call owns its own future, so a decrement
    /// arriving after the deadline cannot double-resolve anything.
    pub async fn wait_for_drain(&self, timeout: Duration) -> DrainOutcome {
        if self.active_count() == 0 {
            debug!("No requests in flight, drain complete immediately");
            return DrainOutcome::Drained;
        }

        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before re-checking the counter; the final
            // decrement may land between the check and the await otherwise.
            let notified = self.drained.notified();

            if self.active_count() == 0 {
                return DrainOutcome::Drained;
            }

            match tokio::time::timeout_at(deadline, notified).await {
                Ok(()) => {
                    // Woken; loop re-checks since Notify can wake spuriously
                    // relative to the counter.
                    if self.active_count() == 0 {
                        return DrainOutcome::Drained;
                    }
                }
                Err(_) => {
                    warn!(
                        active_requests = self.active_count(),
                        timeout_secs = timeout.as_secs(),
                        "Drain timed out with requests still in flight"
                    );
                    return DrainOutcome::TimedOut;
                }
            }
        }
    }

    fn finish_one(&self) {
        let previous = self.active.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "request counter underflow");
        if previous == 1 {
            // Last request out wakes every drain waiter
            self.drained.notify_waiters();
        }
    }
}

/// RAII guard for one in-flight request. Decrements the counter exactly once
/// on drop.
#[derive(Debug)]
pub struct RequestGuard {
    tracker: Arc<RequestTracker>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.tracker.finish_one();
    }
}
