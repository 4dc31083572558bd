//! Backpressure for the outbound writer.
//!
//! Every frame queued for the writer holds one slot until the writer task has
//! flushed it to the transport. When all slots are taken, senders wait for
//! the writer to release some, up to a timeout, and then fail with
//! [`OcppError::BackpressureTimeout`]. A slow peer therefore slows down the
//! handlers and callers producing traffic for it instead of growing memory.
//!
//! Waiting is event driven: releasing slots wakes the waiters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::config::deadline_after;
use crate::error::{OcppError, Result};

/// Default maximum queued frames before backpressure kicks in.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Default time a sender waits for a free slot.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared slot counter for queued outbound frames.
///
/// Clones share state.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    pending: Arc<AtomicUsize>,
    released: Arc<Notify>,
    max_pending: usize,
    timeout: Duration,
}

impl BackpressureController {
    /// Create a controller with the default timeout.
    pub fn new(max_pending: usize) -> Self {
        Self::with_timeout(max_pending, DEFAULT_TIMEOUT)
    }

    /// Create a controller with a custom timeout.
    pub fn with_timeout(max_pending: usize, timeout: Duration) -> Self {
        Self {
            pending: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(Notify::new()),
            max_pending: max_pending.max(1),
            timeout,
        }
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current queued count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    #[inline]
    pub fn available_capacity(&self) -> usize {
        self.max_pending.saturating_sub(self.pending_count())
    }

    /// Take a slot without waiting.
    ///
    /// Returns `Err(BackpressureTimeout)` if at capacity.
    pub fn try_reserve(&self) -> Result<()> {
        let max = self.max_pending;
        self.pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| OcppError::BackpressureTimeout)
    }

    /// Take a slot, waiting up to the timeout for one to be released.
    pub async fn reserve(&self) -> Result<()> {
        if self.try_reserve().is_ok() {
            return Ok(());
        }

        let deadline = deadline_after(tokio::time::Instant::now(), self.timeout);
        loop {
            // Register interest before re-checking so a release in between is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_reserve().is_ok() {
                return Ok(());
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                tracing::warn!(
                    pending = self.pending_count(),
                    max = self.max_pending,
                    "outbound queue stayed full"
                );
                return Err(OcppError::BackpressureTimeout);
            }
        }
    }

    /// Release one slot.
    #[inline]
    pub fn release(&self) {
        self.release_many(1);
    }

    /// Release slots after a batch was flushed.
    pub fn release_many(&self, count: usize) {
        if count == 0 {
            return;
        }
        let _ = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                Some(n.saturating_sub(count))
            });
        self.released.notify_waiters();
    }
}

impl Default for BackpressureController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controller_creation() {
        let ctrl = BackpressureController::new(100);
        assert_eq!(ctrl.max_pending(), 100);
        assert_eq!(ctrl.pending_count(), 0);
        assert!(!ctrl.is_active());

        assert_eq!(BackpressureController::default().max_pending(), DEFAULT_MAX_PENDING);
    }

    #[test]
    fn test_try_reserve_at_capacity() {
        let ctrl = BackpressureController::new(5);

        for _ in 0..5 {
            ctrl.try_reserve().unwrap();
        }
        assert!(ctrl.is_active());
        assert_eq!(ctrl.available_capacity(), 0);

        let result = ctrl.try_reserve();
        assert!(matches!(result, Err(OcppError::BackpressureTimeout)));
        assert_eq!(ctrl.pending_count(), 5);
    }

    #[test]
    fn test_release_many_saturates() {
        let ctrl = BackpressureController::new(100);

        for _ in 0..50 {
            ctrl.try_reserve().unwrap();
        }
        ctrl.release_many(30);
        assert_eq!(ctrl.pending_count(), 20);

        ctrl.release_many(1000);
        assert_eq!(ctrl.pending_count(), 0);
    }

    #[test]
    fn test_clone_shares_state() {
        let ctrl1 = BackpressureController::new(10);
        let ctrl2 = ctrl1.clone();

        ctrl1.try_reserve().unwrap();
        assert_eq!(ctrl2.pending_count(), 1);

        ctrl2.release();
        assert_eq!(ctrl1.pending_count(), 0);
    }

    #[test]
    fn test_zero_limit_is_clamped() {
        let ctrl = BackpressureController::new(0);
        assert!(ctrl.try_reserve().is_ok());
        assert!(ctrl.try_reserve().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_timeout() {
        let ctrl = BackpressureController::with_timeout(1, Duration::from_millis(10));
        ctrl.try_reserve().unwrap();

        let start = tokio::time::Instant::now();
        let result = ctrl.reserve().await;

        assert!(matches!(result, Err(OcppError::BackpressureTimeout)));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_reserve_with_unbounded_timeout() {
        let ctrl = BackpressureController::with_timeout(1, Duration::MAX);
        ctrl.reserve().await.unwrap();

        let releaser = ctrl.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            releaser.release();
        });

        ctrl.reserve().await.unwrap();
        assert_eq!(ctrl.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_wakes_on_release() {
        let ctrl = BackpressureController::with_timeout(1, Duration::from_secs(1));
        ctrl.try_reserve().unwrap();

        let releaser = ctrl.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            releaser.release();
        });

        ctrl.reserve().await.unwrap();
        assert_eq!(ctrl.pending_count(), 1);
    }
}
