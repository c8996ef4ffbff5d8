use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::SearchError;

/// Cooperative cancellation signal shared by a pipeline's producer and
/// workers.
///
/// The token is polled at defined suspension points (before an archive is
/// opened, on each queue pull, periodically inside the markup tokenizer);
/// in-flight work is never interrupted. Clones are cheap and all observe
/// the same signal.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that only trips when [`cancel`](Self::cancel) is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that additionally trips once `deadline` has passed.
    pub fn with_deadline(deadline: Instant) -> Self {
        CancelToken {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
            }),
        }
    }

    /// Like [`with_deadline`](Self::with_deadline), relative to now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed) || self.deadline_passed()
    }

    /// Poll point: `Ok` while the token is live, otherwise the matching
    /// cancellation error. An expired deadline reports `DeadlineExceeded`
    /// even if `cancel` was also called, since the deadline fired first.
    pub fn check(&self) -> Result<(), SearchError> {
        if self.deadline_passed() {
            return Err(SearchError::DeadlineExceeded);
        }
        if self.inner.cancelled.load(Ordering::Relaxed) {
            return Err(SearchError::Cancelled);
        }
        Ok(())
    }

    fn deadline_passed(&self) -> bool {
        self.inner.deadline.is_some_and(|d| Instant::now() >= d)
    }
}
