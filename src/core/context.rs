use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Why a [`CallContext`] is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Cancelled,
    DeadlineExceeded,
}

/// Cooperative cancellation handle for long-running scans.
///
/// Clones share the same cancellation flag, so a caller can hand one clone to
/// the scan and keep another to cancel it from a different thread.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn err(&self) -> Option<ContextError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_live() {
        assert_eq!(CallContext::new().err(), None);
        assert_eq!(CallContext::with_timeout(Duration::from_secs(60)).err(), None);
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let ctx = CallContext::new();
        let observer = ctx.clone();
        ctx.cancel();
        assert_eq!(observer.err(), Some(ContextError::Cancelled));
    }

    #[test]
    fn past_deadline_reports_exceeded() {
        let ctx = CallContext::with_deadline(Instant::now() - Duration::from_millis(1));
        assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
    }
}
