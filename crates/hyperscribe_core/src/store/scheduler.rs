//! Single-slot "pending write" scheduler backing `save()` debouncing.
//!
//! Each `arm()` hands out a ticket and invalidates every earlier one, so
//! only the most recent arming may persist once its delay elapses
//! (trailing-edge debounce). `cancel()` invalidates without re-arming.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug)]
pub(crate) struct WriteScheduler {
    delay: Duration,
    generation: AtomicU64,
    pending: AtomicBool,
}

impl WriteScheduler {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            generation: AtomicU64::new(0),
            pending: AtomicBool::new(false),
        }
    }

    pub(crate) fn delay(&self) -> Duration {
        self.delay
    }

    /// Start (or restart) the debounce window and return its ticket.
    pub(crate) fn arm(&self) -> u64 {
        self.pending.store(true, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Claim the slot for `ticket`; `false` when a later arm or a cancel
    /// superseded it.
    pub(crate) fn fire(&self, ticket: u64) -> bool {
        if self.generation.load(Ordering::SeqCst) != ticket {
            return false;
        }
        self.pending.store(false, Ordering::SeqCst);
        true
    }

    /// Drop any armed write.
    pub(crate) fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::WriteScheduler;
    use std::time::Duration;

    #[test]
    fn only_latest_ticket_fires() {
        let scheduler = WriteScheduler::new(Duration::from_millis(200));
        let first = scheduler.arm();
        let second = scheduler.arm();
        assert!(scheduler.is_pending());
        assert!(!scheduler.fire(first));
        assert!(scheduler.is_pending());
        assert!(scheduler.fire(second));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn cancel_invalidates_armed_ticket() {
        let scheduler = WriteScheduler::new(Duration::from_millis(200));
        let ticket = scheduler.arm();
        scheduler.cancel();
        assert!(!scheduler.is_pending());
        assert!(!scheduler.fire(ticket));
    }
}
