use crate::sync::{Condvar, Mutex, lock};
use std::{
    sync::PoisonError,
    time::{Duration, Instant},
};

/// Counting semaphore built from a mutex-guarded counter and a condition
/// variable.
///
/// Used both as the work-availability signal of a ready queue and as the
/// completion gate the scheduler loop blocks on. The count never goes
/// negative: every successful [`wait`](Self::wait),
/// [`wait_for`](Self::wait_for) or [`try_take`](Self::try_take) consumes
/// exactly one earlier [`notify`](Self::notify).
#[derive(Debug, Default)]
pub struct Semaphore {
    count: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Create a semaphore with a zero count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count and wake one waiter.
    pub fn notify(&self) {
        let mut count = lock(&self.count);
        *count += 1;
        self.available.notify_one();
    }

    /// Block until the count is positive, then decrement it.
    pub fn wait(&self) {
        let mut count = lock(&self.count);
        while *count == 0 {
            count = self
                .available
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *count -= 1;
    }

    /// Like [`wait`](Self::wait), but gives up once `timeout` has elapsed.
    ///
    /// Returns `true` if a signal was consumed. The deadline is taken from a
    /// monotonic clock and the predicate is re-checked after every wakeup, so
    /// spurious wakeups neither decrement the count nor extend the wait. A
    /// timeout too large for the clock waits without a deadline.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut count = lock(&self.count);
        while *count == 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .available
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            count = guard;
        }
        *count -= 1;
        true
    }

    /// Decrement the count if it is positive, without blocking.
    pub fn try_take(&self) -> bool {
        let mut count = lock(&self.count);
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// Force the count back to zero.
    pub fn reset(&self) {
        *lock(&self.count) = 0;
    }

    /// Current count. Only a snapshot; it may change right after returning.
    #[must_use]
    pub fn available(&self) -> usize {
        *lock(&self.count)
    }
}
