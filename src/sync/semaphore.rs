//! Counting semaphore.

use core::time::Duration;

use portable_atomic::{AtomicU32, Ordering};

use crate::error::{RuntimeError, RuntimeResult};
use crate::platform::{self, Deadline};

/// Non-negative counter; `acquire` blocks while it is zero.
///
/// At any instant the number of completed `acquire` calls without a matching
/// `release` never exceeds the initial count plus the number of completed
/// `release` calls.
pub struct Semaphore {
    count: AtomicU32,
}

impl Semaphore {
    pub const fn new(initial_count: u32) -> Self {
        Self {
            count: AtomicU32::new(initial_count),
        }
    }

    /// Decrement the count, blocking while it is zero.
    pub fn acquire(&self) {
        while !self.try_acquire() {
            platform::wait(&self.count, 0, None);
        }
    }

    /// Decrement the count if it is positive right now.
    pub fn try_acquire(&self) -> bool {
        let mut count = self.count.load(Ordering::Relaxed);
        while count > 0 {
            match self.count.compare_exchange_weak(
                count,
                count - 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => count = current,
            }
        }
        false
    }

    /// [`Semaphore::acquire`] bounded by `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> RuntimeResult<()> {
        let deadline = Deadline::after(Some(timeout));
        loop {
            if self.try_acquire() {
                return Ok(());
            }
            match deadline.next_timeout() {
                Some(wait_for) => {
                    platform::wait(&self.count, 0, wait_for);
                }
                None => return Err(RuntimeError::TimeoutExpired),
            }
        }
    }

    /// Increment the count, releasing one blocked `acquire` if any.
    pub fn release(&self) {
        self.count.fetch_add(1, Ordering::Release);
        platform::wake_one(&self.count);
    }

    /// Snapshot of the current count.
    pub fn available(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }
}

impl core::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Semaphore")
            .field("available", &self.available())
            .finish()
    }
}
