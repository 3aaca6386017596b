//! Condition variable paired with a [`Mutex`].

use core::time::Duration;

use portable_atomic::{AtomicU32, Ordering};

use super::mutex::{Mutex, MutexGuard};
use crate::platform;

/// Wait/signal/broadcast on top of a sequence word.
///
/// Spurious wakeups are permitted: always re-check the awaited predicate in a
/// loop around [`CondVar::wait`].
pub struct CondVar {
    seq: AtomicU32,
}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
        }
    }

    /// Atomically release `mutex` and sleep until signalled or until
    /// `timeout` elapses (`None` waits forever). `mutex` is re-acquired
    /// before returning in both cases.
    ///
    /// The caller must hold `mutex`. Returns `false` only on timeout.
    pub fn wait(&self, mutex: &Mutex, timeout: Option<Duration>) -> bool {
        // Sample before unlocking: a signal sent after the unlock bumps the
        // sequence and the futex wait below returns immediately.
        let seq = self.seq.load(Ordering::Relaxed);
        mutex.unlock();
        let woken = platform::wait(&self.seq, seq, timeout);
        mutex.lock();
        woken
    }

    /// [`CondVar::wait`] for a caller holding a [`MutexGuard`].
    pub fn wait_guard(&self, guard: &MutexGuard<'_>, timeout: Option<Duration>) -> bool {
        self.wait(guard.mutex(), timeout)
    }

    /// Wake at least one waiter, if any.
    pub fn signal(&self) {
        self.seq.fetch_add(1, Ordering::Relaxed);
        platform::wake_one(&self.seq);
    }

    /// Wake every current waiter. They re-acquire the mutex one at a time.
    pub fn broadcast(&self) {
        self.seq.fetch_add(1, Ordering::Relaxed);
        platform::wake_all(&self.seq);
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for CondVar {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CondVar").finish_non_exhaustive()
    }
}
