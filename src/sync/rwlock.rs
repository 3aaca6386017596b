//! Reader/writer lock.
//!
//! The lock word is `0` when free, [`WRITE_LOCKED`] while a writer holds it,
//! and otherwise the number of active readers. At no instant are readers and
//! a writer active together, and there is never more than one writer.
//!
//! Fairness: readers are admitted whenever no writer holds the lock, so a
//! continuous stream of readers can starve a waiting writer. Waiters are not
//! ordered FIFO.

use core::marker::PhantomData;

use portable_atomic::{AtomicU32, Ordering};

use crate::invariant;
use crate::platform;

const WRITE_LOCKED: u32 = u32::MAX;
const MAX_READERS: u32 = u32::MAX - 1;

/// N concurrent readers or exactly one writer. No upgrade or downgrade.
pub struct RwMutex {
    state: AtomicU32,
}

impl RwMutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(0),
        }
    }

    /// Acquire shared access.
    pub fn lock_read(&self) {
        loop {
            let state = self.state.load(Ordering::Relaxed);
            if state < MAX_READERS {
                if self
                    .state
                    .compare_exchange_weak(state, state + 1, Ordering::Acquire, Ordering::Relaxed)
                    .is_ok()
                {
                    return;
                }
                continue;
            }
            if state == WRITE_LOCKED {
                platform::wait(&self.state, WRITE_LOCKED, None);
            } else {
                core::hint::spin_loop();
            }
        }
    }

    /// Acquire shared access only if no writer holds the lock right now.
    pub fn try_lock_read(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);
        while state < MAX_READERS {
            match self.state.compare_exchange_weak(
                state,
                state + 1,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => state = current,
            }
        }
        false
    }

    /// Release shared access.
    pub fn unlock_read(&self) {
        let previous = self.state.fetch_sub(1, Ordering::Release);
        invariant!(
            previous != 0 && previous != WRITE_LOCKED,
            "RwMutex::unlock_read without a matching lock_read (state {:#x})",
            previous
        );
        if previous == 1 {
            // Last reader out: writers may be sleeping on a reader count.
            platform::wake_all(&self.state);
        }
    }

    /// Acquire exclusive access.
    pub fn lock_write(&self) {
        loop {
            match self
                .state
                .compare_exchange(0, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(mut state) => {
                    super::spin_while(|| {
                        state = self.state.load(Ordering::Relaxed);
                        state != 0
                    });
                    if state != 0 {
                        platform::wait(&self.state, state, None);
                    }
                }
            }
        }
    }

    /// Acquire exclusive access only if the lock is free right now.
    pub fn try_lock_write(&self) -> bool {
        self.state
            .compare_exchange(0, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Release exclusive access.
    pub fn unlock_write(&self) {
        let previous = self.state.swap(0, Ordering::Release);
        invariant!(
            previous == WRITE_LOCKED,
            "RwMutex::unlock_write while not write-locked (state {:#x})",
            previous
        );
        platform::wake_all(&self.state);
    }

    /// Shared access released when the guard drops.
    pub fn read(&self) -> RwReadGuard<'_> {
        self.lock_read();
        RwReadGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Exclusive access released when the guard drops.
    pub fn write(&self) -> RwWriteGuard<'_> {
        self.lock_write();
        RwWriteGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Snapshot of the number of active readers.
    pub fn reader_count(&self) -> u32 {
        match self.state.load(Ordering::Relaxed) {
            WRITE_LOCKED => 0,
            readers => readers,
        }
    }

    /// Snapshot of whether a writer holds the lock.
    pub fn is_write_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) == WRITE_LOCKED
    }
}

impl Default for RwMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RwMutex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RwMutex")
            .field("readers", &self.reader_count())
            .field("write_locked", &self.is_write_locked())
            .finish()
    }
}

/// Shared guard for [`RwMutex`]. Stays on the thread that locked.
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<multicore_rt::RwReadGuard<'static>>();
/// ```
pub struct RwReadGuard<'a> {
    lock: &'a RwMutex,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RwReadGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

/// Exclusive guard for [`RwMutex`]. Stays on the thread that locked.
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<multicore_rt::RwWriteGuard<'static>>();
/// ```
pub struct RwWriteGuard<'a> {
    lock: &'a RwMutex,
    _not_send: PhantomData<*const ()>,
}

impl Drop for RwWriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}
