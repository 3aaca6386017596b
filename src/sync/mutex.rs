//! Non-reentrant mutual exclusion lock.

use core::marker::PhantomData;

use portable_atomic::{AtomicU32, Ordering};

use crate::invariant;
use crate::platform;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;
/// Locked, and at least one thread may be sleeping on the word.
const CONTENDED: u32 = 2;

/// Futex-based mutex.
///
/// `lock` blocks while another thread holds the lock. Locking a mutex the
/// calling thread already holds, or unlocking a mutex the caller does not
/// hold, is a usage error: a fatal assertion in debug builds, a deadlock or a
/// broken critical section in release builds.
///
/// Every write made by the holder before `unlock` is visible to the next
/// thread whose `lock` returns.
pub struct Mutex {
    state: AtomicU32,
    #[cfg(debug_assertions)]
    owner: portable_atomic::AtomicU64,
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(UNLOCKED),
            #[cfg(debug_assertions)]
            owner: portable_atomic::AtomicU64::new(0),
        }
    }

    /// Acquire the lock, blocking while it is held elsewhere.
    #[inline]
    pub fn lock(&self) {
        self.check_not_held();
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            self.lock_contended();
        }
        self.set_owner();
    }

    /// Acquire the lock only if it is free right now.
    #[inline]
    pub fn try_lock(&self) -> bool {
        let acquired = self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if acquired {
            self.set_owner();
        }
        acquired
    }

    /// Release the lock. Must only be called by the current holder.
    #[inline]
    pub fn unlock(&self) {
        self.check_held();
        self.clear_owner();
        if self.state.swap(UNLOCKED, Ordering::Release) == CONTENDED {
            platform::wake_one(&self.state);
        }
    }

    /// Acquire the lock and release it when the guard is dropped.
    pub fn guard(&self) -> MutexGuard<'_> {
        self.lock();
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    /// Snapshot of whether any thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != UNLOCKED
    }

    #[cold]
    fn lock_contended(&self) {
        let mut state = self.spin();

        if state == UNLOCKED {
            match self
                .state
                .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(s) => state = s,
            }
        }

        loop {
            // Mark the lock contended so the holder knows to wake us. If it
            // was free in the meantime we now own it.
            if state != CONTENDED && self.state.swap(CONTENDED, Ordering::Acquire) == UNLOCKED {
                return;
            }
            platform::wait(&self.state, CONTENDED, None);
            state = self.spin();
        }
    }

    fn spin(&self) -> u32 {
        let mut state = self.state.load(Ordering::Relaxed);
        super::spin_while(|| {
            state = self.state.load(Ordering::Relaxed);
            state == LOCKED
        });
        state
    }

    #[cfg(debug_assertions)]
    fn check_not_held(&self) {
        let me = crate::thread::current_id().get();
        invariant!(
            self.owner.load(Ordering::Relaxed) != me,
            "Mutex::lock called by thread {} which already holds it",
            me
        );
    }

    #[cfg(debug_assertions)]
    fn check_held(&self) {
        let me = crate::thread::current_id().get();
        invariant!(
            self.owner.load(Ordering::Relaxed) == me,
            "Mutex::unlock called by thread {} which does not hold it",
            me
        );
    }

    #[cfg(debug_assertions)]
    fn set_owner(&self) {
        self.owner
            .store(crate::thread::current_id().get(), Ordering::Relaxed);
    }

    #[cfg(debug_assertions)]
    fn clear_owner(&self) {
        self.owner.store(0, Ordering::Relaxed);
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn check_not_held(&self) {}

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn check_held(&self) {}

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn set_owner(&self) {}

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    fn clear_owner(&self) {}
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Mutex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mutex")
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// RAII guard for [`Mutex`].
///
/// Unlocking belongs to the locking thread, so the guard cannot move:
///
/// ```compile_fail
/// fn assert_send<T: Send>() {}
/// assert_send::<multicore_rt::MutexGuard<'static>>();
/// ```
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    _not_send: PhantomData<*const ()>,
}

impl<'a> MutexGuard<'a> {
    /// The locked mutex, for use with [`CondVar::wait`](super::CondVar::wait).
    pub fn mutex(&self) -> &'a Mutex {
        self.mutex
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
