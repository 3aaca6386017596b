//! Blocking synchronization primitives.
//!
//! All primitives are built on the futex capability of the selected
//! [`platform`](crate::platform) backend, so the same code runs on OS threads
//! and on shared-memory WebAssembly workers. None of them own the data they
//! protect; callers associate data with a lock by convention or through the
//! RAII guards.
//!
//! Every blocking call may suspend the caller; none of them can be cancelled
//! except through the timeout parameters where offered.

pub mod barrier;
pub mod condvar;
pub mod mutex;
pub mod rwlock;
pub mod semaphore;

pub use barrier::Barrier;
pub use condvar::CondVar;
pub use mutex::{Mutex, MutexGuard};
pub use rwlock::{RwMutex, RwReadGuard, RwWriteGuard};
pub use semaphore::Semaphore;

/// Bounded spinning before a contended lock goes to sleep.
#[inline]
fn spin_while(mut keep_spinning: impl FnMut() -> bool) {
    let mut spins = 100;
    while spins > 0 && keep_spinning() {
        core::hint::spin_loop();
        spins -= 1;
    }
}
