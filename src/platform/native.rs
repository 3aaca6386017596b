//! Native backend: OS threads through `std::thread`, futex waits through the
//! `futex(2)` syscall on Linux and a polling loop elsewhere.

use core::time::Duration;
use std::thread::{Builder, JoinHandle};
use std::time::Instant;

use portable_atomic::AtomicU32;

use super::{Platform, StartFn};
use crate::error::{RuntimeError, RuntimeResult};
use crate::thread::ThreadOptions;

/// Backend for native multi-core targets.
pub struct NativePlatform;

/// Join token for an OS thread.
pub struct NativeThread {
    handle: JoinHandle<()>,
}

impl Platform for NativePlatform {
    type ThreadToken = NativeThread;

    #[inline]
    fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
        futex::wait(word, expected, timeout)
    }

    #[inline]
    fn futex_wake_one(word: &AtomicU32) {
        futex::wake(word, 1);
    }

    #[inline]
    fn futex_wake_all(word: &AtomicU32) {
        futex::wake(word, i32::MAX);
    }

    fn spawn(start: StartFn, options: &ThreadOptions) -> RuntimeResult<NativeThread> {
        let mut builder = Builder::new();
        if let Some(name) = &options.name {
            builder = builder.name(name.clone());
        }
        if let Some(size) = options.stack_size {
            builder = builder.stack_size(size);
        }

        builder
            .spawn(start)
            .map(|handle| NativeThread { handle })
            .map_err(|err| {
                tracing::error!(error = %err, name = ?options.name, "failed to spawn native thread");
                RuntimeError::ResourceCreationFailed
            })
    }

    fn set_native_name(token: &NativeThread, name: &str) {
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::thread::JoinHandleExt;

            // The kernel limit is 16 bytes including the terminator.
            let mut bytes: Vec<u8> = name.bytes().filter(|b| *b != 0).take(15).collect();
            bytes.push(0);
            let rc = unsafe {
                libc::pthread_setname_np(token.handle.as_pthread_t(), bytes.as_ptr().cast())
            };
            if rc != 0 {
                tracing::debug!(rc, name, "pthread_setname_np failed");
            }
        }

        #[cfg(not(target_os = "linux"))]
        let _ = (token, name);
    }

    fn detach(token: NativeThread) {
        drop(token.handle);
    }

    fn reap(token: NativeThread) {
        // Thread bodies catch their own panics, so this only fails if the
        // wrapper itself unwound.
        if token.handle.join().is_err() {
            tracing::warn!("native thread wrapper unwound during reap");
        }
    }

    fn now() -> Duration {
        static EPOCH: spin::Once<Instant> = spin::Once::new();
        EPOCH.call_once(Instant::now).elapsed()
    }
}

#[cfg(all(target_os = "linux", not(feature = "polling-futex")))]
mod futex {
    use core::ptr;
    use core::time::Duration;

    use portable_atomic::AtomicU32;

    pub(super) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
        let ts = timeout.map(|t| libc::timespec {
            tv_sec: t.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: t.subsec_nanos() as _,
        });
        let ts_ptr = ts
            .as_ref()
            .map_or(ptr::null(), |ts| ts as *const libc::timespec);

        let rc = unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                expected,
                ts_ptr,
            )
        };

        if rc == -1 {
            // EAGAIN (value already changed) and EINTR count as wakeups.
            std::io::Error::last_os_error().raw_os_error() != Some(libc::ETIMEDOUT)
        } else {
            true
        }
    }

    pub(super) fn wake(word: &AtomicU32, count: i32) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                word.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                count,
            );
        }
    }
}

#[cfg(any(not(target_os = "linux"), feature = "polling-futex"))]
mod futex {
    use core::time::Duration;
    use std::time::Instant;

    use portable_atomic::{AtomicU32, Ordering};

    const SPINS_BEFORE_YIELD: u32 = 64;

    pub(super) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut spins = 0u32;

        while word.load(Ordering::Acquire) == expected {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return false;
                }
            }
            if spins < SPINS_BEFORE_YIELD {
                core::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
        true
    }

    // Waiters poll the word, so there is nobody to notify.
    pub(super) fn wake(_word: &AtomicU32, _count: i32) {}
}
