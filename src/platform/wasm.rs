//! WebAssembly worker backend.
//!
//! Runs on `wasm32` builds with the `atomics` target feature, where every
//! worker shares one linear memory. Waiting uses `memory.atomic.wait32` and
//! waking uses `memory.atomic.notify`. Threads are started by the host: the
//! module imports `env.mcr_thread_spawn(entry, arg)`, the host posts the pair
//! to an idle worker, and that worker calls the exported
//! [`mcr_thread_entry`] with `arg`.
//!
//! `memory.atomic.wait32` traps on the browser main thread, so blocking
//! primitives must only be used from workers.

use core::arch::wasm32;
use core::time::Duration;

use portable_atomic::AtomicU32;

use super::{Platform, StartFn};
use crate::error::{RuntimeError, RuntimeResult};
use crate::thread::ThreadOptions;

#[link(wasm_import_module = "env")]
extern "C" {
    /// Returns the host worker id, or a negative value when no worker is
    /// available.
    fn mcr_thread_spawn(entry: usize, arg: usize) -> i32;
    /// Host monotonic clock (`performance.now()` scaled to microseconds).
    fn mcr_now_micros() -> f64;
}

/// Worker entry point called by the host with the pointer it was given by
/// `mcr_thread_spawn`.
///
/// # Safety
///
/// `arg` must be a pointer produced by [`WasmWorkerPlatform::spawn`] and must
/// be passed here exactly once.
#[no_mangle]
pub unsafe extern "C" fn mcr_thread_entry(arg: usize) {
    let start = unsafe { Box::from_raw(arg as *mut StartFn) };
    start();
}

const WAIT_OK: i32 = 0;
const WAIT_NOT_EQUAL: i32 = 1;

/// Backend for shared-memory WebAssembly workers.
pub struct WasmWorkerPlatform;

/// Join token for a host worker.
///
/// Workers return to the host pool when the body finishes, so the token only
/// carries the id for diagnostics.
pub struct WorkerThread {
    worker_id: i32,
}

impl Platform for WasmWorkerPlatform {
    type ThreadToken = WorkerThread;

    #[inline]
    fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
        let timeout_ns = timeout.map_or(-1, |t| i64::try_from(t.as_nanos()).unwrap_or(i64::MAX));
        let rc = unsafe {
            wasm32::memory_atomic_wait32(word.as_ptr().cast::<i32>(), expected as i32, timeout_ns)
        };
        rc == WAIT_OK || rc == WAIT_NOT_EQUAL
    }

    #[inline]
    fn futex_wake_one(word: &AtomicU32) {
        unsafe {
            wasm32::memory_atomic_notify(word.as_ptr().cast::<i32>(), 1);
        }
    }

    #[inline]
    fn futex_wake_all(word: &AtomicU32) {
        unsafe {
            wasm32::memory_atomic_notify(word.as_ptr().cast::<i32>(), u32::MAX);
        }
    }

    fn spawn(start: StartFn, options: &ThreadOptions) -> RuntimeResult<WorkerThread> {
        let arg = Box::into_raw(Box::new(start));
        let entry = mcr_thread_entry as unsafe extern "C" fn(usize) as usize;
        let worker_id = unsafe { mcr_thread_spawn(entry, arg as usize) };

        if worker_id < 0 {
            // The host never saw the pointer, so it is still ours to free.
            drop(unsafe { Box::from_raw(arg) });
            tracing::error!(worker_id, name = ?options.name, "worker pool exhausted");
            return Err(RuntimeError::ResourceCreationFailed);
        }
        Ok(WorkerThread { worker_id })
    }

    // Workers have no native name; the name lives on the handle only.
    fn set_native_name(token: &WorkerThread, name: &str) {
        tracing::trace!(worker_id = token.worker_id, name, "worker renamed");
    }

    fn detach(token: WorkerThread) {
        tracing::trace!(worker_id = token.worker_id, "worker detached");
    }

    fn reap(token: WorkerThread) {
        tracing::trace!(worker_id = token.worker_id, "worker reaped");
    }

    fn now() -> Duration {
        let micros = unsafe { mcr_now_micros() };
        Duration::from_micros(micros.max(0.0) as u64)
    }
}
