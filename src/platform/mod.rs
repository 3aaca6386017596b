//! Platform backend abstraction.
//!
//! Every primitive in this crate is built on two capabilities: a futex-style
//! "sleep while this word equals X" / "wake sleepers on this word" pair, and a
//! way to start a unit of execution. Each backend implements the [`Platform`]
//! trait and exactly one of them is selected at compile time as
//! [`DefaultPlatform`], so lock fast paths never go through dynamic dispatch.

use core::time::Duration;

use portable_atomic::AtomicU32;

use crate::error::RuntimeResult;
use crate::thread::ThreadOptions;

/// Boxed thread body handed to a backend.
pub type StartFn = Box<dyn FnOnce() + Send + 'static>;

/// Backend capability trait.
///
/// # Safety contract for implementors
///
/// `futex_wait` must compare `word` against `expected` atomically with going
/// to sleep: a `futex_wake_*` issued after the comparison must not be lost.
pub trait Platform {
    /// Backend-specific join token for a launched thread.
    type ThreadToken: Send + 'static;

    /// Sleep while `*word == expected`.
    ///
    /// Returns `false` only if `timeout` elapsed. A `true` return does not
    /// imply the value changed; callers re-check in a loop.
    fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool;

    /// Wake at most one thread sleeping on `word`.
    fn futex_wake_one(word: &AtomicU32);

    /// Wake every thread sleeping on `word`.
    fn futex_wake_all(word: &AtomicU32);

    /// Start `start` on a new unit of execution.
    fn spawn(start: StartFn, options: &ThreadOptions) -> RuntimeResult<Self::ThreadToken>;

    /// Best-effort native name for debuggers and profilers.
    fn set_native_name(token: &Self::ThreadToken, name: &str);

    /// Give up the obligation to reclaim the thread.
    fn detach(token: Self::ThreadToken);

    /// Reclaim a thread that has already been observed to finish.
    fn reap(token: Self::ThreadToken);

    /// Monotonic time since an arbitrary, fixed epoch.
    fn now() -> Duration;
}

#[cfg(not(all(target_arch = "wasm32", target_feature = "atomics")))]
pub mod native;

#[cfg(all(target_arch = "wasm32", target_feature = "atomics"))]
pub mod wasm;

#[cfg(not(all(target_arch = "wasm32", target_feature = "atomics")))]
pub use native::NativePlatform as DefaultPlatform;

#[cfg(all(target_arch = "wasm32", target_feature = "atomics"))]
pub use wasm::WasmWorkerPlatform as DefaultPlatform;

/// Join token type of the selected backend.
pub type ThreadToken = <DefaultPlatform as Platform>::ThreadToken;

#[inline]
pub(crate) fn wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    DefaultPlatform::futex_wait(word, expected, timeout)
}

#[inline]
pub(crate) fn wake_one(word: &AtomicU32) {
    DefaultPlatform::futex_wake_one(word)
}

#[inline]
pub(crate) fn wake_all(word: &AtomicU32) {
    DefaultPlatform::futex_wake_all(word)
}

/// Monotonic clock of the selected backend.
pub fn now() -> Duration {
    DefaultPlatform::now()
}

/// Converts the microsecond timeout form (`0` = forever) into the
/// `Option<Duration>` accepted by blocking calls.
pub fn timeout_from_micros(timeout_us: u64) -> Option<Duration> {
    if timeout_us == 0 {
        None
    } else {
        Some(Duration::from_micros(timeout_us))
    }
}

/// Time left before a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Remaining {
    Forever,
    Left(Duration),
    Expired,
}

/// Absolute deadline computed from a relative timeout.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Duration>,
}

impl Deadline {
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        // An unrepresentable deadline is as good as no deadline.
        let at = timeout.and_then(|t| now().checked_add(t));
        Self { at }
    }

    pub(crate) fn remaining(&self) -> Remaining {
        match self.at {
            None => Remaining::Forever,
            Some(at) => match at.checked_sub(now()) {
                Some(left) if !left.is_zero() => Remaining::Left(left),
                _ => Remaining::Expired,
            },
        }
    }

    /// Timeout argument for the next futex sleep, or `None` once expired.
    pub(crate) fn next_timeout(&self) -> Option<Option<Duration>> {
        match self.remaining() {
            Remaining::Forever => Some(None),
            Remaining::Left(left) => Some(Some(left)),
            Remaining::Expired => None,
        }
    }
}
