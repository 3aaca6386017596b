//! Thread lifecycle: launch, join, detach and naming.
//!
//! A [`Thread`] owns the join token of one launched unit of execution. It is
//! consumed by exactly one of [`Thread::join`] (when that returns
//! [`JoinOutcome::Finished`]) or [`Thread::detach`], so joining twice or
//! joining after a detach cannot be expressed. A handle that is dropped
//! without either is detached with a warning.

use core::cell::Cell;
use core::num::NonZeroU64;
use core::time::Duration;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use portable_atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::RuntimeResult;
use crate::platform::{self, Deadline, DefaultPlatform, Platform, StartFn, ThreadToken};

/// Process-unique thread identifier. Never reused, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_ID: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

impl ThreadId {
    fn next() -> Self {
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(id).unwrap_or(NonZeroU64::MIN))
    }

    /// Get the raw ID value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

/// Identifier of the calling thread, assigned on first use.
///
/// Inside a launched thread this equals the launching handle's
/// [`Thread::id`].
pub fn current_id() -> ThreadId {
    CURRENT_ID.with(|current| match current.get() {
        Some(id) => id,
        None => {
            let id = ThreadId::next();
            current.set(Some(id));
            id
        }
    })
}

/// Number of hardware threads available to this process, `1` when unknown.
pub fn processor_count() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

/// Execution state of a launched thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadState {
    /// Entry function has not returned yet.
    Running = 0,
    /// Entry function returned normally.
    Finished = 1,
    /// Entry function panicked; the panic was contained.
    Panicked = 2,
}

impl ThreadState {
    fn from_raw(raw: u32) -> Self {
        match raw {
            0 => ThreadState::Running,
            1 => ThreadState::Finished,
            _ => ThreadState::Panicked,
        }
    }
}

/// Launch parameters understood by every backend.
#[derive(Debug, Clone, Default)]
pub struct ThreadOptions {
    /// Initial name, applied before the thread starts where supported.
    pub name: Option<String>,
    /// Requested stack size in bytes. Ignored by the worker backend.
    pub stack_size: Option<usize>,
}

/// Data shared between a handle and the running thread.
struct ThreadInner {
    id: ThreadId,
    /// Futex word holding a `ThreadState`.
    state: AtomicU32,
    name: spin::Mutex<Option<String>>,
}

impl ThreadInner {
    fn state(&self) -> ThreadState {
        ThreadState::from_raw(self.state.load(Ordering::Acquire))
    }

    fn finish(&self, state: ThreadState) {
        self.state.store(state as u32, Ordering::Release);
        platform::wake_all(&self.state);
    }
}

/// Result of [`Thread::join`].
#[must_use]
pub enum JoinOutcome {
    /// The thread terminated and its resources were reclaimed.
    Finished,
    /// The timeout elapsed first. The thread keeps running and the handle is
    /// handed back for a later join or detach.
    TimedOut(Thread),
}

impl JoinOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self, JoinOutcome::Finished)
    }
}

/// Handle to a launched thread.
pub struct Thread {
    inner: Arc<ThreadInner>,
    token: Option<ThreadToken>,
}

impl Thread {
    /// Get the thread's unique identifier.
    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    /// Last name assigned through the builder or [`Thread::set_name`].
    pub fn name(&self) -> Option<String> {
        self.inner.name.lock().clone()
    }

    pub fn state(&self) -> ThreadState {
        self.inner.state()
    }

    /// `true` once the entry function has returned or panicked.
    pub fn is_finished(&self) -> bool {
        self.state() != ThreadState::Running
    }

    /// Best-effort rename. Only a diagnostic aid: the native name is applied
    /// where the backend supports it and the name is always recorded on the
    /// handle.
    pub fn set_name(&self, name: &str) {
        *self.inner.name.lock() = Some(name.to_owned());
        if let Some(token) = &self.token {
            DefaultPlatform::set_native_name(token, name);
        }
    }

    /// Block until the thread terminates or `timeout` elapses (`None` waits
    /// forever).
    pub fn join(mut self, timeout: Option<Duration>) -> JoinOutcome {
        let deadline = Deadline::after(timeout);
        loop {
            let state = self.inner.state.load(Ordering::Acquire);
            if state != ThreadState::Running as u32 {
                if let Some(token) = self.token.take() {
                    DefaultPlatform::reap(token);
                }
                return JoinOutcome::Finished;
            }
            match deadline.next_timeout() {
                Some(wait_for) => {
                    platform::wait(&self.inner.state, ThreadState::Running as u32, wait_for);
                }
                None => return JoinOutcome::TimedOut(self),
            }
        }
    }

    /// Release the obligation to join. The platform reclaims the thread when
    /// it terminates.
    pub fn detach(mut self) {
        if let Some(token) = self.token.take() {
            DefaultPlatform::detach(token);
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            tracing::warn!(
                thread = self.inner.id.get(),
                name = ?self.inner.name.lock().as_deref(),
                "thread handle dropped without join or detach; detaching"
            );
            DefaultPlatform::detach(token);
        }
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

/// Builder for configuring a thread before launch.
#[derive(Debug, Clone, Default)]
pub struct Builder {
    options: ThreadOptions,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the thread name for debugging purposes.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Request a stack size in bytes (native backend only).
    pub fn stack_size(mut self, size: usize) -> Self {
        self.options.stack_size = Some(size);
        self
    }

    pub(crate) fn stack_size_opt(mut self, size: Option<usize>) -> Self {
        self.options.stack_size = size;
        self
    }

    /// Start `entry(arg)` concurrently with the caller.
    ///
    /// Fails with `ResourceCreationFailed` when the platform cannot provide
    /// another execution context; nothing is leaked in that case.
    pub fn launch<F, A>(self, entry: F, arg: A) -> RuntimeResult<Thread>
    where
        F: FnOnce(A) + Send + 'static,
        A: Send + 'static,
    {
        let id = ThreadId::next();
        let inner = Arc::new(ThreadInner {
            id,
            state: AtomicU32::new(ThreadState::Running as u32),
            name: spin::Mutex::new(self.options.name.clone()),
        });

        let body_inner = inner.clone();
        let start: StartFn = Box::new(move || {
            CURRENT_ID.with(|current| current.set(Some(id)));
            let result = panic::catch_unwind(AssertUnwindSafe(move || entry(arg)));
            let state = match result {
                Ok(()) => ThreadState::Finished,
                Err(payload) => {
                    tracing::error!(
                        thread = id.get(),
                        panic = panic_message(payload.as_ref()),
                        "launched thread panicked"
                    );
                    ThreadState::Panicked
                }
            };
            body_inner.finish(state);
        });

        let token = DefaultPlatform::spawn(start, &self.options)?;
        Ok(Thread {
            inner,
            token: Some(token),
        })
    }
}

/// Start `entry(arg)` on a new thread with default options.
pub fn launch<F, A>(entry: F, arg: A) -> RuntimeResult<Thread>
where
    F: FnOnce(A) + Send + 'static,
    A: Send + 'static,
{
    Builder::new().launch(entry, arg)
}

fn panic_message(payload: &(dyn core::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
