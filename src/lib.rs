//! Portable threads, futex-based synchronization and bump arenas.
//!
//! The same API runs on native OS threads and on WebAssembly workers sharing
//! one linear memory; the backend is chosen at compile time (see
//! [`platform`]).

pub mod config;
pub mod error;
pub mod lane;
pub mod mem;
pub mod platform;
pub mod sync;
pub mod thread;

pub use config::RuntimeConfig;
pub use error::{RuntimeError, RuntimeResult};
pub use lane::{run_lanes, LaneContext};
pub use mem::{Allocator, Arena, DEFAULT_ALIGNMENT};
pub use platform::{timeout_from_micros, DefaultPlatform, Platform};
pub use sync::{Barrier, CondVar, Mutex, MutexGuard, RwMutex, RwReadGuard, RwWriteGuard, Semaphore};
pub use thread::{launch, processor_count, Builder, JoinOutcome, Thread, ThreadId, ThreadState};
