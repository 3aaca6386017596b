//! Lanes: one entry function run on N threads in lock-step.
//!
//! [`run_lanes`] carves a scratch arena per lane out of the caller's arena,
//! launches one thread per lane and blocks until all of them return. Lanes
//! coordinate through their [`LaneContext`]: a shared barrier, an even work
//! partition and a one-word broadcast slot.

use core::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use portable_atomic::{AtomicU32, AtomicU64, Ordering};

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::mem::Arena;
use crate::platform;
use crate::sync::Barrier;
use crate::thread::{Builder, JoinOutcome, Thread};

const GATE_PENDING: u32 = 0;
const GATE_GO: u32 = 1;
const GATE_ABORT: u32 = 2;

struct LaneShared {
    barrier: Barrier,
    broadcast: AtomicU64,
    /// Lanes park here until every lane has launched.
    gate: AtomicU32,
}

impl LaneShared {
    fn new(count: u32) -> Self {
        Self {
            barrier: Barrier::new(count),
            broadcast: AtomicU64::new(0),
            gate: AtomicU32::new(GATE_PENDING),
        }
    }

    /// `true` once the run may start, `false` if it was aborted.
    fn pass_gate(&self) -> bool {
        loop {
            match self.gate.load(Ordering::Acquire) {
                GATE_PENDING => {
                    platform::wait(&self.gate, GATE_PENDING, None);
                }
                state => return state == GATE_GO,
            }
        }
    }

    fn open_gate(&self, state: u32) {
        self.gate.store(state, Ordering::Release);
        platform::wake_all(&self.gate);
    }
}

/// Per-lane view of a run.
pub struct LaneContext<'s> {
    index: usize,
    count: usize,
    shared: Arc<LaneShared>,
    scratch: Arena<'s>,
}

impl<'s> LaneContext<'s> {
    /// This lane's index in `0..count`.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of lanes in the run.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_main(&self) -> bool {
        self.index == 0
    }

    /// Wait for every lane. Returns `true` on exactly one lane per call.
    pub fn sync(&self) -> bool {
        self.shared.barrier.wait()
    }

    /// This lane's share of `0..total`.
    ///
    /// The first `total % count` lanes get one extra item; the ranges of all
    /// lanes are contiguous, disjoint and cover `0..total`.
    pub fn range(&self, total: u64) -> Range<u64> {
        lane_range(self.index as u64, self.count as u64, total)
    }

    /// Copy `root`'s `value` into `value` on every lane.
    ///
    /// Every lane must call this with the same `root`.
    pub fn broadcast_u64(&self, root: usize, value: &mut u64) {
        if self.index == root {
            self.shared.broadcast.store(*value, Ordering::Relaxed);
        }
        self.sync();
        if self.index != root {
            *value = self.shared.broadcast.load(Ordering::Relaxed);
        }
        // Keep the slot stable until every lane has read it.
        self.sync();
    }

    /// This lane's private scratch arena.
    pub fn scratch(&mut self) -> &mut Arena<'s> {
        &mut self.scratch
    }
}

impl core::fmt::Debug for LaneContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LaneContext")
            .field("index", &self.index)
            .field("count", &self.count)
            .field("scratch", &self.scratch)
            .finish()
    }
}

fn lane_range(index: u64, count: u64, total: u64) -> Range<u64> {
    let base = total / count;
    let extra = total % count;
    let start = index * base + index.min(extra);
    let len = base + u64::from(index < extra);
    start..start + len
}

fn lane_name(prefix: &str, index: usize) -> String {
    if index == 0 {
        format!("{prefix} Main")
    } else {
        format!("{prefix} Thread {index}")
    }
}

fn join_all(lanes: Vec<Thread>) {
    for lane in lanes {
        if let JoinOutcome::TimedOut(lane) = lane.join(None) {
            lane.detach();
        }
    }
}

/// Run `entry` on `config.lane_count` lanes and wait for all of them.
///
/// Each lane gets `config.scratch_size` bytes of scratch carved from
/// `arena`. The carve stays committed in `arena` after the run; reset the
/// arena to reclaim it.
///
/// Fails with `AllocationExhausted`, launching nothing, if `arena` cannot
/// hold every lane's scratch. Fails with `ResourceCreationFailed` if a lane
/// cannot be launched; lanes already started are released without running
/// `entry` and joined, and the scratch carve is returned to `arena`, before
/// the error is returned.
///
/// A panic inside `entry` aborts the process: the other lanes would
/// otherwise block forever at their next barrier.
pub fn run_lanes<F>(config: &RuntimeConfig, arena: &mut Arena<'_>, entry: F) -> RuntimeResult<()>
where
    F: Fn(&mut LaneContext<'_>) + Send + Sync + 'static,
{
    config.validate()?;
    let count = config.lane_count;
    let (stride, total) = config
        .scratch_stride()
        .zip(config.total_scratch())
        .ok_or(RuntimeError::InvariantViolation)?;
    let parties = u32::try_from(count).map_err(|_| RuntimeError::InvariantViolation)?;

    let mark = arena.checkpoint();
    let block = arena.sub_arena(total)?;
    let base = block.as_ptr() as *mut u8;

    let shared = Arc::new(LaneShared::new(parties));
    let entry = Arc::new(entry);
    let mut lanes = Vec::with_capacity(count);

    for index in 0..count {
        // SAFETY: `block` spans `count * stride` bytes carved out of `arena`,
        // which stays mutably borrowed until every lane below is joined.
        // Each lane gets its own `stride`-sized slice of it.
        let scratch = unsafe { Arena::from_raw_parts(base.add(index * stride), config.scratch_size) };
        let lane_shared = shared.clone();
        let lane_entry = entry.clone();

        let launched = Builder::new()
            .name(lane_name(&config.thread_name_prefix, index))
            .stack_size_opt(config.stack_size)
            .launch(
                move |scratch: Arena<'static>| {
                    if !lane_shared.pass_gate() {
                        return;
                    }
                    let mut ctx = LaneContext {
                        index,
                        count,
                        shared: lane_shared,
                        scratch,
                    };
                    let result = panic::catch_unwind(AssertUnwindSafe(|| (*lane_entry)(&mut ctx)));
                    if result.is_err() {
                        tracing::error!(lane = index, "lane panicked, aborting");
                        std::process::abort();
                    }
                },
                scratch,
            );

        match launched {
            Ok(lane) => lanes.push(lane),
            Err(err) => {
                tracing::error!(lane = index, lanes = count, error = %err, "failed to launch lane");
                shared.open_gate(GATE_ABORT);
                join_all(lanes);
                drop(block);
                // SAFETY: every lane scratch arena was moved into a lane that
                // has been joined or into a launch that failed and dropped it.
                unsafe { arena.rewind(mark) };
                return Err(err);
            }
        }
    }

    shared.open_gate(GATE_GO);
    join_all(lanes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_partition_evenly() {
        for count in 1..=7u64 {
            for total in [0u64, 1, 6, 7, 100, 101] {
                let mut next = 0;
                for index in 0..count {
                    let range = lane_range(index, count, total);
                    assert_eq!(range.start, next);
                    let len = range.end - range.start;
                    assert!(len == total / count || len == total / count + 1);
                    next = range.end;
                }
                assert_eq!(next, total);
            }
        }
    }

    #[test]
    fn extra_items_go_to_first_lanes() {
        let lens: Vec<u64> = (0..4)
            .map(|i| {
                let r = lane_range(i, 4, 10);
                r.end - r.start
            })
            .collect();
        assert_eq!(lens, vec![3, 3, 2, 2]);
    }

    #[test]
    fn names() {
        assert_eq!(lane_name("MCR", 0), "MCR Main");
        assert_eq!(lane_name("MCR", 3), "MCR Thread 3");
    }

    #[test]
    fn gate_abort_releases_waiters() {
        let shared = Arc::new(LaneShared::new(2));
        let waiter_shared = shared.clone();
        let waiter = std::thread::spawn(move || waiter_shared.pass_gate());
        shared.open_gate(GATE_ABORT);
        assert!(!waiter.join().unwrap());
    }
}
