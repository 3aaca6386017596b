//! Runtime configuration for [`run_lanes`](crate::lane::run_lanes).

use crate::error::{RuntimeError, RuntimeResult};
use crate::invariant;
use crate::mem::{align_forward, DEFAULT_ALIGNMENT};
use crate::thread::processor_count;

/// Default scratch arena size per lane.
pub const DEFAULT_SCRATCH_SIZE: usize = 64 * 1024;

/// Default prefix for lane thread names.
pub const DEFAULT_NAME_PREFIX: &str = "MCR";

/// Parameters of a lane run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of lanes, including the main lane.
    pub lane_count: usize,
    /// Bytes of scratch arena carved for each lane.
    pub scratch_size: usize,
    /// Lane threads are named `"<prefix> Main"` and `"<prefix> Thread <i>"`.
    pub thread_name_prefix: String,
    /// Native stack size for lane threads, platform default when `None`.
    pub stack_size: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lane_count: processor_count(),
            scratch_size: DEFAULT_SCRATCH_SIZE,
            thread_name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            stack_size: None,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lane_count(mut self, lane_count: usize) -> Self {
        self.lane_count = lane_count;
        self
    }

    pub fn with_scratch_size(mut self, scratch_size: usize) -> Self {
        self.scratch_size = scratch_size;
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Reject configurations no run can satisfy.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.lane_count == 0 || u32::try_from(self.lane_count).is_err() {
            invariant!(false, "lane_count must be in 1..=u32::MAX");
            return Err(RuntimeError::InvariantViolation);
        }
        if self.stack_size == Some(0) {
            invariant!(false, "stack_size must be non-zero when set");
            return Err(RuntimeError::InvariantViolation);
        }
        if self.scratch_stride().is_none() || self.total_scratch().is_none() {
            return Err(RuntimeError::AllocationExhausted {
                requested: usize::MAX,
                remaining: 0,
            });
        }
        Ok(())
    }

    /// Per-lane scratch size rounded up so consecutive regions stay aligned.
    pub(crate) fn scratch_stride(&self) -> Option<usize> {
        align_forward(self.scratch_size, DEFAULT_ALIGNMENT)
    }

    /// Bytes of parent arena a run with this configuration consumes.
    pub fn total_scratch(&self) -> Option<usize> {
        self.scratch_stride()?.checked_mul(self.lane_count)
    }
}
