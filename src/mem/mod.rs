//! Memory management without a general-purpose heap.
//!
//! Memory is handed out by bump allocation from caller-owned buffers,
//! partitioned up front with sub-arenas, and reclaimed only by resetting an
//! arena as a whole. There is no per-allocation free.

pub mod allocator;
pub mod arena;

pub use allocator::Allocator;
pub use arena::{Arena, DEFAULT_ALIGNMENT};

/// Round `addr` up to the next multiple of `align`, which must be a power of
/// two. `None` if the result does not fit in a `usize`.
#[inline]
pub fn align_forward(addr: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    let mask = align - 1;
    addr.checked_add(mask).map(|bumped| bumped & !mask)
}
