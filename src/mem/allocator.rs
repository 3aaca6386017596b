//! Allocation capability trait.

use core::ptr::NonNull;

use super::arena::{Arena, DEFAULT_ALIGNMENT};
use crate::error::RuntimeResult;

/// Something that hands out zeroed byte blocks and forgets all of them at
/// once on `reset`.
///
/// Code that only needs scratch memory takes `&mut impl Allocator` so a test
/// can hand it an arena over a small stack buffer while production code
/// passes a lane's scratch arena.
pub trait Allocator {
    fn alloc_align(&mut self, size: usize, align: usize) -> RuntimeResult<NonNull<u8>>;

    fn alloc(&mut self, size: usize) -> RuntimeResult<NonNull<u8>> {
        self.alloc_align(size, DEFAULT_ALIGNMENT)
    }

    fn realloc(&mut self, ptr: Option<NonNull<u8>>, new_size: usize)
        -> RuntimeResult<NonNull<u8>>;

    /// Invalidate every block handed out so far.
    ///
    /// # Safety
    ///
    /// No block obtained since the last reset may be used afterwards.
    unsafe fn reset(&mut self);

    fn capacity(&self) -> usize;

    fn committed_size(&self) -> usize;

    fn free_size(&self) -> usize {
        self.capacity() - self.committed_size()
    }
}

impl Allocator for Arena<'_> {
    fn alloc_align(&mut self, size: usize, align: usize) -> RuntimeResult<NonNull<u8>> {
        Arena::alloc_align(self, size, align)
    }

    fn realloc(
        &mut self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
    ) -> RuntimeResult<NonNull<u8>> {
        Arena::realloc(self, ptr, new_size)
    }

    unsafe fn reset(&mut self) {
        Arena::reset(self)
    }

    fn capacity(&self) -> usize {
        Arena::capacity(self)
    }

    fn committed_size(&self) -> usize {
        Arena::committed_size(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_of_squares<A: Allocator>(alloc: &mut A, n: usize) -> RuntimeResult<u64> {
        let ptr = alloc
            .alloc_align(n * core::mem::size_of::<u64>(), core::mem::align_of::<u64>())?
            .cast::<u64>();
        let mut sum = 0;
        for i in 0..n {
            unsafe {
                ptr.as_ptr().add(i).write((i * i) as u64);
                sum += *ptr.as_ptr().add(i);
            }
        }
        Ok(sum)
    }

    #[test]
    fn arena_through_trait() {
        let mut backing = [0u8; 256];
        let mut arena = Arena::from_buffer(&mut backing);
        assert_eq!(sum_of_squares(&mut arena, 4).unwrap(), 14);
        assert!(Allocator::committed_size(&arena) >= 32);
        assert_eq!(
            Allocator::free_size(&arena),
            256 - Allocator::committed_size(&arena)
        );

        // SAFETY: the block from the first call is not used again.
        unsafe { Allocator::reset(&mut arena) };
        assert_eq!(Allocator::committed_size(&arena), 0);
        assert!(sum_of_squares(&mut arena, 100).is_err());
    }
}
