//! Bump-pointer arena over a caller-supplied buffer.
//!
//! An [`Arena`] never owns its backing store and never reallocates it, so the
//! buffer address is stable for the arena's lifetime. Allocations are handed
//! out as raw pointers and sub-arenas: [`Arena::reset`] invalidates all of
//! them at once, which is why it is `unsafe`.
//!
//! An arena is not internally synchronized. The intended pattern is one arena
//! per thread, with [`Arena::sub_arena`] used to partition a larger backing
//! store between threads before they start.

use core::marker::PhantomData;
use core::mem::{align_of, size_of};
use core::ptr::{self, NonNull};

use super::align_forward;
use crate::error::{RuntimeError, RuntimeResult};
use crate::invariant;

/// Alignment used by [`Arena::alloc`] and for carving sub-arenas.
pub const DEFAULT_ALIGNMENT: usize = 2 * size_of::<usize>();

/// Bump allocator. Invariant: `offset <= capacity`.
pub struct Arena<'a> {
    buffer: *mut u8,
    capacity: usize,
    offset: usize,
    /// Start offset of the most recent allocation, for `realloc` checks.
    last: Option<usize>,
    _buffer: PhantomData<&'a mut [u8]>,
}

// An arena is moved into the thread that owns it; it is never shared.
unsafe impl Send for Arena<'_> {}

impl<'a> Arena<'a> {
    /// Arena over the whole of `buffer`.
    pub fn from_buffer(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer: buffer.as_mut_ptr(),
            capacity: buffer.len(),
            offset: 0,
            last: None,
            _buffer: PhantomData,
        }
    }

    /// Arena over `capacity` bytes starting at `buffer`.
    ///
    /// # Safety
    ///
    /// `buffer` must be valid for reads and writes of `capacity` bytes for as
    /// long as the arena or any pointer it returns is used, and no other code
    /// may access that range in the meantime except through those pointers.
    pub unsafe fn from_raw_parts(buffer: *mut u8, capacity: usize) -> Self {
        Self {
            buffer,
            capacity,
            offset: 0,
            last: None,
            _buffer: PhantomData,
        }
    }

    /// A destroyed arena: no buffer, no capacity.
    pub const fn empty() -> Self {
        Self {
            buffer: ptr::null_mut(),
            capacity: 0,
            offset: 0,
            last: None,
            _buffer: PhantomData,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed so far, including alignment padding.
    pub fn committed_size(&self) -> usize {
        self.offset
    }

    /// Bytes still available before alignment padding.
    pub fn free_size(&self) -> usize {
        self.capacity - self.offset
    }

    /// Base address of the backing buffer (null once destroyed).
    pub fn as_ptr(&self) -> *const u8 {
        self.buffer
    }

    /// `true` if `ptr` lies inside the committed part of the buffer.
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.buffer as usize;
        let addr = ptr as usize;
        !self.buffer.is_null() && addr >= base && addr < base + self.offset
    }

    /// Offset of `ptr` if it lies in `[buffer, buffer + offset]`.
    fn committed_offset_of(&self, ptr: *const u8) -> Option<usize> {
        if self.buffer.is_null() {
            return None;
        }
        let offset = (ptr as usize).checked_sub(self.buffer as usize)?;
        (offset <= self.offset).then_some(offset)
    }

    /// Offset range `[start, start + size)` of the next aligned block, if it
    /// fits.
    fn bump(&self, size: usize, align: usize) -> Option<usize> {
        if self.buffer.is_null() {
            return None;
        }
        let base = self.buffer as usize;
        let start = align_forward(base.checked_add(self.offset)?, align)? - base;
        let end = start.checked_add(size)?;
        (end <= self.capacity).then_some(start)
    }

    fn exhausted(&self, requested: usize) -> RuntimeError {
        tracing::warn!(
            requested,
            remaining = self.free_size(),
            capacity = self.capacity,
            "arena allocation failed"
        );
        RuntimeError::AllocationExhausted {
            requested,
            remaining: self.free_size(),
        }
    }

    /// Allocate `size` zeroed bytes aligned to `align` (a power of two).
    ///
    /// Fails without touching the offset if the block does not fit.
    pub fn alloc_align(&mut self, size: usize, align: usize) -> RuntimeResult<NonNull<u8>> {
        if !align.is_power_of_two() {
            invariant!(false, "arena alignment {} is not a power of two", align);
            return Err(RuntimeError::InvariantViolation);
        }
        let start = self.bump(size, align).ok_or_else(|| self.exhausted(size))?;

        // SAFETY: `bump` checked that `start + size <= capacity` on a live
        // buffer, and the buffer pointer is non-null.
        unsafe {
            let ptr = self.buffer.add(start);
            ptr::write_bytes(ptr, 0, size);
            self.offset = start + size;
            self.last = Some(start);
            Ok(NonNull::new_unchecked(ptr))
        }
    }

    /// Allocate `size` zeroed bytes at [`DEFAULT_ALIGNMENT`].
    pub fn alloc(&mut self, size: usize) -> RuntimeResult<NonNull<u8>> {
        self.alloc_align(size, DEFAULT_ALIGNMENT)
    }

    /// Move `value` into the arena. It is never dropped.
    pub fn alloc_value<T>(&mut self, value: T) -> RuntimeResult<NonNull<T>> {
        let ptr = self.alloc_align(size_of::<T>(), align_of::<T>())?.cast::<T>();
        // SAFETY: freshly allocated, sized and aligned for `T`.
        unsafe { ptr.as_ptr().write(value) };
        Ok(ptr)
    }

    /// Allocate `len` copies of `fill`.
    pub fn alloc_array<T: Copy>(&mut self, len: usize, fill: T) -> RuntimeResult<NonNull<T>> {
        let size = size_of::<T>()
            .checked_mul(len)
            .ok_or_else(|| self.exhausted(usize::MAX))?;
        let ptr = self.alloc_align(size, align_of::<T>())?.cast::<T>();
        for i in 0..len {
            // SAFETY: `i < len` and the block holds `len` elements.
            unsafe { ptr.as_ptr().add(i).write(fill) };
        }
        Ok(ptr)
    }

    /// Grow or shrink the most recent allocation by allocating a new block
    /// and copying `min(new_size, bytes committed since ptr)` into it.
    ///
    /// Only valid when `ptr` is the last allocation returned by this arena.
    /// With any other pointer the copy includes unrelated trailing bytes; this
    /// is a fatal assertion in debug builds. `None` behaves like
    /// [`Arena::alloc`]. A pointer outside the committed range is rejected.
    pub fn realloc(
        &mut self,
        ptr: Option<NonNull<u8>>,
        new_size: usize,
    ) -> RuntimeResult<NonNull<u8>> {
        let Some(old) = ptr else {
            return self.alloc(new_size);
        };
        // A zero-sized last allocation sits exactly at the offset.
        let Some(old_offset) = self.committed_offset_of(old.as_ptr()) else {
            invariant!(
                false,
                "realloc of {:p} outside the committed range of the arena",
                old
            );
            return Err(RuntimeError::InvariantViolation);
        };
        invariant!(
            self.last == Some(old_offset),
            "realloc is only valid on the most recent allocation"
        );
        let tail = self.offset - old_offset;

        let new = self.alloc(new_size)?;
        // SAFETY: the old block ends at the previous offset and the new block
        // starts at or after it, so the ranges are disjoint and both in
        // bounds.
        unsafe { ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), tail.min(new_size)) };
        Ok(new)
    }

    /// Carve `capacity` bytes from the free tail as an independent arena.
    ///
    /// The carve is aligned to [`DEFAULT_ALIGNMENT`] and permanently advances
    /// this arena's offset past it. Fails without touching the offset if the
    /// region does not fit.
    pub fn sub_arena(&mut self, capacity: usize) -> RuntimeResult<Arena<'a>> {
        let start = self
            .bump(capacity, DEFAULT_ALIGNMENT)
            .ok_or_else(|| self.exhausted(capacity))?;
        self.offset = start + capacity;
        self.last = None;
        // SAFETY: the region is in bounds and, with the offset advanced past
        // it, will not be handed out by this arena again before a reset.
        Ok(unsafe { Arena::from_raw_parts(self.buffer.add(start), capacity) })
    }

    /// Rewind to empty so the whole buffer can be handed out again.
    ///
    /// A sub-arena is not tied to a borrow of its parent, so a safe reset
    /// would let the parent hand out bytes a live child still owns.
    ///
    /// ```compile_fail
    /// let mut backing = [0u8; 64];
    /// let mut arena = multicore_rt::Arena::from_buffer(&mut backing);
    /// arena.reset();
    /// ```
    ///
    /// # Safety
    ///
    /// No pointer or sub-arena obtained from this arena since the last reset
    /// may be used afterwards.
    pub unsafe fn reset(&mut self) {
        self.offset = 0;
        self.last = None;
    }

    /// Current offset and last-allocation state, for [`Arena::rewind`].
    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            offset: self.offset,
            last: self.last,
        }
    }

    /// Roll back to `checkpoint`, releasing everything committed since.
    ///
    /// # Safety
    ///
    /// `checkpoint` came from this arena and no pointer or sub-arena obtained
    /// after it is used afterwards.
    pub(crate) unsafe fn rewind(&mut self, checkpoint: Checkpoint) {
        invariant!(
            checkpoint.offset <= self.offset,
            "rewind past the current offset"
        );
        self.offset = checkpoint.offset.min(self.offset);
        self.last = checkpoint.last;
    }

    /// Clear every field. The backing buffer is not freed.
    ///
    /// Unlike [`Arena::reset`] nothing becomes allocatable again, so live
    /// pointers and sub-arenas stay valid.
    pub fn destroy(&mut self) {
        *self = Arena::empty();
    }
}

/// Saved arena position.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Checkpoint {
    offset: usize,
    last: Option<usize>,
}

impl Default for Arena<'_> {
    fn default() -> Self {
        Arena::empty()
    }
}

impl core::fmt::Debug for Arena<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("buffer", &self.buffer)
            .field("capacity", &self.capacity)
            .field("offset", &self.offset)
            .finish()
    }
}
