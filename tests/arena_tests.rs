//! Arena allocator behaviour and properties

use multicore_rt::mem::align_forward;
use multicore_rt::{Allocator, Arena, RuntimeError, DEFAULT_ALIGNMENT};
use proptest::prelude::*;

/// Over-aligned backing store so offsets and addresses line up.
#[repr(align(64))]
struct Backing<const N: usize>([u8; N]);

impl<const N: usize> Backing<N> {
    fn new() -> Self {
        Self([0; N])
    }
}

/// Second allocation lands right after the aligned first one; reset reuses
/// the same base
#[test]
fn test_bump_and_reset() {
    const A: usize = 13;
    const B: usize = 40;
    let mut backing = Backing::<256>::new();
    let mut arena = Arena::from_buffer(&mut backing.0);

    let first = arena.alloc_align(A, 8).unwrap();
    let second = arena.alloc_align(B, 8).unwrap();
    assert_eq!(
        second.as_ptr() as usize,
        first.as_ptr() as usize + align_forward(A, 8).unwrap()
    );
    assert_eq!(arena.committed_size(), align_forward(A, 8).unwrap() + B);

    unsafe { arena.reset() };
    assert_eq!(arena.committed_size(), 0);
    let again = arena.alloc_align(A, 8).unwrap();
    assert_eq!(again, first);
}

/// Sub-arena ranges never overlap parent allocations
#[test]
fn test_sub_arena_disjoint() {
    let mut backing = Backing::<1024>::new();
    let mut parent = Arena::from_buffer(&mut backing.0);

    let before = parent.alloc(100).unwrap().as_ptr() as usize;
    let mut child = parent.sub_arena(256).unwrap();
    let after = parent.alloc(100).unwrap().as_ptr() as usize;

    let child_start = child.as_ptr() as usize;
    let child_end = child_start + child.capacity();
    assert_eq!(child.capacity(), 256);
    assert_eq!(child_start % DEFAULT_ALIGNMENT, 0);
    assert!(before + 100 <= child_start);
    assert!(after >= child_end);

    let inner = child.alloc(256).unwrap().as_ptr() as usize;
    assert_eq!(inner, child_start);
    assert!(child.alloc(1).is_err());
}

/// Carving more than the free tail fails and leaves the parent untouched
#[test]
fn test_sub_arena_too_large() {
    let mut backing = Backing::<256>::new();
    let mut parent = Arena::from_buffer(&mut backing.0);
    parent.alloc(64).unwrap();
    let committed = parent.committed_size();

    let err = parent.sub_arena(parent.free_size() + 1).unwrap_err();
    assert!(matches!(err, RuntimeError::AllocationExhausted { .. }));
    assert_eq!(parent.committed_size(), committed);
}

/// Growing the last allocation keeps its bytes
#[test]
fn test_realloc_grows_last() {
    let mut backing = Backing::<256>::new();
    let mut arena = Arena::from_buffer(&mut backing.0);

    let old = arena.alloc_array(4, 0xABu8).unwrap();
    let new = arena.realloc(Some(old), 32).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(new.as_ptr(), 32) };
    assert!(bytes[..4].iter().all(|b| *b == 0xAB));
    assert!(bytes[4..].iter().all(|b| *b == 0));

    let shrunk = arena.realloc(Some(new), 2).unwrap();
    let bytes = unsafe { std::slice::from_raw_parts(shrunk.as_ptr(), 2) };
    assert_eq!(bytes, &[0xAB, 0xAB]);
}

/// Realloc on a pointer the arena never handed out is a precondition failure
#[test]
#[cfg_attr(debug_assertions, should_panic(expected = "outside the committed range"))]
fn test_realloc_foreign_pointer() {
    let mut backing = Backing::<64>::new();
    let mut other = [0u8; 8];
    let mut arena = Arena::from_buffer(&mut backing.0);
    let foreign = std::ptr::NonNull::new(other.as_mut_ptr()).unwrap();
    assert_eq!(
        arena.realloc(Some(foreign), 4),
        Err(RuntimeError::InvariantViolation)
    );
}

/// Realloc on an older allocation trips the debug assertion
#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "most recent allocation")]
fn test_realloc_non_last_panics_in_debug() {
    let mut backing = Backing::<256>::new();
    let mut arena = Arena::from_buffer(&mut backing.0);
    let first = arena.alloc(8).unwrap();
    arena.alloc(8).unwrap();
    let _ = arena.realloc(Some(first), 16);
}

/// Destroying the parent leaves a live child's region intact
#[test]
fn test_destroy_keeps_child_region() {
    let mut backing = Backing::<512>::new();
    let mut parent = Arena::from_buffer(&mut backing.0);
    let mut child = parent.sub_arena(128).unwrap();
    parent.destroy();

    assert!(parent.alloc(1).is_err());
    let start = child.as_ptr() as usize;
    let block = child.alloc(128).unwrap().as_ptr() as usize;
    assert_eq!(block, start);
}

/// Destroyed arenas refuse every allocation
#[test]
fn test_destroy() {
    let mut backing = Backing::<64>::new();
    let mut arena = Arena::from_buffer(&mut backing.0);
    arena.alloc(8).unwrap();
    arena.destroy();
    assert_eq!(arena.capacity(), 0);
    assert_eq!(arena.free_size(), 0);
    assert!(matches!(
        arena.alloc(1),
        Err(RuntimeError::AllocationExhausted { .. })
    ));
}

fn scratch_checksum(alloc: &mut impl Allocator, words: usize) -> u64 {
    let ptr = alloc.alloc(words * 8).unwrap().cast::<u64>();
    for i in 0..words {
        unsafe { ptr.as_ptr().add(i).write(i as u64) };
    }
    (0..words).map(|i| unsafe { *ptr.as_ptr().add(i) }).sum()
}

/// Code written against the trait works with an arena
#[test]
fn test_allocator_trait() {
    let mut backing = Backing::<512>::new();
    let mut arena = Arena::from_buffer(&mut backing.0);
    assert_eq!(scratch_checksum(&mut arena, 10), 45);
    unsafe { Allocator::reset(&mut arena) };
    assert_eq!(Allocator::committed_size(&arena), 0);
}

proptest! {
    /// Every successful allocation is aligned, in bounds, zeroed and disjoint
    /// from the others; failures leave the offset untouched.
    #[test]
    fn prop_allocations_disjoint(
        requests in prop::collection::vec((0usize..200, 0u32..7), 1..40)
    ) {
        let mut backing = Backing::<2048>::new();
        let base = backing.0.as_ptr() as usize;
        let mut arena = Arena::from_buffer(&mut backing.0);
        let mut blocks: Vec<(usize, usize)> = Vec::new();

        for (size, align_log2) in requests {
            let align = 1usize << align_log2;
            let before = arena.committed_size();
            match arena.alloc_align(size, align) {
                Ok(ptr) => {
                    let addr = ptr.as_ptr() as usize;
                    prop_assert_eq!(addr % align, 0);
                    prop_assert!(addr >= base && addr + size <= base + 2048);
                    prop_assert_eq!(arena.committed_size(), addr + size - base);
                    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
                    prop_assert!(bytes.iter().all(|b| *b == 0));
                    unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0xFF, size) };
                    for &(start, len) in &blocks {
                        prop_assert!(addr >= start + len || addr + size <= start);
                    }
                    blocks.push((addr, size));
                }
                Err(RuntimeError::AllocationExhausted { requested, .. }) => {
                    prop_assert_eq!(requested, size);
                    prop_assert_eq!(arena.committed_size(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error {:?}", other),
            }
            prop_assert_eq!(arena.committed_size() + arena.free_size(), arena.capacity());
        }
    }

    /// Sub-arenas carved in sequence never overlap and stay in the parent.
    #[test]
    fn prop_sub_arenas_disjoint(sizes in prop::collection::vec(0usize..300, 1..12)) {
        let mut backing = Backing::<2048>::new();
        let base = backing.0.as_ptr() as usize;
        let mut parent = Arena::from_buffer(&mut backing.0);
        let mut ranges: Vec<(usize, usize)> = Vec::new();

        for size in sizes {
            let before = parent.committed_size();
            match parent.sub_arena(size) {
                Ok(child) => {
                    let start = child.as_ptr() as usize;
                    prop_assert_eq!(start % DEFAULT_ALIGNMENT, 0);
                    prop_assert!(start + size <= base + 2048);
                    for &(s, len) in &ranges {
                        prop_assert!(start >= s + len || start + size <= s);
                    }
                    ranges.push((start, size));
                }
                Err(_) => prop_assert_eq!(parent.committed_size(), before),
            }
        }
    }
}
