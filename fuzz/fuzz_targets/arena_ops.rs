#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use multicore_rt::{Arena, RuntimeError};
use std::ptr::NonNull;

const BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug, Arbitrary)]
enum ArenaOperation {
    Alloc { size: u16, align_log2: u8 },
    AllocDefault(u16),
    AllocArray { len: u8, fill: u32 },
    GrowLast(u16),
    SubArena(u16),
    ChildAlloc(u16),
    Reset,
    ResetChild,
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);

    let operations: Result<Vec<ArenaOperation>, _> = (0..64)
        .map(|_| ArenaOperation::arbitrary(&mut u))
        .collect();

    if let Ok(ops) = operations {
        fuzz_arena(ops);
    }
});

struct Block {
    ptr: NonNull<u8>,
    size: usize,
    tag: u8,
}

fn fill(block: &Block) {
    unsafe { std::ptr::write_bytes(block.ptr.as_ptr(), block.tag, block.size) };
}

fn intact(block: &Block) -> bool {
    let bytes = unsafe { std::slice::from_raw_parts(block.ptr.as_ptr(), block.size) };
    bytes.iter().all(|b| *b == block.tag)
}

fn fuzz_arena(operations: Vec<ArenaOperation>) {
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut arena = Arena::from_buffer(&mut buffer);
    let mut child: Option<Arena<'_>> = None;
    let mut blocks: Vec<Block> = Vec::new();
    let mut child_blocks: Vec<Block> = Vec::new();
    let mut tag = 0u8;

    for op in operations {
        tag = tag.wrapping_add(1);
        let before = arena.committed_size();

        let result = match op {
            ArenaOperation::Alloc { size, align_log2 } => {
                let align = 1usize << (align_log2 % 12);
                let result = arena.alloc_align(size as usize, align);
                if let Ok(ptr) = &result {
                    assert_eq!(ptr.as_ptr() as usize % align, 0);
                }
                result.map(|ptr| (ptr, size as usize, 0))
            }
            ArenaOperation::AllocDefault(size) => {
                arena.alloc(size as usize).map(|ptr| (ptr, size as usize, 0))
            }
            ArenaOperation::AllocArray { len, fill } => {
                let size = len as usize * 4;
                match arena.alloc_array(len as usize, fill) {
                    Ok(ptr) => {
                        let words = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len as usize) };
                        assert!(words.iter().all(|w| *w == fill));
                        // Already checked; skip the zero-fill check below.
                        Ok((ptr.cast::<u8>(), size, size))
                    }
                    Err(err) => Err(err),
                }
            }
            ArenaOperation::GrowLast(new_size) => {
                // Only the most recent allocation may be resized.
                let last = blocks.last().map(|b| b.ptr);
                match arena.realloc(last, new_size as usize) {
                    Ok(ptr) => {
                        let mut kept = 0;
                        if let Some(old) = blocks.last() {
                            kept = old.size.min(new_size as usize);
                            let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), kept) };
                            assert!(bytes.iter().all(|b| *b == old.tag));
                        }
                        Ok((ptr, new_size as usize, kept))
                    }
                    Err(err) => Err(err),
                }
            }
            ArenaOperation::SubArena(capacity) => {
                match arena.sub_arena(capacity as usize) {
                    Ok(sub) => {
                        let start = sub.as_ptr() as usize;
                        let end = start + sub.capacity();
                        for block in &blocks {
                            let b = block.ptr.as_ptr() as usize;
                            assert!(b + block.size <= start || b >= end);
                        }
                        child = Some(sub);
                        child_blocks.clear();
                    }
                    Err(RuntimeError::AllocationExhausted { .. }) => {
                        assert_eq!(arena.committed_size(), before);
                    }
                    Err(other) => panic!("unexpected error {:?}", other),
                }
                // A carve is not an allocation; `realloc` must not see it as one.
                blocks.clear();
                continue;
            }
            ArenaOperation::ChildAlloc(size) => {
                if let Some(sub) = child.as_mut() {
                    if let Ok(ptr) = sub.alloc(size as usize) {
                        let block = Block {
                            ptr,
                            size: size as usize,
                            tag,
                        };
                        fill(&block);
                        child_blocks.push(block);
                    }
                }
                continue;
            }
            ArenaOperation::Reset => {
                blocks.clear();
                child = None;
                child_blocks.clear();
                // SAFETY: every block and the child were dropped above.
                unsafe { arena.reset() };
                assert_eq!(arena.committed_size(), 0);
                continue;
            }
            ArenaOperation::ResetChild => {
                child_blocks.clear();
                if let Some(sub) = child.as_mut() {
                    // SAFETY: the child's blocks were dropped above.
                    unsafe { sub.reset() };
                }
                continue;
            }
        };

        match result {
            Ok((ptr, size, zeroed_from)) => {
                let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), size) };
                assert!(bytes[zeroed_from..].iter().all(|b| *b == 0));
                let block = Block { ptr, size, tag };
                fill(&block);
                blocks.push(block);
            }
            Err(RuntimeError::AllocationExhausted { .. }) => {
                assert_eq!(arena.committed_size(), before);
            }
            Err(other) => panic!("unexpected error {:?}", other),
        }

        assert!(arena.committed_size() <= arena.capacity());
        for block in blocks.iter().chain(child_blocks.iter()) {
            assert!(intact(block));
        }
    }
}
