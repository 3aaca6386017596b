#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use multicore_rt::{Builder, JoinOutcome, Semaphore, Thread};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Arbitrary)]
enum WorkType {
    Spin(u16),
    TakePermit,
    Sleep(u8),
}

#[derive(Debug, Arbitrary)]
enum ThreadOperation {
    Launch { work: WorkType, named: bool },
    Join { index: usize, timeout_ms: u8 },
    Detach(usize),
    Rename(usize),
    ReleasePermit,
    CheckState(usize),
}

struct Shared {
    permits: Semaphore,
    finished: AtomicU64,
}

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);

    let operations: Result<Vec<ThreadOperation>, _> = (0..48)
        .map(|_| ThreadOperation::arbitrary(&mut u))
        .collect();

    if let Ok(ops) = operations {
        fuzz_thread_lifecycle(ops);
    }
});

fn run_work(work: WorkType, shared: &Shared) {
    match work {
        WorkType::Spin(n) => {
            let mut acc = 0u64;
            for i in 0..n as u64 {
                acc = acc.wrapping_add(i);
            }
            std::hint::black_box(acc);
        }
        WorkType::TakePermit => shared.permits.acquire(),
        WorkType::Sleep(ms) => std::thread::sleep(Duration::from_millis(ms as u64 % 8)),
    }
    shared.finished.fetch_add(1, Ordering::SeqCst);
}

fn fuzz_thread_lifecycle(operations: Vec<ThreadOperation>) {
    let shared = Arc::new(Shared {
        permits: Semaphore::new(0),
        finished: AtomicU64::new(0),
    });
    let mut handles: Vec<Thread> = Vec::new();
    let mut launched = 0u64;
    let mut waiting_for_permit = 0u32;

    for op in operations {
        match op {
            ThreadOperation::Launch { work, named } => {
                if handles.len() >= 16 {
                    continue;
                }
                if matches!(work, WorkType::TakePermit) {
                    waiting_for_permit += 1;
                }
                let builder = if named {
                    Builder::new().name(format!("fuzz-{}", launched))
                } else {
                    Builder::new()
                };
                let result = builder.launch(
                    move |shared: Arc<Shared>| run_work(work, &shared),
                    shared.clone(),
                );
                match result {
                    Ok(handle) => {
                        handles.push(handle);
                        launched += 1;
                    }
                    Err(_) => {
                        // Launch can fail under resource limits.
                    }
                }
            }
            ThreadOperation::Join { index, timeout_ms } => {
                if index < handles.len() {
                    let handle = handles.remove(index);
                    let timeout = Duration::from_millis(timeout_ms as u64 % 16);
                    if let JoinOutcome::TimedOut(handle) = handle.join(Some(timeout)) {
                        handles.push(handle);
                    }
                }
            }
            ThreadOperation::Detach(index) => {
                if index < handles.len() {
                    handles.remove(index).detach();
                }
            }
            ThreadOperation::Rename(index) => {
                if let Some(handle) = handles.get(index) {
                    handle.set_name("fuzz-renamed");
                    assert_eq!(handle.name().as_deref(), Some("fuzz-renamed"));
                }
            }
            ThreadOperation::ReleasePermit => {
                shared.permits.release();
            }
            ThreadOperation::CheckState(index) => {
                if let Some(handle) = handles.get(index) {
                    let _ = handle.state();
                }
            }
        }
    }

    // Unblock every permit taker, then wait for all threads.
    for _ in 0..waiting_for_permit {
        shared.permits.release();
    }
    for handle in handles {
        assert!(handle.join(None).is_finished());
    }
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while shared.finished.load(Ordering::SeqCst) < launched && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(shared.finished.load(Ordering::SeqCst), launched);
}
