use std::cell::UnsafeCell;
use std::sync::Arc;
use std::time::{Duration, Instant};

use multicore_rt::{launch, run_lanes, Arena, Barrier, LaneContext, Mutex, RuntimeConfig, Semaphore};

struct Counter {
    lock: Mutex,
    value: UnsafeCell<u64>,
}

unsafe impl Sync for Counter {}

fn per_op(elapsed: Duration, ops: u64) -> Duration {
    elapsed / ops.max(1) as u32
}

fn benchmark_uncontended_mutex() {
    const OPS: u64 = 1_000_000;
    let counter = Counter {
        lock: Mutex::new(),
        value: UnsafeCell::new(0),
    };

    let start = Instant::now();
    for _ in 0..OPS {
        counter.lock.lock();
        unsafe { *counter.value.get() += 1 };
        counter.lock.unlock();
    }
    let elapsed = start.elapsed();
    println!("{} lock/unlock pairs in: {:?}", OPS, elapsed);
    println!("Average per pair: {:?}", per_op(elapsed, OPS));
}

fn benchmark_contended_mutex(threads: u64) {
    const OPS_PER_THREAD: u64 = 100_000;
    let counter = Arc::new(Counter {
        lock: Mutex::new(),
        value: UnsafeCell::new(0),
    });

    let start = Instant::now();
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            launch(
                |counter: Arc<Counter>| {
                    for _ in 0..OPS_PER_THREAD {
                        let _guard = counter.lock.guard();
                        unsafe { *counter.value.get() += 1 };
                    }
                },
                counter.clone(),
            )
            .expect("launch failed")
        })
        .collect();
    for handle in handles {
        let _ = handle.join(None);
    }
    let elapsed = start.elapsed();
    let total = threads * OPS_PER_THREAD;
    println!("{} threads, {} total increments in: {:?}", threads, total, elapsed);
    println!("Average per increment: {:?}", per_op(elapsed, total));
}

fn benchmark_barrier(parties: u32) {
    const ROUNDS: u64 = 10_000;
    let barrier = Arc::new(Barrier::new(parties));

    let start = Instant::now();
    let handles: Vec<_> = (0..parties)
        .map(|_| {
            launch(
                |barrier: Arc<Barrier>| {
                    for _ in 0..ROUNDS {
                        barrier.wait();
                    }
                },
                barrier.clone(),
            )
            .expect("launch failed")
        })
        .collect();
    for handle in handles {
        let _ = handle.join(None);
    }
    let elapsed = start.elapsed();
    println!("{} parties, {} rounds in: {:?}", parties, ROUNDS, elapsed);
    println!("Average per round: {:?}", per_op(elapsed, ROUNDS));
}

fn benchmark_semaphore_handoff() {
    const OPS: u64 = 100_000;
    let ping = Arc::new((Semaphore::new(0), Semaphore::new(0)));

    let start = Instant::now();
    let partner = launch(
        |pair: Arc<(Semaphore, Semaphore)>| {
            for _ in 0..OPS {
                pair.0.acquire();
                pair.1.release();
            }
        },
        ping.clone(),
    )
    .expect("launch failed");
    for _ in 0..OPS {
        ping.0.release();
        ping.1.acquire();
    }
    let _ = partner.join(None);
    let elapsed = start.elapsed();
    println!("{} round trips in: {:?}", OPS, elapsed);
    println!("Average per round trip: {:?}", per_op(elapsed, OPS));
}

fn benchmark_thread_launch() {
    const THREADS: u64 = 500;
    let start = Instant::now();
    for _ in 0..THREADS {
        let handle = launch(|_: ()| {}, ()).expect("launch failed");
        let _ = handle.join(None);
    }
    let elapsed = start.elapsed();
    println!("Launched and joined {} threads in: {:?}", THREADS, elapsed);
    println!("Average per thread: {:?}", per_op(elapsed, THREADS));
}

fn benchmark_arena() {
    const OPS: u64 = 1_000_000;
    let mut buffer = vec![0u8; 1 << 20];
    let mut arena = Arena::from_buffer(&mut buffer);

    let start = Instant::now();
    for _ in 0..OPS {
        if arena.alloc(48).is_err() {
            // SAFETY: the returned blocks are never used.
            unsafe { arena.reset() };
        }
    }
    let elapsed = start.elapsed();
    println!("{} 48-byte allocations in: {:?}", OPS, elapsed);
    println!("Average per allocation: {:?}", per_op(elapsed, OPS));
}

fn benchmark_lanes() {
    const TOTAL: u64 = 50_000_000;
    let config = RuntimeConfig::new().with_scratch_size(4096);
    let mut buffer = vec![0u8; config.lane_count * 8192];
    let mut arena = Arena::from_buffer(&mut buffer);

    let start = Instant::now();
    run_lanes(&config, &mut arena, |ctx: &mut LaneContext<'_>| {
        let partial = ctx.range(TOTAL).fold(0u64, |acc, i| acc.wrapping_add(i));
        std::hint::black_box(partial);
        ctx.sync();
    })
    .expect("lane run failed");
    let elapsed = start.elapsed();
    println!("{} lanes summed {} items in: {:?}", config.lane_count, TOTAL, elapsed);
}

fn main() {
    println!("\n=== multicore-rt Synchronization Benchmarks ===\n");

    println!("Benchmark 1: Uncontended Mutex");
    println!("------------------------------");
    benchmark_uncontended_mutex();

    println!("\nBenchmark 2: Contended Mutex");
    println!("----------------------------");
    for threads in [2, 4, 8] {
        benchmark_contended_mutex(threads);
    }

    println!("\nBenchmark 3: Barrier Rounds");
    println!("---------------------------");
    for parties in [2, 4] {
        benchmark_barrier(parties);
    }

    println!("\nBenchmark 4: Semaphore Handoff");
    println!("------------------------------");
    benchmark_semaphore_handoff();

    println!("\nBenchmark 5: Thread Launch");
    println!("--------------------------");
    benchmark_thread_launch();

    println!("\nBenchmark 6: Arena Allocation");
    println!("-----------------------------");
    benchmark_arena();

    println!("\nBenchmark 7: Lane Run");
    println!("---------------------");
    benchmark_lanes();

    println!("\n=== Benchmarks Complete ===\n");
}
