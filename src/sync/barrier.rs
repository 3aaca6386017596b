//! Reusable rendezvous point for a fixed number of parties.

use portable_atomic::{AtomicU32, Ordering};

use crate::invariant;
use crate::platform;

/// Blocks callers until `count` of them have arrived, then releases the whole
/// group and resets for the next round.
///
/// Every write made by any participant before its `wait` is visible to every
/// participant after its `wait` returns.
pub struct Barrier {
    count: u32,
    arrived: AtomicU32,
    /// Round counter; also the futex word waiters sleep on.
    generation: AtomicU32,
}

impl Barrier {
    /// Barrier for `count` parties.
    ///
    /// `count` must be at least one. Zero is a fatal assertion in debug
    /// builds; release builds treat it as one, so every `wait` returns
    /// immediately as the round leader.
    pub fn new(count: u32) -> Self {
        invariant!(count > 0, "Barrier needs at least one party");
        Self {
            count: count.max(1),
            arrived: AtomicU32::new(0),
            generation: AtomicU32::new(0),
        }
    }

    /// Party count this barrier was created with.
    pub fn parties(&self) -> u32 {
        self.count
    }

    /// Arrive and wait for the rest of the round.
    ///
    /// Returns `true` for exactly one caller per round (the last to arrive).
    pub fn wait(&self) -> bool {
        let generation = self.generation.load(Ordering::Acquire);
        let arrived = self.arrived.fetch_add(1, Ordering::AcqRel) + 1;

        if arrived == self.count {
            // Reset before publishing the new round so early re-entrants
            // count from zero.
            self.arrived.store(0, Ordering::Relaxed);
            self.generation.fetch_add(1, Ordering::Release);
            platform::wake_all(&self.generation);
            return true;
        }

        while self.generation.load(Ordering::Acquire) == generation {
            platform::wait(&self.generation, generation, None);
        }
        false
    }
}

impl core::fmt::Debug for Barrier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Barrier")
            .field("parties", &self.count)
            .field("arrived", &self.arrived.load(Ordering::Relaxed))
            .finish()
    }
}
