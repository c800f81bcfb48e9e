//! Seeded random search strategy.
//!
//! Picks uniformly among the ready threads at every scheduling point.
//! The generator is seeded once per session and its stream continues
//! across iterations, so each iteration explores a different schedule
//! while the whole session is reproducible from the seed.

use crate::coordinator::CoordinatorState;
use crate::error::SchedulerError;
use crate::outcome::Outcome;
use crate::strategy::SearchStrategy;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use weft_trace::{ExecutionTrace, ThreadId};

/// Uniform random choice among ready threads.
#[derive(Debug, Clone)]
pub struct RandomStrategy {
    seed: u64,
    rng: ChaCha20Rng,
    iterations_run: u64,
    max_iterations: u64,
}

impl RandomStrategy {
    pub fn new(seed: u64, max_iterations: u64) -> Self {
        let mut rng_key = [0u8; 32];
        // Domain-separated seed for the schedule RNG
        let derived = seed.wrapping_add(0x5743_4845_4430); // "WCHED0"
        rng_key[..8].copy_from_slice(&derived.to_le_bytes());
        Self {
            seed,
            rng: ChaCha20Rng::from_seed(rng_key),
            iterations_run: 0,
            max_iterations,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn iterations_run(&self) -> u64 {
        self.iterations_run
    }
}

impl SearchStrategy for RandomStrategy {
    fn name(&self) -> &'static str {
        "random"
    }

    fn choose(
        &mut self,
        ready: &[ThreadId],
        _state: &CoordinatorState,
    ) -> Result<Option<ThreadId>, SchedulerError> {
        if ready.is_empty() {
            return Ok(None);
        }
        let index = self.rng.gen_range(0..ready.len());
        Ok(Some(ready[index]))
    }

    fn end_iteration(&mut self, _trace: &ExecutionTrace, _outcome: &Outcome) {
        self.iterations_run += 1;
    }

    fn done(&self) -> bool {
        self.iterations_run >= self.max_iterations
    }
}
