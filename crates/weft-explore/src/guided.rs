//! Conflict-guided search.
//!
//! ```text
//! iteration k:   force prefix p_k, then run non-preemptively
//!                      │
//!                      ▼
//!        trace + ready set at every grant
//!                      │  find_conflicts
//!                      ▼
//!   for each conflict (window i, window j > i):
//!     if second thread was ready at grant i
//!        candidate = schedule[..i] + [second thread]
//!                      │  unseen?  score by depth + new coverage
//!                      ▼
//!                  Frontier ──select──▶ p_{k+1}
//! ```
//!
//! Each candidate reorders one observed conflict by running the second
//! thread at the earliest grant where it could have run instead.

use crate::conflict::find_conflicts;
use crate::coverage::{ConflictCoverage, CoverageStats, CoveragePoint, CoverageTracker};
use crate::frontier::{Frontier, FrontierEntry};
use log::{debug, trace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeSet;
use weft_runtime::{CoordinatorState, Outcome, SchedulerError, SearchStrategy};
use weft_trace::{ExecutionTrace, ThreadId};

/// Systematic exploration by flipping observed conflicts.
#[derive(Debug)]
pub struct ConflictGuidedStrategy {
    max_iterations: u64,
    iterations_run: u64,
    frontier: Frontier,
    rng: ChaCha8Rng,
    coverage: CoverageTracker,
    /// Prefixes already run or queued.
    seen: BTreeSet<Vec<ThreadId>>,
    current: Option<FrontierEntry>,
    prefix: Vec<ThreadId>,
    /// Ready set at every grant of the current iteration.
    ready_sets: Vec<Vec<ThreadId>>,
    last: Option<ThreadId>,
    diverged: bool,
    divergences: u64,
}

impl ConflictGuidedStrategy {
    pub fn new(seed: u64, max_iterations: u64, frontier_size: usize) -> Self {
        let mut seen = BTreeSet::new();
        seen.insert(Vec::new());
        Self {
            max_iterations,
            iterations_run: 0,
            frontier: Frontier::new(frontier_size),
            rng: ChaCha8Rng::seed_from_u64(seed),
            coverage: CoverageTracker::new(),
            seen,
            current: None,
            prefix: Vec::new(),
            ready_sets: Vec::new(),
            last: None,
            diverged: false,
            divergences: 0,
        }
    }

    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    pub fn coverage(&self) -> &ConflictCoverage {
        self.coverage.global()
    }

    pub fn coverage_stats(&self) -> CoverageStats {
        self.coverage.stats()
    }

    /// Prefix forced in the current iteration.
    pub fn prefix(&self) -> &[ThreadId] {
        &self.prefix
    }

    /// Iterations whose forced prefix could not be followed to the end.
    pub fn divergences(&self) -> u64 {
        self.divergences
    }

    /// Non-preemptive default: keep running the last thread if possible.
    fn default_choice(&self, ready: &[ThreadId]) -> Option<ThreadId> {
        match self.last {
            Some(last) if ready.contains(&last) => Some(last),
            _ => ready.iter().min().copied(),
        }
    }

    /// Queue every unseen conflict-reversing prefix of `trace`.
    fn expand(&mut self, trace: &ExecutionTrace) {
        let pairs = find_conflicts(trace);
        let iteration_coverage = ConflictCoverage::from_pairs(&pairs);
        let global = self.coverage.global().clone();
        let schedule = trace.schedule();
        let parent = self.current.as_ref().map(|e| e.id);

        let mut queued = 0;
        for pair in &pairs {
            let i = pair.first_window;
            let Some(ready) = self.ready_sets.get(i) else {
                continue;
            };
            if !ready.contains(&pair.second_thread) || schedule[i] == pair.second_thread {
                continue;
            }
            let mut candidate = schedule[..i].to_vec();
            candidate.push(pair.second_thread);
            if !self.seen.insert(candidate.clone()) {
                continue;
            }
            // The reversed ordering is what the candidate is meant to reach.
            let reversed = CoveragePoint {
                key: pair.key.clone(),
                first: (pair.second_thread, pair.second_type),
                second: (pair.first_thread, pair.first_type),
            };
            let novelty = if global.contains(&reversed) || iteration_coverage.contains(&reversed) {
                0.0
            } else {
                2.0
            };
            let depth_bonus = i as f64 / (1 + schedule.len()) as f64;
            let score = 1.0 + novelty + depth_bonus;
            trace!("candidate {:?} (score {:.2}) from {}", candidate, score, pair.key);
            self.frontier.push(FrontierEntry::new(candidate, score, parent));
            queued += 1;
        }
        self.coverage.update_global(&iteration_coverage);
        debug!(
            "{} conflicts, {} new prefixes, frontier {}",
            pairs.len(),
            queued,
            self.frontier.len()
        );
    }
}

impl SearchStrategy for ConflictGuidedStrategy {
    fn name(&self) -> &'static str {
        "conflict"
    }

    fn begin_iteration(&mut self, _iteration: u64) {
        self.current = if self.iterations_run == 0 {
            None
        } else {
            self.frontier.select(&mut self.rng)
        };
        self.prefix = self.current.as_ref().map(|e| e.prefix.clone()).unwrap_or_default();
        self.ready_sets.clear();
        self.last = None;
        self.diverged = false;
    }

    fn choose(
        &mut self,
        ready: &[ThreadId],
        _state: &CoordinatorState,
    ) -> Result<Option<ThreadId>, SchedulerError> {
        let position = self.ready_sets.len();
        if let Some(&wanted) = self.prefix.get(position) {
            if ready.contains(&wanted) {
                return Ok(Some(wanted));
            }
            if !self.diverged {
                debug!("prefix wants {} at grant {} but ready is {:?}", wanted, position, ready);
                self.diverged = true;
            }
        }
        Ok(self.default_choice(ready))
    }

    fn granted(&mut self, thread: ThreadId, ready: &[ThreadId]) {
        self.ready_sets.push(ready.to_vec());
        self.last = Some(thread);
    }

    fn end_iteration(&mut self, trace: &ExecutionTrace, outcome: &Outcome) {
        self.iterations_run += 1;
        if self.diverged {
            self.divergences += 1;
        }
        if matches!(outcome, Outcome::Aborted(_)) && !outcome.is_pruned() {
            debug!("not expanding aborted iteration ({})", outcome);
            return;
        }
        self.expand(trace);
    }

    fn done(&self) -> bool {
        self.iterations_run >= self.max_iterations
            || (self.iterations_run > 0 && self.frontier.is_empty())
    }
}
