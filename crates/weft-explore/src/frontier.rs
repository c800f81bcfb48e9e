//! Frontier: priority queue of schedule prefixes still to explore.

use rand::Rng;
use weft_trace::ThreadId;

/// A schedule prefix with its metadata for prioritization.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    /// Unique ID for this entry.
    pub id: u64,
    /// Grants to force at the start of the iteration.
    pub prefix: Vec<ThreadId>,
    /// Score: higher = more interesting.
    pub score: f64,
    /// Number of grants in the prefix that were inherited unchanged.
    pub depth: usize,
    /// Entry whose run produced this prefix.
    pub parent: Option<u64>,
}

impl FrontierEntry {
    pub fn new(prefix: Vec<ThreadId>, score: f64, parent: Option<u64>) -> Self {
        let depth = prefix.len().saturating_sub(1);
        Self { id: 0, prefix, score, depth, parent }
    }
}

/// Priority queue of prefixes to explore.
#[derive(Debug)]
pub struct Frontier {
    entries: Vec<FrontierEntry>,
    next_id: u64,
    max_size: usize,
    epsilon: f64,
}

impl Frontier {
    /// Create a new frontier with a maximum size.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
            max_size,
            epsilon: 0.1,
        }
    }

    /// Probability of picking a random entry instead of the best one.
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    /// Add an entry, assigning its ID. Prunes if over capacity.
    pub fn push(&mut self, mut entry: FrontierEntry) -> u64 {
        entry.id = self.next_id;
        self.next_id += 1;
        let id = entry.id;

        self.entries.push(entry);

        // Highest score first; ties keep insertion order.
        self.entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if self.entries.len() > self.max_size {
            self.prune();
        }
        id
    }

    /// Remove and return the next entry to explore.
    ///
    /// Epsilon-greedy: usually the highest score, sometimes a random entry.
    pub fn select(&mut self, rng: &mut impl Rng) -> Option<FrontierEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let index = if rng.gen::<f64>() < self.epsilon {
            rng.gen_range(0..self.entries.len())
        } else {
            0
        };
        Some(self.entries.remove(index))
    }

    /// Number of entries in the frontier.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get all entries (for inspection/debugging).
    pub fn entries(&self) -> &[FrontierEntry] {
        &self.entries
    }

    /// Keep only the top `max_size` entries by score.
    fn prune(&mut self) {
        if self.entries.len() <= self.max_size {
            return;
        }
        // Already sorted by score descending, just truncate
        self.entries.truncate(self.max_size);
        log::debug!("Frontier pruned to {} entries", self.max_size);
    }
}
