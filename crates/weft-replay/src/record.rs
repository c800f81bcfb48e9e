//! Bug records: everything needed to reproduce a failing iteration.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use weft_runtime::Outcome;
use weft_trace::ExecutionTrace;

/// Current on-disk format.
pub const FORMAT_VERSION: u32 = 1;

/// A persisted failing (or otherwise interesting) iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugRecord {
    pub format_version: u32,
    /// Name of the program under test.
    pub program: String,
    /// Strategy that found the schedule.
    pub strategy: String,
    pub seed: u64,
    /// Index of the iteration within its run.
    pub iteration: u64,
    /// When the record was made (Unix timestamp).
    pub timestamp: u64,
    pub outcome: Outcome,
    pub trace: ExecutionTrace,
}

impl BugRecord {
    pub fn new(
        program: impl Into<String>,
        strategy: impl Into<String>,
        seed: u64,
        iteration: u64,
        outcome: Outcome,
        trace: ExecutionTrace,
    ) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            format_version: FORMAT_VERSION,
            program: program.into(),
            strategy: strategy.into(),
            seed,
            iteration,
            timestamp,
            outcome,
            trace,
        }
    }

    /// File name used when persisting into a bug directory.
    pub fn file_stem(&self) -> String {
        format!("{}-{}-{:04}", self.program, self.outcome.label(), self.iteration)
    }
}
