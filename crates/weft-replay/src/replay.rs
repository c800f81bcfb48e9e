//! Replay strategy: re-run a recorded schedule and check that the program
//! produces the same events.
//!
//! At every scheduling point the strategy grants the thread the recording
//! granted at that position. Every emitted event is checked against the
//! recording: a different acting thread or event kind is a
//! [`SchedulerError::ReplayMismatch`], which aborts the iteration.
//! Payload differences are logged but tolerated, so a replay still
//! reaches the recorded failure when only values drift. Once the recorded
//! grants run out, the replay ends quietly if every ready thread is
//! blocked, which is how a recorded stall is reproduced.

use crate::record::BugRecord;
use log::{debug, warn};
use weft_runtime::{CoordinatorState, Outcome, SchedulerError, SearchStrategy};
use weft_trace::{Event, ExecutionTrace, ThreadId};

/// Follows a recorded grant schedule.
#[derive(Debug, Clone)]
pub struct ReplayStrategy {
    expected: ExecutionTrace,
    grant_cursor: usize,
    event_cursor: usize,
    payload_drift: usize,
    iterations_run: u64,
}

impl ReplayStrategy {
    pub fn new(expected: ExecutionTrace) -> Self {
        Self {
            expected,
            grant_cursor: 0,
            event_cursor: 0,
            payload_drift: 0,
            iterations_run: 0,
        }
    }

    pub fn from_record(record: &BugRecord) -> Self {
        Self::new(record.trace.clone())
    }

    pub fn expected(&self) -> &ExecutionTrace {
        &self.expected
    }

    /// Whether every recorded grant and event has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.grant_cursor >= self.expected.grants.len() && self.event_cursor >= self.expected.len()
    }

    /// Events whose payload differed from the recording.
    pub fn payload_drift(&self) -> usize {
        self.payload_drift
    }

    fn mismatch(&self, detail: String) -> SchedulerError {
        SchedulerError::ReplayMismatch {
            position: self.grant_cursor,
            detail,
        }
    }
}

impl SearchStrategy for ReplayStrategy {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn begin_iteration(&mut self, _iteration: u64) {
        self.grant_cursor = 0;
        self.event_cursor = 0;
        self.payload_drift = 0;
    }

    fn choose(
        &mut self,
        ready: &[ThreadId],
        state: &CoordinatorState,
    ) -> Result<Option<ThreadId>, SchedulerError> {
        match self.expected.grants.get(self.grant_cursor) {
            None if ready.iter().all(|&t| state.is_blocked(t)) => {
                debug!("recorded schedule ended with {:?} blocked", ready);
                Ok(None)
            }
            None => Err(self.mismatch(format!(
                "recorded schedule ended but {} thread(s) are ready: {:?}",
                ready.len(),
                ready
            ))),
            Some(grant) if ready.contains(&grant.thread) => Ok(Some(grant.thread)),
            Some(grant) => Err(self.mismatch(format!(
                "recording grants {} but it cannot run (ready: {:?})",
                grant.thread, ready
            ))),
        }
    }

    fn granted(&mut self, _thread: ThreadId, _ready: &[ThreadId]) {
        self.grant_cursor += 1;
    }

    fn record_event(&mut self, event: &Event) -> Result<(), SchedulerError> {
        let Some(expected) = self.expected.events.get(self.event_cursor) else {
            return Err(self.mismatch(format!("unexpected extra event {}", event)));
        };
        if expected.thread != event.thread || expected.event_type() != event.event_type() {
            return Err(self.mismatch(format!(
                "event {} expected {} but got {}",
                self.event_cursor, expected, event
            )));
        }
        if expected != event {
            warn!("event {} payload differs: expected {}, got {}", self.event_cursor, expected, event);
            self.payload_drift += 1;
        }
        self.event_cursor += 1;
        Ok(())
    }

    fn end_iteration(&mut self, _trace: &ExecutionTrace, outcome: &Outcome) {
        self.iterations_run += 1;
        if !self.is_exhausted() {
            debug!(
                "replay ended ({}) after {}/{} events",
                outcome,
                self.event_cursor,
                self.expected.len()
            );
        }
    }

    fn done(&self) -> bool {
        self.iterations_run >= 1
    }
}
