//! Scheduler errors.

use crate::registry::ThreadHandle;
use thiserror::Error;
use weft_trace::ThreadId;

/// Errors raised by the coordinator, the driver or a search strategy.
///
/// Failures of the program under test (deadlocks, assertion violations,
/// budget exhaustion) are not errors: they are [`crate::outcome::Outcome`]s.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("thread handle {0} is already registered")]
    DuplicateRegistration(ThreadHandle),

    #[error("unknown thread {0}")]
    UnknownThread(ThreadId),

    #[error("replay diverged at grant {position}: {detail}")]
    ReplayMismatch { position: usize, detail: String },

    #[error("lost wakeup: {0}")]
    LostWakeup(String),

    #[error("failed to spawn thread for {thread}: {reason}")]
    ThreadSpawn { thread: ThreadId, reason: String },
}

impl SchedulerError {
    /// Errors that end the current iteration but let the run continue.
    pub fn is_iteration_fatal(&self) -> bool {
        matches!(self, SchedulerError::ReplayMismatch { .. })
    }
}
