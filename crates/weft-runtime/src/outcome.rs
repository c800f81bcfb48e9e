//! Iteration outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;
use weft_trace::ThreadId;

/// How a deadlock was recognised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeadlockKind {
    /// A cycle in the blocked-on relation.
    Cycle { threads: Vec<ThreadId> },
    /// No thread can run but some are still blocked.
    Stalled { blocked: Vec<ThreadId> },
}

/// Why an iteration was cut short without a verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortReason {
    BudgetExceeded { limit: usize },
    ReplayMismatch { detail: String },
    /// `thread` made an assumption that does not hold; the execution is
    /// outside the space the program asked to explore.
    AssumeBlocked { thread: ThreadId },
}

/// Result of one controlled execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Completed,
    Deadlock(DeadlockKind),
    AssertionFailed { thread: ThreadId, message: String },
    Aborted(AbortReason),
}

impl Outcome {
    /// Deadlocks and assertion failures are bugs; aborts are inconclusive.
    pub fn is_bug(&self) -> bool {
        matches!(self, Outcome::Deadlock(_) | Outcome::AssertionFailed { .. })
    }

    pub fn is_deadlock(&self) -> bool {
        matches!(self, Outcome::Deadlock(_))
    }

    /// The execution was cut off by a failed assumption.
    pub fn is_pruned(&self) -> bool {
        matches!(self, Outcome::Aborted(AbortReason::AssumeBlocked { .. }))
    }

    /// Short label used in reports and file names.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Deadlock(_) => "deadlock",
            Outcome::AssertionFailed { .. } => "assertion",
            Outcome::Aborted(AbortReason::BudgetExceeded { .. }) => "budget-exceeded",
            Outcome::Aborted(AbortReason::ReplayMismatch { .. }) => "replay-mismatch",
            Outcome::Aborted(AbortReason::AssumeBlocked { .. }) => "assume-blocked",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed => f.write_str("completed"),
            Outcome::Deadlock(DeadlockKind::Cycle { threads }) => {
                write!(f, "deadlock (cycle:")?;
                for t in threads {
                    write!(f, " {}", t)?;
                }
                f.write_str(")")
            }
            Outcome::Deadlock(DeadlockKind::Stalled { blocked }) => {
                write!(f, "deadlock (stalled:")?;
                for t in blocked {
                    write!(f, " {}", t)?;
                }
                f.write_str(")")
            }
            Outcome::AssertionFailed { thread, message } => {
                write!(f, "assertion failed in {}: {}", thread, message)
            }
            Outcome::Aborted(AbortReason::BudgetExceeded { limit }) => {
                write!(f, "aborted: more than {} events", limit)
            }
            Outcome::Aborted(AbortReason::ReplayMismatch { detail }) => {
                write!(f, "aborted: replay mismatch: {}", detail)
            }
            Outcome::Aborted(AbortReason::AssumeBlocked { thread }) => {
                write!(f, "pruned: assumption failed in {}", thread)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bug_classification() {
        assert!(!Outcome::Completed.is_bug());
        assert!(Outcome::Deadlock(DeadlockKind::Stalled { blocked: vec![ThreadId(0)] }).is_bug());
        assert!(Outcome::AssertionFailed { thread: ThreadId(1), message: "x".into() }.is_bug());
        assert!(!Outcome::Aborted(AbortReason::BudgetExceeded { limit: 10 }).is_bug());
        let pruned = Outcome::Aborted(AbortReason::AssumeBlocked { thread: ThreadId(2) });
        assert!(!pruned.is_bug());
        assert!(pruned.is_pruned());
        assert_eq!(pruned.label(), "assume-blocked");
        assert_eq!(pruned.to_string(), "pruned: assumption failed in T2");
    }

    #[test]
    fn display_and_labels() {
        let o = Outcome::Deadlock(DeadlockKind::Cycle { threads: vec![ThreadId(1), ThreadId(2)] });
        assert_eq!(o.to_string(), "deadlock (cycle: T1 T2)");
        assert_eq!(o.label(), "deadlock");
        assert_eq!(
            Outcome::Aborted(AbortReason::BudgetExceeded { limit: 5 }).label(),
            "budget-exceeded"
        );
    }
}
