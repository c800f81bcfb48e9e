//! Schedule exploration for weft.
//!
//! This crate runs a program under test many times, each time under a
//! different thread schedule, and collects the deadlocks and assertion
//! failures it finds.
//!
//! # Architecture
//!
//! ```text
//! 1. Reset the coordinator → assert pristine
//! 2. strategy.begin_iteration
//! 3. SchedulerDriver::run(program) → IterationResult { outcome, trace }
//! 4. strategy.end_iteration(trace, outcome)
//!      conflict strategy: find conflicts → queue reversing prefixes
//! 5. Record outcome; persist bug record + markdown report
//! 6. Repeat until the iteration budget is spent, the strategy is done,
//!    or (fail-fast) the first bug
//! ```
//!
//! # Example Usage
//!
//! ```no_run
//! use weft_explore::checker::Checker;
//! use weft_explore::config::{CheckerConfig, StrategyKind};
//! use weft_explore::programs;
//! use weft_explore::report::format_report;
//!
//! let config = CheckerConfig {
//!     iterations: 500,
//!     strategy: StrategyKind::Conflict,
//!     fail_fast: true,
//!     ..Default::default()
//! };
//! let demo = programs::find("lock-order").unwrap();
//! let checker = Checker::new(config).unwrap();
//! let report = checker.check(demo.name, demo.program).unwrap();
//! println!("{}", format_report(&report));
//! ```
//!
//! # Module Structure
//!
//! - [`conflict`]: conflicting event pairs across grant windows
//! - [`coverage`]: conflict orderings seen so far
//! - [`frontier`]: priority queue of schedule prefixes
//! - [`guided`]: the conflict-guided search strategy
//! - [`config`]: session configuration
//! - [`checker`]: the iteration manager
//! - [`report`]: session reports
//! - [`programs`]: built-in demo programs
//!
//! # Determinism
//!
//! Every strategy is seeded, and all bookkeeping uses ordered collections,
//! so a session is reproducible from its configuration.

pub mod checker;
pub mod config;
pub mod conflict;
pub mod coverage;
pub mod frontier;
pub mod guided;
pub mod programs;
pub mod report;

// Re-export main types for convenience
pub use checker::{CheckError, CheckReport, CheckStats, Checker, FoundBug, ReplayReport};
pub use config::{CheckerConfig, ConfigError, StrategyKind};
pub use conflict::{find_conflicts, ConflictKey, ConflictPair};
pub use coverage::{ConflictCoverage, CoveragePoint, CoverageStats, CoverageTracker};
pub use frontier::{Frontier, FrontierEntry};
pub use guided::ConflictGuidedStrategy;
pub use programs::DemoProgram;
pub use report::format_report;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are accessible
        let _ = ConflictCoverage::new();
        let _ = CoverageTracker::new();
        let _ = Frontier::new(10);
        let _ = ConflictGuidedStrategy::new(42, 10, 10);
        let _ = CheckerConfig::default();
        assert_eq!(programs::catalog().len(), 7);
    }
}
