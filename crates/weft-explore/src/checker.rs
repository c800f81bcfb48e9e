//! The iteration manager: run a program many times under one strategy.
//!
//! One [`Coordinator`] serves the whole session. Before every iteration it
//! is reset and checked to be pristine, so no state leaks from one
//! iteration into the next. Deadlocks, assertion failures and aborted
//! iterations are recorded and the session moves on; scheduler errors end
//! the session.

use crate::config::{CheckerConfig, ConfigError, StrategyKind};
use crate::guided::ConflictGuidedStrategy;
use log::{debug, info, warn};
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use weft_replay::{
    load_bug_record, save_bug_record, save_bug_report, BugRecord, ReplayStrategy, SerializeError,
};
use weft_runtime::{
    AbortReason, Coordinator, DriverConfig, IterationResult, Outcome, Program, RandomStrategy,
    SchedulerDriver, SchedulerError, SearchStrategy,
};
use weft_trace::verifier::{DeterminismVerifier, VerificationResult};
use weft_trace::ExecutionTrace;

/// Errors that end a checking session.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("bug record error: {0}")]
    Serialize(#[from] SerializeError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("coordinator not pristine before iteration {iteration}")]
    DirtyCoordinator { iteration: u64 },
}

// ═══════════════════════════════════════════════════════════════════════
//  Statistics
// ═══════════════════════════════════════════════════════════════════════

/// Counters over a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckStats {
    pub iterations: u64,
    pub completed: u64,
    pub deadlocks: u64,
    pub assertion_failures: u64,
    pub budget_exceeded: u64,
    pub replay_mismatches: u64,
    /// Iterations cut off by a failed assumption.
    pub pruned: u64,
    pub total_events: u64,
    /// Distinct grant sequences seen.
    pub unique_schedules: usize,
    pub elapsed: Duration,
}

impl CheckStats {
    pub fn bugs(&self) -> u64 {
        self.deadlocks + self.assertion_failures
    }

    fn record(&mut self, outcome: &Outcome, events: usize) {
        self.iterations += 1;
        self.total_events += events as u64;
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Deadlock(_) => self.deadlocks += 1,
            Outcome::AssertionFailed { .. } => self.assertion_failures += 1,
            Outcome::Aborted(AbortReason::BudgetExceeded { .. }) => self.budget_exceeded += 1,
            Outcome::Aborted(AbortReason::ReplayMismatch { .. }) => self.replay_mismatches += 1,
            Outcome::Aborted(AbortReason::AssumeBlocked { .. }) => self.pruned += 1,
        }
    }
}

/// A failing iteration.
#[derive(Debug, Clone)]
pub struct FoundBug {
    pub iteration: u64,
    pub outcome: Outcome,
    pub trace: ExecutionTrace,
    /// Where the bug record was written, if persisted.
    pub record_path: Option<PathBuf>,
}

/// Result of a checking session.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub program: String,
    pub strategy: String,
    pub seed: u64,
    pub stats: CheckStats,
    pub bugs: Vec<FoundBug>,
    /// Whether the session stopped at the first bug.
    pub stopped_early: bool,
}

impl CheckReport {
    pub fn found_bug(&self) -> bool {
        !self.bugs.is_empty()
    }
}

/// Result of replaying one bug record.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub result: IterationResult,
    pub verification: VerificationResult,
}

impl ReplayReport {
    /// Same outcome and an identical trace.
    pub fn reproduced(&self, record: &BugRecord) -> bool {
        self.result.outcome == record.outcome && self.verification.is_deterministic
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Checker
// ═══════════════════════════════════════════════════════════════════════

/// Runs iterations of a program and collects their outcomes.
pub struct Checker {
    config: CheckerConfig,
    coordinator: Arc<Coordinator>,
}

impl Checker {
    pub fn new(config: CheckerConfig) -> Result<Self, CheckError> {
        config.validate()?;
        Ok(Self {
            config,
            coordinator: Arc::new(Coordinator::new()),
        })
    }

    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Build the strategy named by the configuration.
    pub fn build_strategy(&self) -> Result<Box<dyn SearchStrategy>, CheckError> {
        let config = &self.config;
        Ok(match config.strategy {
            StrategyKind::Random => Box::new(RandomStrategy::new(config.seed, config.iterations)),
            StrategyKind::Conflict => Box::new(ConflictGuidedStrategy::new(
                config.seed,
                config.iterations,
                config.frontier_size,
            )),
            StrategyKind::Replay => {
                let path = config
                    .replay_from
                    .as_deref()
                    .ok_or(ConfigError::MissingReplaySource)?;
                Box::new(ReplayStrategy::from_record(&load_bug_record(path)?))
            }
        })
    }

    /// Check `program` under the configured strategy.
    pub fn check(&self, name: &str, program: Program) -> Result<CheckReport, CheckError> {
        let mut strategy = self.build_strategy()?;
        self.check_with(name, program, strategy.as_mut())
    }

    /// Check `program` under a caller-supplied strategy.
    pub fn check_with(
        &self,
        name: &str,
        program: Program,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<CheckReport, CheckError> {
        let driver_config = self.config.driver_config();
        let started = Instant::now();
        let mut stats = CheckStats::default();
        let mut schedules = BTreeSet::new();
        let mut bugs = Vec::new();
        let mut stopped_early = false;

        info!(
            "checking {} with {} strategy: up to {} iterations, seed {}",
            name,
            strategy.name(),
            self.config.iterations,
            self.config.seed
        );

        for iteration in 0..self.config.iterations {
            if strategy.done() {
                debug!("strategy {} done after {} iterations", strategy.name(), iteration);
                break;
            }

            let result = self.run_iteration(iteration, &program, strategy, &driver_config)?;
            stats.record(&result.outcome, result.trace.len());
            schedules.insert(schedule_hash(&result.trace));

            if result.outcome.is_bug() {
                warn!("iteration {}: {}", iteration, result.outcome);
                let record_path = self.persist(name, strategy.name(), iteration, &result)?;
                bugs.push(FoundBug {
                    iteration,
                    outcome: result.outcome.clone(),
                    trace: result.trace,
                    record_path,
                });
                if self.config.fail_fast {
                    info!("fail-fast: stopping after first bug");
                    stopped_early = true;
                    break;
                }
            } else {
                debug!("iteration {}: {}", iteration, result.outcome);
            }

            let interval = self.config.progress_interval;
            if interval > 0 && (iteration + 1) % interval == 0 {
                info!(
                    "progress: {}/{} iterations, {} bugs, {} unique schedules",
                    iteration + 1,
                    self.config.iterations,
                    stats.bugs(),
                    schedules.len()
                );
            }
        }

        stats.unique_schedules = schedules.len();
        stats.elapsed = started.elapsed();
        Ok(CheckReport {
            program: name.to_string(),
            strategy: strategy.name().to_string(),
            seed: self.config.seed,
            stats,
            bugs,
            stopped_early,
        })
    }

    /// Replay `record` against `program` and compare the traces.
    pub fn replay(&self, record: &BugRecord, program: Program) -> Result<ReplayReport, CheckError> {
        let mut strategy = ReplayStrategy::from_record(record);
        let result = self.run_iteration(0, &program, &mut strategy, &self.config.driver_config())?;
        let verification = DeterminismVerifier::compare(&record.trace, &result.trace);
        if !verification.is_deterministic {
            warn!("replay of {} diverged from the record", record.file_stem());
        }
        Ok(ReplayReport { result, verification })
    }

    fn run_iteration(
        &self,
        iteration: u64,
        program: &Program,
        strategy: &mut dyn SearchStrategy,
        driver_config: &DriverConfig,
    ) -> Result<IterationResult, CheckError> {
        self.coordinator.reset();
        if !self.coordinator.is_pristine() {
            return Err(CheckError::DirtyCoordinator { iteration });
        }
        strategy.begin_iteration(iteration);
        let result = SchedulerDriver::new(&self.coordinator, strategy, driver_config)
            .run(Arc::clone(program))?;
        strategy.end_iteration(&result.trace, &result.outcome);
        Ok(result)
    }

    /// Write the bug record and markdown report, if a bug directory is set.
    fn persist(
        &self,
        program: &str,
        strategy: &str,
        iteration: u64,
        result: &IterationResult,
    ) -> Result<Option<PathBuf>, CheckError> {
        let Some(dir) = &self.config.bug_dir else {
            return Ok(None);
        };
        fs::create_dir_all(dir)?;
        let record = BugRecord::new(
            program,
            strategy,
            self.config.seed,
            iteration,
            result.outcome.clone(),
            result.trace.clone(),
        );
        let stem = record.file_stem();
        let path = dir.join(format!("{}.json", stem));
        save_bug_record(&record, &path)?;
        save_bug_report(&record, &dir.join(format!("{}.md", stem)))?;
        info!("saved bug record to {}", path.display());
        Ok(Some(path))
    }
}

fn schedule_hash(trace: &ExecutionTrace) -> u64 {
    let mut hasher = DefaultHasher::new();
    trace.schedule().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_runtime::{program, Shared};
    use weft_trace::ThreadId;

    fn config(iterations: u64) -> CheckerConfig {
        CheckerConfig {
            iterations,
            progress_interval: 0,
            stall_timeout_ms: 5_000,
            ..Default::default()
        }
    }

    #[test]
    fn counts_every_iteration() {
        let checker = Checker::new(config(5)).unwrap();
        let report = checker.check("empty", program(|_| {})).unwrap();
        assert_eq!(report.stats.iterations, 5);
        assert_eq!(report.stats.completed, 5);
        assert_eq!(report.stats.total_events, 5);
        assert_eq!(report.stats.unique_schedules, 1);
        assert!(!report.found_bug());
    }

    #[test]
    fn assertion_failures_collected() {
        let checker = Checker::new(config(3)).unwrap();
        let report = checker
            .check("always-fails", program(|ctx| ctx.check(false, "boom")))
            .unwrap();
        assert_eq!(report.stats.assertion_failures, 3);
        assert_eq!(report.bugs.len(), 3);
        assert!(report.bugs.iter().all(|b| b.record_path.is_none()));
    }

    #[test]
    fn fail_fast_stops_at_first_bug() {
        let checker = Checker::new(CheckerConfig { fail_fast: true, ..config(10) }).unwrap();
        let report = checker
            .check("always-fails", program(|ctx| ctx.check(false, "boom")))
            .unwrap();
        assert_eq!(report.stats.iterations, 1);
        assert!(report.stopped_early);
    }

    #[test]
    fn budget_exceeded_is_not_a_bug() {
        let checker = Checker::new(CheckerConfig { max_events: 50, ..config(2) }).unwrap();
        let report = checker
            .check(
                "spin",
                program(|ctx| loop {
                    ctx.unpark(ctx.id());
                }),
            )
            .unwrap();
        assert_eq!(report.stats.budget_exceeded, 2);
        assert!(!report.found_bug());
    }

    #[test]
    fn failed_assumptions_are_pruned_not_bugs() {
        let checker = Checker::new(CheckerConfig { strategy: StrategyKind::Conflict, ..config(20) }).unwrap();
        let report = checker
            .check(
                "assume-order",
                program(|ctx| {
                    let flag = Arc::new(Shared::new(ctx, "Order", "first", false));
                    let setter = {
                        let flag = Arc::clone(&flag);
                        ctx.spawn(move |ctx| flag.write(ctx, true))
                    };
                    let seen = flag.read(ctx);
                    ctx.assume(seen);
                    setter.join(ctx);
                }),
            )
            .unwrap();
        assert_eq!(report.stats.completed + report.stats.pruned, report.stats.iterations);
        assert!(report.stats.pruned > 0);
        assert!(!report.found_bug());
    }

    #[test]
    fn stats_classify_outcomes() {
        let mut stats = CheckStats::default();
        stats.record(&Outcome::Completed, 3);
        stats.record(&Outcome::Aborted(AbortReason::ReplayMismatch { detail: "x".into() }), 2);
        stats.record(&Outcome::Aborted(AbortReason::AssumeBlocked { thread: ThreadId(1) }), 1);
        assert_eq!(stats.iterations, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.replay_mismatches, 1);
        assert_eq!(stats.pruned, 1);
        assert_eq!(stats.total_events, 6);
        assert_eq!(stats.bugs(), 0);
    }

    #[test]
    fn invalid_config_rejected() {
        let err = Checker::new(config(0)).err().unwrap();
        assert!(matches!(err, CheckError::Config(ConfigError::NoIterations)));
    }
}
