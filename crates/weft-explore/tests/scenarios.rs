//! End-to-end behaviour of controlled executions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use weft_explore::checker::Checker;
use weft_explore::config::{CheckerConfig, StrategyKind};
use weft_explore::programs;
use weft_replay::load_bug_record;
use weft_runtime::deadlock::monitors_deadlocked;
use weft_runtime::{
    program, Coordinator, CoordinatorState, DeadlockKind, DriverConfig, IterationResult, Outcome,
    Program, RandomStrategy, SchedulerDriver, SchedulerError, SearchStrategy, Shared,
};
use weft_trace::{EventKind, EventType, ExecutionTrace, MonitorId, ThreadId, Value};

/// Follows a fixed thread order, then falls back to the lowest id.
struct Scripted {
    order: Vec<u32>,
    pos: usize,
}

impl Scripted {
    fn new(order: &[u32]) -> Self {
        Self { order: order.to_vec(), pos: 0 }
    }
}

impl SearchStrategy for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn choose(
        &mut self,
        ready: &[ThreadId],
        _state: &CoordinatorState,
    ) -> Result<Option<ThreadId>, SchedulerError> {
        while let Some(&next) = self.order.get(self.pos) {
            self.pos += 1;
            if ready.contains(&ThreadId(next)) {
                return Ok(Some(ThreadId(next)));
            }
        }
        Ok(ready.first().copied())
    }

    fn done(&self) -> bool {
        false
    }
}

fn run_once(strategy: &mut dyn SearchStrategy, program: Program) -> IterationResult {
    let coordinator = Arc::new(Coordinator::new());
    let config = DriverConfig {
        max_events: 2_000,
        stall_timeout: Duration::from_secs(5),
    };
    SchedulerDriver::new(&coordinator, strategy, &config)
        .run(program)
        .unwrap()
}

fn demo(name: &str) -> Program {
    programs::find(name).unwrap().program
}

fn quiet(config: CheckerConfig) -> CheckerConfig {
    CheckerConfig {
        progress_interval: 0,
        stall_timeout_ms: 5_000,
        ..config
    }
}

/// Replays monitor events and checks ownership is never shared or forged.
fn check_monitor_safety(trace: &ExecutionTrace) -> Result<(), String> {
    let mut owners: BTreeMap<MonitorId, (ThreadId, u32)> = BTreeMap::new();
    for (i, event) in trace.events.iter().enumerate() {
        match &event.kind {
            EventKind::EnterMonitor { monitor } => match owners.get_mut(monitor) {
                Some((owner, depth)) if *owner == event.thread => *depth += 1,
                Some((owner, _)) => {
                    return Err(format!("event {}: {} entered {} held by {}", i, event.thread, monitor, owner))
                }
                None => {
                    owners.insert(*monitor, (event.thread, 1));
                }
            },
            EventKind::ExitMonitor { monitor } => match owners.get_mut(monitor) {
                Some((owner, depth)) if *owner == event.thread => {
                    *depth -= 1;
                    if *depth == 0 {
                        owners.remove(monitor);
                    }
                }
                _ => return Err(format!("event {}: {} exited {} it does not hold", i, event.thread, monitor)),
            },
            _ => {}
        }
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  Trace properties
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn mutual_exclusion_and_monitor_safety_hold_for_all_demos() {
    for demo in programs::catalog() {
        for seed in 0..15 {
            let result = run_once(&mut RandomStrategy::new(seed, 1), demo.program.clone());
            let trace = &result.trace;
            assert_eq!(trace.check_mutual_exclusion(), Ok(()), "{} seed {}", demo.name, seed);
            assert_eq!(trace.check_serials(), Ok(()), "{} seed {}", demo.name, seed);
            assert_eq!(check_monitor_safety(trace), Ok(()), "{} seed {}", demo.name, seed);
        }
    }
}

#[test]
fn detector_distinguishes_cycle_from_chain() {
    let (a, b) = (ThreadId(1), ThreadId(2));
    let (m1, m2) = (MonitorId(1), MonitorId(2));

    let owners = BTreeMap::from([(m1, a), (m2, b)]);
    let cycle = BTreeMap::from([(a, m2), (b, m1)]);
    assert!(monitors_deadlocked(&cycle, &owners));

    let chain = BTreeMap::from([(a, m2)]);
    assert!(!monitors_deadlocked(&chain, &owners));
}

// ═══════════════════════════════════════════════════════════════════════
//  Scenarios
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn scenario_1_opposite_lock_order_is_cycle() {
    // T1 takes M0, T2 takes M1, then each requests the other's monitor.
    let result = run_once(&mut Scripted::new(&[0, 0, 0, 0, 1, 2, 1, 2]), demo("lock-order"));
    assert_eq!(
        result.outcome,
        Outcome::Deadlock(DeadlockKind::Cycle { threads: vec![ThreadId(1), ThreadId(2)] })
    );
    let last = result.trace.failure_event().unwrap();
    assert_eq!(last.event_type(), EventType::Deadlock);
    assert_eq!(result.outcome.label(), "deadlock");
}

#[test]
fn scenario_2_join_on_stuck_worker_is_stalled_deadlock() {
    for seed in 0..10 {
        let result = run_once(&mut RandomStrategy::new(seed, 1), demo("join-stall"));
        assert_eq!(
            result.outcome,
            Outcome::Deadlock(DeadlockKind::Stalled { blocked: vec![ThreadId(0), ThreadId(1)] }),
            "seed {}",
            seed
        );
    }
}

/// Two threads, four shared-field accesses.
fn two_thread_accesses() -> Program {
    program(|ctx| {
        let x = Arc::new(Shared::new(ctx, "Main", "x", 0i64));
        let worker = {
            let x = Arc::clone(&x);
            ctx.spawn(move |ctx| {
                let v = x.read(ctx);
                x.write(ctx, v + 10);
            })
        };
        x.write(ctx, 1);
        x.read(ctx);
        worker.join(ctx);
    })
}

#[test]
fn scenario_3_same_seed_same_event_kinds() {
    let first = run_once(&mut RandomStrategy::new(42, 1), two_thread_accesses());
    let second = run_once(&mut RandomStrategy::new(42, 1), two_thread_accesses());

    assert_eq!(first.trace.event_types(), second.trace.event_types());
    let accesses = first
        .trace
        .events
        .iter()
        .filter(|e| matches!(e.event_type(), EventType::Read | EventType::Write))
        .count();
    assert_eq!(accesses, 4);
}

#[test]
fn scenario_4_read_observes_granted_write() {
    let program = program(|ctx| {
        let field = Arc::new(Shared::new(ctx, "Box", "x", 0i32));
        let writer = {
            let field = Arc::clone(&field);
            ctx.spawn(move |ctx| field.write(ctx, 7))
        };
        let reader = {
            let field = Arc::clone(&field);
            ctx.spawn(move |ctx| {
                field.read(ctx);
            })
        };
        writer.join(ctx);
        reader.join(ctx);
    });
    let result = run_once(&mut Scripted::new(&[0, 0, 0, 0, 1, 2]), program);

    let write = result.trace.events.iter().position(|e| e.event_type() == EventType::Write).unwrap();
    let read = result.trace.events.iter().position(|e| e.event_type() == EventType::Read).unwrap();
    assert!(write < read);
    assert!(matches!(
        &result.trace.events[read].kind,
        EventKind::Read { value: Value::Int(7), .. }
    ));
}

// ═══════════════════════════════════════════════════════════════════════
//  Sessions
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn random_search_finds_lost_update_and_replays_it() {
    let bugs = TempDir::new().unwrap();
    let checker = Checker::new(quiet(CheckerConfig {
        iterations: 300,
        seed: 7,
        fail_fast: true,
        bug_dir: Some(bugs.path().to_path_buf()),
        ..Default::default()
    }))
    .unwrap();

    let report = checker.check("racy-counter", demo("racy-counter")).unwrap();
    assert!(report.found_bug());
    assert!(report.stopped_early);
    let bug = &report.bugs[0];
    assert!(matches!(bug.outcome, Outcome::AssertionFailed { thread: ThreadId(0), .. }));

    let path = bug.record_path.clone().unwrap();
    assert!(path.exists());
    assert!(path.with_extension("md").exists());

    let record = load_bug_record(&path).unwrap();
    assert_eq!(record.trace, bug.trace);
    let replay = checker.replay(&record, demo("racy-counter")).unwrap();
    assert!(replay.reproduced(&record));
    assert_eq!(replay.result.trace, record.trace);
}

#[test]
fn replay_strategy_from_config_reproduces_deadlock() {
    let bugs = TempDir::new().unwrap();
    let search = Checker::new(quiet(CheckerConfig {
        iterations: 300,
        fail_fast: true,
        bug_dir: Some(bugs.path().to_path_buf()),
        ..Default::default()
    }))
    .unwrap();
    let found = search.check("lock-order", demo("lock-order")).unwrap();
    let path = found.bugs[0].record_path.clone().unwrap();

    let replay = Checker::new(quiet(CheckerConfig {
        iterations: 5,
        strategy: StrategyKind::Replay,
        replay_from: Some(path),
        ..Default::default()
    }))
    .unwrap();
    let report = replay.check("lock-order", demo("lock-order")).unwrap();

    // Replay runs exactly one iteration.
    assert_eq!(report.stats.iterations, 1);
    assert_eq!(report.stats.deadlocks, 1);
    assert_eq!(report.bugs[0].outcome, found.bugs[0].outcome);
    assert_eq!(report.bugs[0].trace, found.bugs[0].trace);
}

#[test]
fn recorded_stall_replays() {
    let bugs = TempDir::new().unwrap();
    let search = Checker::new(quiet(CheckerConfig {
        iterations: 10,
        fail_fast: true,
        bug_dir: Some(bugs.path().to_path_buf()),
        ..Default::default()
    }))
    .unwrap();
    let found = search.check("join-stall", demo("join-stall")).unwrap();
    let record = load_bug_record(found.bugs[0].record_path.as_ref().unwrap()).unwrap();
    assert_eq!(
        record.outcome,
        Outcome::Deadlock(DeadlockKind::Stalled { blocked: vec![ThreadId(0), ThreadId(1)] })
    );

    let replay = search.replay(&record, demo("join-stall")).unwrap();
    assert!(replay.reproduced(&record), "{}", replay.result.outcome);
    assert_eq!(replay.result.trace, record.trace);
}

#[test]
fn replay_against_other_program_is_mismatch() {
    let bugs = TempDir::new().unwrap();
    let search = Checker::new(quiet(CheckerConfig {
        iterations: 300,
        fail_fast: true,
        bug_dir: Some(bugs.path().to_path_buf()),
        ..Default::default()
    }))
    .unwrap();
    let found = search.check("racy-counter", demo("racy-counter")).unwrap();
    let record = load_bug_record(found.bugs[0].record_path.as_ref().unwrap()).unwrap();

    let replay = search.replay(&record, demo("join-stall")).unwrap();
    assert!(!replay.reproduced(&record));
    assert_eq!(replay.result.outcome.label(), "replay-mismatch");
}

#[test]
fn sessions_on_one_coordinator_are_isolated() {
    let checker = Checker::new(quiet(CheckerConfig {
        iterations: 40,
        seed: 3,
        ..Default::default()
    }))
    .unwrap();

    let mut first = checker.check("lock-order", demo("lock-order")).unwrap().stats;
    let mut second = checker.check("lock-order", demo("lock-order")).unwrap().stats;
    first.elapsed = Duration::ZERO;
    second.elapsed = Duration::ZERO;
    assert_eq!(first, second);

    checker.coordinator().reset();
    assert!(checker.coordinator().is_pristine());
}

#[test]
fn conflict_search_finds_lock_order_deadlock() {
    let checker = Checker::new(quiet(CheckerConfig {
        iterations: 100,
        strategy: StrategyKind::Conflict,
        fail_fast: true,
        ..Default::default()
    }))
    .unwrap();
    let report = checker.check("lock-order", demo("lock-order")).unwrap();
    assert!(report.found_bug());
    assert!(report.bugs[0].outcome.is_deadlock());
    assert_eq!(report.strategy, "conflict");
}

#[test]
fn conflict_search_finds_lost_update() {
    let checker = Checker::new(quiet(CheckerConfig {
        iterations: 100,
        strategy: StrategyKind::Conflict,
        fail_fast: true,
        ..Default::default()
    }))
    .unwrap();
    let report = checker.check("racy-counter", demo("racy-counter")).unwrap();
    assert!(report.found_bug());
    assert!(matches!(report.bugs[0].outcome, Outcome::AssertionFailed { .. }));
}

#[test]
fn conflict_strategy_reorders_messages() {
    let checker = Checker::new(quiet(CheckerConfig {
        iterations: 50,
        strategy: StrategyKind::Conflict,
        fail_fast: true,
        ..Default::default()
    }))
    .unwrap();
    let report = checker.check("mailbox-order", demo("mailbox-order")).unwrap();
    assert!(report.found_bug());
    let failure = report.bugs[0].trace.failure_event().unwrap();
    assert_eq!(failure.event_type(), EventType::Assert);
    let sends = report.bugs[0]
        .trace
        .events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Send { .. }))
        .count();
    assert_eq!(sends, 2);
}

#[test]
fn correct_programs_have_no_bugs() {
    for strategy in [StrategyKind::Random, StrategyKind::Conflict] {
        for name in ["locked-counter", "park-handoff", "cas-latch"] {
            let checker = Checker::new(quiet(CheckerConfig {
                iterations: 60,
                strategy,
                ..Default::default()
            }))
            .unwrap();
            let report = checker.check(name, demo(name)).unwrap();
            assert!(!report.found_bug(), "{} under {}", name, strategy);
            assert_eq!(report.stats.completed, report.stats.iterations);
        }
    }
}
