//! Scheduler driver: the single control loop of one iteration.
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │ wait for pending request (condvar, timeout)  │◀─┐
//!   └──────────────────────┬───────────────────────┘  │
//!                          ▼                          │
//!   ┌──────────────────────────────────────────────┐  │
//!   │ dispatch to coordinator handler              │  │
//!   └──────────────────────┬───────────────────────┘  │
//!                          ▼                          │
//!        verdict set? ── yes ──▶ terminate            │
//!        over budget? ── yes ──▶ BudgetExceeded       │
//!                          ▼                          │
//!   ┌──────────────────────────────────────────────┐  │
//!   │ pick_next_thread → grant its permit          │──┘
//!   └──────────────────────┬───────────────────────┘
//!                          ▼ nothing runnable
//!            Completed or Deadlock(Stalled)
//! ```
//!
//! The driver runs on the caller's thread. The root logical thread runs
//! on its own OS thread and is granted first.

use crate::context::{launch, ThreadCtx};
use crate::coordinator::{Coordinator, PendingRequest};
use crate::error::SchedulerError;
use crate::outcome::{AbortReason, Outcome};
use crate::registry::Signal;
use crate::strategy::{pick_next_thread, SearchStrategy};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::time::Duration;
use weft_trace::ExecutionTrace;

/// The program under test: the body of the root thread.
pub type Program = Arc<dyn Fn(&ThreadCtx) + Send + Sync>;

/// Wrap a closure as a [`Program`].
pub fn program<F>(f: F) -> Program
where
    F: Fn(&ThreadCtx) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-iteration limits.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Abort the iteration once the trace holds more events than this.
    /// Zero disables the limit.
    pub max_events: usize,
    /// How long the driver waits for a granted thread to post its next
    /// request before declaring a lost wakeup.
    pub stall_timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_events: 10_000,
            stall_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of one iteration.
#[derive(Debug, Clone)]
pub struct IterationResult {
    pub outcome: Outcome,
    pub trace: ExecutionTrace,
}

/// Drives one iteration of a program under a search strategy.
pub struct SchedulerDriver<'a> {
    coordinator: &'a Arc<Coordinator>,
    strategy: &'a mut dyn SearchStrategy,
    config: &'a DriverConfig,
}

impl<'a> SchedulerDriver<'a> {
    pub fn new(
        coordinator: &'a Arc<Coordinator>,
        strategy: &'a mut dyn SearchStrategy,
        config: &'a DriverConfig,
    ) -> Self {
        Self { coordinator, strategy, config }
    }

    /// Run `program` to completion, deadlock, failure or abort.
    ///
    /// Every program thread has exited when this returns, except after a
    /// lost wakeup, where hung threads are left behind.
    pub fn run(mut self, program: Program) -> Result<IterationResult, SchedulerError> {
        let result = self.drive(program);
        self.coordinator.terminate();
        if !matches!(result, Err(SchedulerError::LostWakeup(_))) {
            self.coordinator.join_os_threads();
        }
        let outcome = result?;
        let trace = self.coordinator.state().take_trace();
        debug!("iteration finished: {} ({} events)", outcome, trace.len());
        Ok(IterationResult { outcome, trace })
    }

    fn drive(&mut self, program: Program) -> Result<Outcome, SchedulerError> {
        let handle = self.coordinator.new_handle();
        let (root, permit) = {
            let mut state = self.coordinator.state();
            let root = state.register_root(handle)?;
            (root, state.registry().permit(root)?)
        };
        let ctx = ThreadCtx::new(Arc::clone(self.coordinator), root, permit);
        let join = launch(ctx, move |ctx| (*program)(ctx)).map_err(|e| SchedulerError::ThreadSpawn {
            thread: root,
            reason: e.to_string(),
        })?;
        self.coordinator.adopt(join);

        if let Some(outcome) = self.schedule_next()? {
            return Ok(outcome);
        }
        loop {
            let pending = self.coordinator.wait_for_request(self.config.stall_timeout)?;
            if let Some(outcome) = self.step(pending)? {
                return Ok(outcome);
            }
        }
    }

    /// Dispatch one request and grant the next thread.
    fn step(&mut self, pending: PendingRequest) -> Result<Option<Outcome>, SchedulerError> {
        {
            let mut state = self.coordinator.state();
            match state.dispatch(pending, &mut *self.strategy) {
                Ok(()) => {}
                Err(e) if e.is_iteration_fatal() => return Ok(Some(abort_outcome(e))),
                Err(e) => return Err(e),
            }
            if let Some(outcome) = state.take_verdict() {
                return Ok(Some(outcome));
            }
            let limit = self.config.max_events;
            if limit > 0 && state.trace().len() > limit {
                warn!("event budget of {} exceeded", limit);
                return Ok(Some(Outcome::Aborted(AbortReason::BudgetExceeded { limit })));
            }
        }
        self.schedule_next()
    }

    fn schedule_next(&mut self) -> Result<Option<Outcome>, SchedulerError> {
        let mut state = self.coordinator.state();
        match pick_next_thread(&mut state, &mut *self.strategy) {
            Ok(Some(thread)) => {
                let permit = state.registry().permit(thread)?;
                drop(state);
                trace!("grant -> {}", thread);
                permit.grant(Signal::Run);
                Ok(None)
            }
            Ok(None) => Ok(Some(state.quiescent_outcome())),
            Err(e) if e.is_iteration_fatal() => Ok(Some(abort_outcome(e))),
            Err(e) => Err(e),
        }
    }
}

fn abort_outcome(error: SchedulerError) -> Outcome {
    warn!("iteration aborted: {}", error);
    Outcome::Aborted(AbortReason::ReplayMismatch { detail: error.to_string() })
}
