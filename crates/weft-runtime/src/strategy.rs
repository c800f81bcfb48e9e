//! Search strategy interface and the shared thread-selection procedure.
//!
//! A strategy only decides *which* ready thread to try next and *when*
//! exploration is over. Resolving a candidate's outstanding monitor, join
//! or receive request, suspending it when that request cannot be
//! satisfied, and retrying is the same for every strategy and lives in
//! [`pick_next_thread`].

use crate::coordinator::CoordinatorState;
use crate::error::SchedulerError;
use crate::outcome::Outcome;
use log::trace;
use weft_trace::{Event, ExecutionTrace, ThreadId};

/// Pluggable scheduling policy.
pub trait SearchStrategy {
    /// Short name used in logs and bug records.
    fn name(&self) -> &'static str;

    /// Called before each iteration, with its index.
    fn begin_iteration(&mut self, _iteration: u64) {}

    /// Pick one of `ready` (never empty, sorted by id).
    ///
    /// Returning `None` ends the iteration as if nothing were ready.
    fn choose(
        &mut self,
        ready: &[ThreadId],
        state: &CoordinatorState,
    ) -> Result<Option<ThreadId>, SchedulerError>;

    /// `thread` was granted; `ready` is the set it was chosen from.
    fn granted(&mut self, _thread: ThreadId, _ready: &[ThreadId]) {}

    /// Observe every event before it is appended to the trace.
    fn record_event(&mut self, _event: &Event) -> Result<(), SchedulerError> {
        Ok(())
    }

    /// Called after each iteration with its trace and outcome.
    fn end_iteration(&mut self, _trace: &ExecutionTrace, _outcome: &Outcome) {}

    /// No further iterations are useful.
    fn done(&self) -> bool;
}

/// Choose, resolve and grant the next thread.
///
/// Returns `None` when no ready thread can proceed.
pub fn pick_next_thread(
    state: &mut CoordinatorState,
    strategy: &mut dyn SearchStrategy,
) -> Result<Option<ThreadId>, SchedulerError> {
    loop {
        let ready = state.ready_threads();
        if ready.is_empty() {
            return Ok(None);
        }
        let Some(candidate) = strategy.choose(&ready, state)? else {
            return Ok(None);
        };
        if !ready.contains(&candidate) {
            return Err(SchedulerError::UnknownThread(candidate));
        }
        match state.resolve(candidate)? {
            Some(events) => {
                state.grant(candidate)?;
                strategy.granted(candidate, &ready);
                for kind in events {
                    state.emit(candidate, kind, strategy)?;
                }
                trace!("granted {} from {:?}", candidate, ready);
                return Ok(Some(candidate));
            }
            None => {
                trace!("{} cannot proceed, suspending", candidate);
                state.suspend(candidate)?;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::coordinator::{PendingRequest, Request};
    use crate::registry::{ThreadHandle, ThreadState};
    use weft_trace::{EventKind, MonitorId};

    /// Always picks the lowest ready id.
    #[derive(Debug, Default)]
    pub(crate) struct FirstReady;

    impl SearchStrategy for FirstReady {
        fn name(&self) -> &'static str {
            "first-ready"
        }

        fn choose(
            &mut self,
            ready: &[ThreadId],
            _state: &CoordinatorState,
        ) -> Result<Option<ThreadId>, SchedulerError> {
            Ok(ready.first().copied())
        }

        fn done(&self) -> bool {
            false
        }
    }

    fn dispatch(state: &mut CoordinatorState, thread: u32, request: Request) {
        state
            .dispatch(PendingRequest { thread: ThreadId(thread), request }, &mut FirstReady)
            .unwrap();
    }

    #[test]
    fn picks_and_grants_root() {
        let mut state = CoordinatorState::new();
        state.register_root(ThreadHandle(0)).unwrap();
        let picked = pick_next_thread(&mut state, &mut FirstReady).unwrap();
        assert_eq!(picked, Some(ThreadId(0)));
        assert_eq!(state.registry().state(ThreadId(0)).unwrap(), ThreadState::Running);
        assert_eq!(state.trace().schedule(), vec![ThreadId(0)]);
    }

    #[test]
    fn blocked_candidate_is_suspended_and_next_tried() {
        let mut state = CoordinatorState::new();
        state.register_root(ThreadHandle(0)).unwrap();
        let t1 = state.register_thread(ThreadHandle(1)).unwrap();
        dispatch(&mut state, 0, Request::Start { callee: t1 });
        dispatch(&mut state, 1, Request::EnterMonitor { monitor: MonitorId(5) });
        dispatch(&mut state, 0, Request::EnterMonitor { monitor: MonitorId(5) });

        // T0 is lowest but waits on M5 held by T1.
        let picked = pick_next_thread(&mut state, &mut FirstReady).unwrap();
        assert_eq!(picked, Some(t1));
        assert!(state.suspended_threads().contains(&ThreadId(0)));
    }

    #[test]
    fn resolution_events_follow_grant() {
        let mut state = CoordinatorState::new();
        state.register_root(ThreadHandle(0)).unwrap();
        let t1 = state.register_thread(ThreadHandle(1)).unwrap();
        dispatch(&mut state, 0, Request::Start { callee: t1 });
        dispatch(&mut state, 1, Request::Finish);
        dispatch(&mut state, 0, Request::Join { target: t1 });
        // Join on a finished thread resolves at dispatch.
        assert_eq!(
            state.trace().events.last().unwrap().kind,
            EventKind::Join { target: t1 }
        );

        let t2 = state.register_thread(ThreadHandle(2)).unwrap();
        dispatch(&mut state, 0, Request::Start { callee: t2 });
        dispatch(&mut state, 2, Request::EnterMonitor { monitor: MonitorId(1) });
        dispatch(&mut state, 0, Request::EnterMonitor { monitor: MonitorId(1) });
        dispatch(&mut state, 2, Request::ExitMonitor { monitor: MonitorId(1) });

        let picked = pick_next_thread(&mut state, &mut FirstReady).unwrap();
        assert_eq!(picked, Some(ThreadId(0)));
        let last = state.trace().events.last().unwrap();
        assert_eq!(last.thread, ThreadId(0));
        assert_eq!(last.kind, EventKind::EnterMonitor { monitor: MonitorId(1) });
        assert_eq!(state.trace().grants.last().unwrap().first_event, state.trace().len() - 1);
    }

    #[test]
    fn nothing_ready_returns_none() {
        let mut state = CoordinatorState::new();
        state.register_root(ThreadHandle(0)).unwrap();
        dispatch(&mut state, 0, Request::Park);
        assert_eq!(pick_next_thread(&mut state, &mut FirstReady).unwrap(), None);
    }
}
