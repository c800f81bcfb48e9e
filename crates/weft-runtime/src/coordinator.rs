//! Runtime coordinator: the shared scheduling state and its request
//! handlers.
//!
//! # Ownership model
//!
//! ```text
//!   program thread ──post(PendingRequest)──▶ pending slot ◀──wait── driver
//!        ▲                                  (own lock+cond)           │
//!        │                                                            ▼
//!        └──── Permit::grant(Run) ◀──── pick_next_thread ◀──── dispatch
//!                                              │                      │
//!                                              └── CoordinatorState ◀─┘
//! ```
//!
//! [`CoordinatorState`] is only mutated by the driver, while every program
//! thread is parked on its own permit. The pending-request slot is the one
//! piece of state shared with a waking program thread, and it has its own
//! lock and condition variable.

use crate::deadlock::WaitForGraph;
use crate::error::SchedulerError;
use crate::outcome::{AbortReason, DeadlockKind, Outcome};
use crate::registry::{Permit, Reply, Signal, ThreadHandle, ThreadRegistry, ThreadState};
use crate::strategy::SearchStrategy;
use log::{debug, error, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use weft_trace::{Event, EventKind, ExecutionTrace, Location, MonitorId, ObjectId, ThreadId, Value};

// ═══════════════════════════════════════════════════════════════════════
//  Requests
// ═══════════════════════════════════════════════════════════════════════

/// A hook operation posted by a program thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Register { handle: ThreadHandle },
    Start { callee: ThreadId },
    Join { target: ThreadId },
    EnterMonitor { monitor: MonitorId },
    ExitMonitor { monitor: MonitorId },
    Read { location: Location, value: Value },
    Write { location: Location, value: Value },
    /// A compare-and-swap whose effect has already been applied.
    Cas { location: Location, expected: Value, new: Value, success: bool },
    Assume { holds: bool },
    Send { receiver: ThreadId, tag: Option<u64>, value: Value },
    /// Take the oldest message matching `tag` (any message for `None`).
    Receive { tag: Option<u64>, blocking: bool },
    Park,
    Unpark { target: ThreadId },
    AssertFailure { message: String },
    /// Plain scheduling point with no event.
    Yield,
    Finish,
    SpawnFailed { callee: ThreadId, reason: String },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Register { .. } => "register",
            Request::Start { .. } => "start",
            Request::Join { .. } => "join",
            Request::EnterMonitor { .. } => "enter-monitor",
            Request::ExitMonitor { .. } => "exit-monitor",
            Request::Read { .. } => "read",
            Request::Write { .. } => "write",
            Request::Cas { .. } => "cas",
            Request::Assume { .. } => "assume",
            Request::Send { .. } => "send",
            Request::Receive { .. } => "receive",
            Request::Park => "park",
            Request::Unpark { .. } => "unpark",
            Request::AssertFailure { .. } => "assert",
            Request::Yield => "yield",
            Request::Finish => "finish",
            Request::SpawnFailed { .. } => "spawn-failed",
        }
    }
}

/// A request together with the thread that posted it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub thread: ThreadId,
    pub request: Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MonitorHold {
    owner: ThreadId,
    depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Message {
    sender: ThreadId,
    tag: Option<u64>,
    value: Value,
}

impl Message {
    fn matches(&self, tag: Option<u64>) -> bool {
        tag.map_or(true, |wanted| self.tag == Some(wanted))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Coordinator state
// ═══════════════════════════════════════════════════════════════════════

/// All per-iteration scheduling state.
#[derive(Debug, Default)]
pub struct CoordinatorState {
    registry: ThreadRegistry,
    /// Registered and not yet finished.
    created: BTreeSet<ThreadId>,
    /// Started, not finished, not suspended or parked. Includes threads
    /// whose monitor, join or receive request is awaiting resolution.
    ready: BTreeSet<ThreadId>,
    suspended: BTreeSet<ThreadId>,
    parked: BTreeSet<ThreadId>,
    monitors: BTreeMap<MonitorId, MonitorHold>,
    monitor_requests: BTreeMap<ThreadId, MonitorId>,
    join_requests: BTreeMap<ThreadId, ThreadId>,
    /// Undelivered messages per receiver, oldest first.
    mailboxes: BTreeMap<ThreadId, VecDeque<Message>>,
    receive_requests: BTreeMap<ThreadId, Option<u64>>,
    trace: ExecutionTrace,
    /// The iteration-scoped abort flag, carrying the verdict.
    verdict: Option<Outcome>,
}

impl CoordinatorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub fn trace(&self) -> &ExecutionTrace {
        &self.trace
    }

    pub fn take_trace(&mut self) -> ExecutionTrace {
        std::mem::take(&mut self.trace)
    }

    pub fn created_threads(&self) -> &BTreeSet<ThreadId> {
        &self.created
    }

    /// Ready threads in id order.
    pub fn ready_threads(&self) -> Vec<ThreadId> {
        self.ready.iter().copied().collect()
    }

    pub fn suspended_threads(&self) -> &BTreeSet<ThreadId> {
        &self.suspended
    }

    pub fn parked_threads(&self) -> &BTreeSet<ThreadId> {
        &self.parked
    }

    pub fn monitor_requests(&self) -> &BTreeMap<ThreadId, MonitorId> {
        &self.monitor_requests
    }

    pub fn join_requests(&self) -> &BTreeMap<ThreadId, ThreadId> {
        &self.join_requests
    }

    /// Current owner of every held monitor.
    pub fn monitor_owners(&self) -> BTreeMap<MonitorId, ThreadId> {
        self.monitors.iter().map(|(&m, hold)| (m, hold.owner)).collect()
    }

    pub fn monitor_owner(&self, monitor: MonitorId) -> Option<ThreadId> {
        self.monitors.get(&monitor).map(|hold| hold.owner)
    }

    /// Threads in a blocking receive, with the tag each one waits for.
    pub fn receive_requests(&self) -> &BTreeMap<ThreadId, Option<u64>> {
        &self.receive_requests
    }

    /// Number of undelivered messages addressed to `thread`.
    pub fn pending_messages(&self, thread: ThreadId) -> usize {
        self.mailboxes.get(&thread).map_or(0, VecDeque::len)
    }

    /// Whether `thread` has an outstanding monitor, join or receive
    /// request that cannot be satisfied in the current state.
    pub fn is_blocked(&self, thread: ThreadId) -> bool {
        if let Some(monitor) = self.monitor_requests.get(&thread) {
            return self.monitors.contains_key(monitor);
        }
        if let Some(&target) = self.join_requests.get(&thread) {
            return self.registry.state(target).map(ThreadState::is_live).unwrap_or(false);
        }
        if let Some(&tag) = self.receive_requests.get(&thread) {
            return !self
                .mailboxes
                .get(&thread)
                .is_some_and(|mailbox| mailbox.iter().any(|m| m.matches(tag)));
        }
        false
    }

    pub fn verdict(&self) -> Option<&Outcome> {
        self.verdict.as_ref()
    }

    pub fn take_verdict(&mut self) -> Option<Outcome> {
        self.verdict.take()
    }

    /// Whether every map, set and counter is empty.
    pub fn is_pristine(&self) -> bool {
        self.registry.is_empty()
            && self.created.is_empty()
            && self.ready.is_empty()
            && self.suspended.is_empty()
            && self.parked.is_empty()
            && self.monitors.is_empty()
            && self.monitor_requests.is_empty()
            && self.join_requests.is_empty()
            && self.mailboxes.is_empty()
            && self.receive_requests.is_empty()
            && self.trace.is_empty()
            && self.trace.grants.is_empty()
            && self.verdict.is_none()
    }

    /// The first verdict wins.
    fn set_verdict(&mut self, outcome: Outcome) {
        if self.verdict.is_none() {
            debug!("iteration verdict: {}", outcome);
            self.verdict = Some(outcome);
        }
    }

    // ───────────────────────────────────────────────────────────────────
    //  Registration
    // ───────────────────────────────────────────────────────────────────

    /// Register a thread handle. New threads are Created, not Ready.
    pub fn register_thread(&mut self, handle: ThreadHandle) -> Result<ThreadId, SchedulerError> {
        let id = self.registry.register(handle)?;
        self.created.insert(id);
        debug!("registered {} as {}", handle, id);
        Ok(id)
    }

    /// Register the root thread, which is Ready immediately.
    pub fn register_root(&mut self, handle: ThreadHandle) -> Result<ThreadId, SchedulerError> {
        let id = self.register_thread(handle)?;
        self.ready.insert(id);
        self.registry.set_state(id, ThreadState::Ready)?;
        Ok(id)
    }

    /// Append an event for `thread`, assigning its next serial.
    pub fn emit(
        &mut self,
        thread: ThreadId,
        kind: EventKind,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        let serial = self.registry.next_serial(thread)?;
        let event = Event::new(thread, serial, kind);
        trace!("{}", event);
        strategy.record_event(&event)?;
        self.trace.push(event);
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────────
    //  Dispatch
    // ───────────────────────────────────────────────────────────────────

    /// Apply a posted request. The poster is no longer running afterwards.
    pub fn dispatch(
        &mut self,
        pending: PendingRequest,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        let PendingRequest { thread, request } = pending;
        trace!("dispatch {} from {}", request.name(), thread);
        if self.registry.state(thread)? == ThreadState::Running {
            self.registry.set_state(thread, ThreadState::Ready)?;
        }

        match request {
            Request::Register { handle } => self.handle_register(thread, handle),
            Request::Start { callee } => self.handle_start(thread, callee, strategy),
            Request::Join { target } => self.handle_join(thread, target, strategy),
            Request::EnterMonitor { monitor } => self.handle_enter_monitor(thread, monitor, strategy),
            Request::ExitMonitor { monitor } => self.handle_exit_monitor(thread, monitor, strategy),
            Request::Read { location, value } => {
                self.emit(thread, EventKind::Read { location, value }, strategy)
            }
            Request::Write { location, value } => {
                self.emit(thread, EventKind::Write { location, value }, strategy)
            }
            Request::Cas { location, expected, new, success } => {
                self.emit(thread, EventKind::Cas { location, expected, new, success }, strategy)
            }
            Request::Assume { holds } => self.handle_assume(thread, holds, strategy),
            Request::Send { receiver, tag, value } => self.handle_send(thread, receiver, tag, value, strategy),
            Request::Receive { tag, blocking } => self.handle_receive(thread, tag, blocking, strategy),
            Request::Park => self.handle_park(thread, strategy),
            Request::Unpark { target } => self.handle_unpark(thread, target, strategy),
            Request::AssertFailure { message } => self.handle_assert_failure(thread, message, strategy),
            Request::Yield => Ok(()),
            Request::Finish => self.handle_finish(thread, strategy),
            Request::SpawnFailed { callee, reason } => {
                Err(SchedulerError::ThreadSpawn { thread: callee, reason })
            }
        }
    }

    fn handle_register(&mut self, caller: ThreadId, handle: ThreadHandle) -> Result<(), SchedulerError> {
        let id = match self.registry.lookup(handle) {
            Some(existing) => {
                warn!("{}", SchedulerError::DuplicateRegistration(handle));
                existing
            }
            None => self.register_thread(handle)?,
        };
        let permit = self.registry.permit(id)?;
        self.registry
            .get(caller)?
            .permit
            .set_reply(Reply::Registered { id, permit });
        Ok(())
    }

    fn handle_start(
        &mut self,
        caller: ThreadId,
        callee: ThreadId,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        if self.registry.state(callee)? != ThreadState::Created {
            warn!("{} started {} which is not in the created state", caller, callee);
            return Ok(());
        }
        self.ready.insert(callee);
        self.registry.set_state(callee, ThreadState::Ready)?;
        self.emit(caller, EventKind::Start { callee }, strategy)
    }

    fn handle_join(
        &mut self,
        thread: ThreadId,
        target: ThreadId,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        if self.registry.state(target)? == ThreadState::Finished {
            return self.emit(thread, EventKind::Join { target }, strategy);
        }
        debug!("{} waits to join {}", thread, target);
        self.join_requests.insert(thread, target);
        self.registry.set_state(thread, ThreadState::WaitingOnJoin)?;
        self.check_for_deadlock(thread, strategy)
    }

    fn handle_enter_monitor(
        &mut self,
        thread: ThreadId,
        monitor: MonitorId,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        match self.monitor_owner(monitor) {
            None => {
                self.monitors.insert(monitor, MonitorHold { owner: thread, depth: 1 });
            }
            Some(owner) if owner == thread => {
                if let Some(hold) = self.monitors.get_mut(&monitor) {
                    hold.depth += 1;
                }
            }
            Some(owner) => {
                debug!("{} requests {} held by {}", thread, monitor, owner);
                self.emit(thread, EventKind::MonitorRequest { monitor }, strategy)?;
                self.monitor_requests.insert(thread, monitor);
                self.registry.set_state(thread, ThreadState::WaitingOnMonitor)?;
                return self.check_for_deadlock(thread, strategy);
            }
        }
        self.emit(thread, EventKind::EnterMonitor { monitor }, strategy)
    }

    fn handle_exit_monitor(
        &mut self,
        thread: ThreadId,
        monitor: MonitorId,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        if self.monitor_owner(monitor) != Some(thread) {
            let message = format!("{} exited {} without owning it", thread, monitor);
            return self.handle_assert_failure(thread, message, strategy);
        }
        self.emit(thread, EventKind::ExitMonitor { monitor }, strategy)?;

        let released = match self.monitors.get_mut(&monitor) {
            Some(hold) => {
                hold.depth -= 1;
                hold.depth == 0
            }
            None => false,
        };
        if released {
            self.monitors.remove(&monitor);
            self.emit(thread, EventKind::Release { monitor }, strategy)?;
            self.wake_monitor_waiters(monitor)?;
        }
        Ok(())
    }

    fn handle_park(&mut self, thread: ThreadId, strategy: &mut dyn SearchStrategy) -> Result<(), SchedulerError> {
        self.emit(thread, EventKind::Park, strategy)?;
        let logical = self.registry.get_mut(thread)?;
        if logical.parking_permit {
            logical.parking_permit = false;
            return Ok(());
        }
        logical.state = ThreadState::Parked;
        self.ready.remove(&thread);
        self.parked.insert(thread);
        Ok(())
    }

    fn handle_unpark(
        &mut self,
        thread: ThreadId,
        target: ThreadId,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        let target_state = self.registry.state(target)?;
        self.emit(thread, EventKind::Unpark { target }, strategy)?;
        if self.parked.remove(&target) {
            self.ready.insert(target);
            self.registry.set_state(target, ThreadState::Ready)?;
        } else if target_state.is_live() {
            self.registry.get_mut(target)?.parking_permit = true;
        }
        Ok(())
    }

    fn handle_assume(
        &mut self,
        thread: ThreadId,
        holds: bool,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        self.emit(thread, EventKind::Assume { holds }, strategy)?;
        if !holds {
            debug!("assumption failed in {}, pruning the execution", thread);
            self.set_verdict(Outcome::Aborted(AbortReason::AssumeBlocked { thread }));
        }
        Ok(())
    }

    fn handle_send(
        &mut self,
        sender: ThreadId,
        receiver: ThreadId,
        tag: Option<u64>,
        value: Value,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        let receiver_state = self.registry.state(receiver)?;
        self.emit(sender, EventKind::Send { receiver, tag, value: value.clone() }, strategy)?;
        if !receiver_state.is_live() {
            debug!("{} sent to finished {}, message dropped", sender, receiver);
            return Ok(());
        }
        self.mailboxes
            .entry(receiver)
            .or_default()
            .push_back(Message { sender, tag, value });
        if self.suspended.contains(&receiver) && !self.is_blocked(receiver) {
            self.unsuspend(receiver, ThreadState::WaitingOnMessage)?;
        }
        Ok(())
    }

    fn handle_receive(
        &mut self,
        thread: ThreadId,
        tag: Option<u64>,
        blocking: bool,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        if let Some(received) = self.take_message(thread, tag)? {
            return self.emit(thread, received, strategy);
        }
        if !blocking {
            return self.emit(thread, EventKind::Receive { sender: None, value: Value::Null }, strategy);
        }
        debug!("{} waits for a message", thread);
        self.emit(thread, EventKind::ReceiveRequest { tag }, strategy)?;
        self.receive_requests.insert(thread, tag);
        self.registry.set_state(thread, ThreadState::WaitingOnMessage)
    }

    /// Pop the oldest message for `thread` matching `tag`, hand its value
    /// to the thread and return the receive event.
    fn take_message(&mut self, thread: ThreadId, tag: Option<u64>) -> Result<Option<EventKind>, SchedulerError> {
        let Some(mailbox) = self.mailboxes.get_mut(&thread) else {
            return Ok(None);
        };
        let Some(index) = mailbox.iter().position(|m| m.matches(tag)) else {
            return Ok(None);
        };
        let Some(message) = mailbox.remove(index) else {
            return Ok(None);
        };
        if mailbox.is_empty() {
            self.mailboxes.remove(&thread);
        }
        self.registry
            .get(thread)?
            .permit
            .set_reply(Reply::Received { value: message.value.clone() });
        Ok(Some(EventKind::Receive { sender: Some(message.sender), value: message.value }))
    }

    fn handle_assert_failure(
        &mut self,
        thread: ThreadId,
        message: String,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        warn!("assertion failed in {}: {}", thread, message);
        self.emit(thread, EventKind::Assert { message: message.clone() }, strategy)?;
        self.set_verdict(Outcome::AssertionFailed { thread, message });
        Ok(())
    }

    fn handle_finish(&mut self, thread: ThreadId, strategy: &mut dyn SearchStrategy) -> Result<(), SchedulerError> {
        self.emit(thread, EventKind::Finish, strategy)?;
        self.created.remove(&thread);
        self.ready.remove(&thread);
        self.suspended.remove(&thread);
        self.parked.remove(&thread);
        if let Some(unread) = self.mailboxes.remove(&thread) {
            debug!("{} finished with {} unread message(s)", thread, unread.len());
        }
        self.registry.set_state(thread, ThreadState::Finished)?;

        let joiners: Vec<ThreadId> = self
            .suspended
            .iter()
            .copied()
            .filter(|t| self.join_requests.get(t) == Some(&thread))
            .collect();
        for joiner in joiners {
            self.unsuspend(joiner, ThreadState::WaitingOnJoin)?;
        }

        if thread.is_root() {
            self.set_verdict(Outcome::Completed);
        }
        Ok(())
    }

    fn wake_monitor_waiters(&mut self, monitor: MonitorId) -> Result<(), SchedulerError> {
        let waiters: Vec<ThreadId> = self
            .suspended
            .iter()
            .copied()
            .filter(|t| self.monitor_requests.get(t) == Some(&monitor))
            .collect();
        for waiter in waiters {
            self.unsuspend(waiter, ThreadState::WaitingOnMonitor)?;
        }
        Ok(())
    }

    fn unsuspend(&mut self, thread: ThreadId, state: ThreadState) -> Result<(), SchedulerError> {
        self.suspended.remove(&thread);
        self.ready.insert(thread);
        self.registry.set_state(thread, state)
    }

    // ───────────────────────────────────────────────────────────────────
    //  Deadlock checks
    // ───────────────────────────────────────────────────────────────────

    /// The unified blocked-on relation: monitor waits plus join waits.
    pub fn wait_for_graph(&self) -> WaitForGraph {
        let mut graph = WaitForGraph::from_monitors(&self.monitor_requests, &self.monitor_owners());
        graph.add_join_waits(&self.join_requests, |t| {
            self.registry.state(t).map(ThreadState::is_live).unwrap_or(false)
        });
        graph
    }

    fn check_for_deadlock(
        &mut self,
        requester: ThreadId,
        strategy: &mut dyn SearchStrategy,
    ) -> Result<(), SchedulerError> {
        if let Some(cycle) = self.wait_for_graph().cycle() {
            warn!("deadlock detected: {:?}", cycle);
            self.emit(requester, EventKind::Deadlock { cycle: cycle.clone() }, strategy)?;
            self.set_verdict(Outcome::Deadlock(DeadlockKind::Cycle { threads: cycle }));
        }
        Ok(())
    }

    /// Outcome when no thread can be granted.
    pub fn quiescent_outcome(&self) -> Outcome {
        let blocked: Vec<ThreadId> = self
            .registry
            .iter()
            .filter(|t| {
                matches!(
                    t.state,
                    ThreadState::Suspended
                        | ThreadState::Parked
                        | ThreadState::WaitingOnMonitor
                        | ThreadState::WaitingOnJoin
                        | ThreadState::WaitingOnMessage
                )
            })
            .map(|t| t.id)
            .collect();
        if blocked.is_empty() {
            return Outcome::Completed;
        }
        match self.wait_for_graph().cycle() {
            Some(threads) => Outcome::Deadlock(DeadlockKind::Cycle { threads }),
            None => Outcome::Deadlock(DeadlockKind::Stalled { blocked }),
        }
    }

    // ───────────────────────────────────────────────────────────────────
    //  Selection support
    // ───────────────────────────────────────────────────────────────────

    /// Try to satisfy the candidate's outstanding request.
    ///
    /// Returns the events that resolution produces, or `None` when the
    /// candidate still cannot proceed.
    pub(crate) fn resolve(&mut self, candidate: ThreadId) -> Result<Option<Vec<EventKind>>, SchedulerError> {
        if self.is_blocked(candidate) {
            return Ok(None);
        }
        if let Some(monitor) = self.monitor_requests.remove(&candidate) {
            self.monitors.insert(monitor, MonitorHold { owner: candidate, depth: 1 });
            return Ok(Some(vec![EventKind::EnterMonitor { monitor }]));
        }
        if let Some(target) = self.join_requests.remove(&candidate) {
            return Ok(Some(vec![EventKind::Join { target }]));
        }
        if let Some(tag) = self.receive_requests.remove(&candidate) {
            return Ok(self.take_message(candidate, tag)?.map(|received| vec![received]));
        }
        Ok(Some(Vec::new()))
    }

    pub(crate) fn suspend(&mut self, thread: ThreadId) -> Result<(), SchedulerError> {
        self.ready.remove(&thread);
        self.suspended.insert(thread);
        self.registry.set_state(thread, ThreadState::Suspended)
    }

    /// Mark `thread` running and record the grant.
    pub(crate) fn grant(&mut self, thread: ThreadId) -> Result<(), SchedulerError> {
        self.registry.set_state(thread, ThreadState::Running)?;
        self.trace.record_grant(thread);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Coordinator
// ═══════════════════════════════════════════════════════════════════════

/// One model-checking session's coordinator.
///
/// Shared by the driver (which owns the scheduling state) and every
/// program thread (which only posts requests and waits on its permit).
#[derive(Debug, Default)]
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    pending: Mutex<Option<PendingRequest>>,
    pending_cond: Condvar,
    terminated: AtomicBool,
    next_handle: AtomicU64,
    next_object: AtomicU64,
    next_monitor: AtomicU64,
    os_threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the scheduling state.
    pub fn state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock()
    }

    /// Post a request and wake the driver.
    ///
    /// Only the granted thread posts, so the slot is normally empty; a
    /// second poster waits for it rather than overwrite it.
    pub fn post(&self, request: PendingRequest) {
        let mut slot = self.pending.lock();
        while slot.is_some() {
            error!("{} posted while a request is pending", request.thread);
            self.pending_cond.wait(&mut slot);
        }
        *slot = Some(request);
        self.pending_cond.notify_all();
    }

    /// Block until a request is posted.
    ///
    /// A timeout means every program thread is waiting on its permit while
    /// the driver waits for them: a lost wakeup.
    pub fn wait_for_request(&self, timeout: Duration) -> Result<PendingRequest, SchedulerError> {
        let mut slot = self.pending.lock();
        loop {
            if let Some(request) = slot.take() {
                self.pending_cond.notify_all();
                return Ok(request);
            }
            if self.pending_cond.wait_for(&mut slot, timeout).timed_out() && slot.is_none() {
                return Err(SchedulerError::LostWakeup(format!(
                    "no request posted within {:?}",
                    timeout
                )));
            }
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// End the iteration: refuse further grants and abort every live thread.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        let permits: Vec<Arc<Permit>> = self
            .state
            .lock()
            .registry
            .live()
            .map(|t| Arc::clone(&t.permit))
            .collect();
        for permit in permits {
            permit.grant(Signal::Abort);
        }
    }

    pub(crate) fn adopt(&self, handle: JoinHandle<()>) {
        self.os_threads.lock().push(handle);
    }

    /// Wait for every OS thread of the iteration to exit.
    pub fn join_os_threads(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.os_threads.lock());
        for handle in handles {
            let name = handle.thread().name().unwrap_or("<unnamed>").to_string();
            if handle.join().is_err() {
                warn!("program thread {} exited by panic", name);
            }
        }
    }

    /// Clear all state for the next iteration.
    pub fn reset(&self) {
        *self.state.lock() = CoordinatorState::new();
        *self.pending.lock() = None;
        self.terminated.store(false, Ordering::SeqCst);
        self.next_handle.store(0, Ordering::SeqCst);
        self.next_object.store(0, Ordering::SeqCst);
        self.next_monitor.store(0, Ordering::SeqCst);
        let leftover = std::mem::take(&mut *self.os_threads.lock());
        if !leftover.is_empty() {
            warn!("dropping {} unjoined program threads", leftover.len());
        }
    }

    pub fn is_pristine(&self) -> bool {
        self.state.lock().is_pristine()
            && self.pending.lock().is_none()
            && !self.is_terminated()
            && self.os_threads.lock().is_empty()
    }

    pub fn new_handle(&self) -> ThreadHandle {
        ThreadHandle(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    /// Allocate an object identity, deterministic within an iteration.
    pub fn new_object(&self) -> ObjectId {
        ObjectId(self.next_object.fetch_add(1, Ordering::SeqCst))
    }

    /// Allocate a monitor identity, deterministic within an iteration.
    pub fn new_monitor(&self) -> MonitorId {
        MonitorId(self.next_monitor.fetch_add(1, Ordering::SeqCst))
    }
}
