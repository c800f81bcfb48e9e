//! The hook API seen by the program under test.
//!
//! Every logical thread runs on its own OS thread and receives a
//! [`ThreadCtx`]. Each hook posts a request to the coordinator and parks
//! on the thread's permit until the driver grants it again. When the
//! iteration ends the permit delivers `Abort`, and the hook unwinds the
//! thread's stack back to its entry point with an [`IterationAborted`]
//! payload.

use crate::coordinator::{Coordinator, PendingRequest, Request};
use crate::registry::{Permit, Reply, Signal, ThreadHandle};
use log::trace;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use weft_trace::{Location, MonitorId, ObjectId, ThreadId, Value};

/// Unwind payload used to stop a thread when its iteration ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationAborted;

/// Handle to a logical thread created by [`ThreadCtx::spawn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnHandle {
    thread: Option<ThreadId>,
}

impl SpawnHandle {
    /// `None` only if the spawn happened while the iteration was being torn down.
    pub fn thread(&self) -> Option<ThreadId> {
        self.thread
    }

    /// Wait for the thread to finish.
    pub fn join(&self, ctx: &ThreadCtx) {
        if let Some(target) = self.thread {
            ctx.join(target);
        }
    }
}

/// A logical thread's connection to its coordinator.
#[derive(Debug, Clone)]
pub struct ThreadCtx {
    coordinator: Arc<Coordinator>,
    id: ThreadId,
    permit: Arc<Permit>,
}

impl ThreadCtx {
    pub(crate) fn new(coordinator: Arc<Coordinator>, id: ThreadId, permit: Arc<Permit>) -> Self {
        Self { coordinator, id, permit }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    // ───────────────────────────────────────────────────────────────────
    //  Request plumbing
    // ───────────────────────────────────────────────────────────────────

    /// Post `request` and wait for the next grant.
    fn request(&self, request: Request) -> Option<Reply> {
        if self.coordinator.is_terminated() {
            unwind_unless_panicking();
            return None;
        }
        trace!("{} -> {}", self.id, request.name());
        self.coordinator.post(PendingRequest { thread: self.id, request });
        match self.permit.wait() {
            (Signal::Run, reply) => reply,
            (Signal::Abort, _) => {
                unwind_unless_panicking();
                None
            }
        }
    }

    /// Post a request after which this thread never runs program code.
    fn request_final(&self, request: Request, wait: bool) {
        if self.coordinator.is_terminated() {
            return;
        }
        self.coordinator.post(PendingRequest { thread: self.id, request });
        if wait {
            let _ = self.permit.wait();
        }
    }

    // ───────────────────────────────────────────────────────────────────
    //  Thread lifecycle
    // ───────────────────────────────────────────────────────────────────

    /// Register a new logical thread and launch its OS thread without
    /// starting it. The thread does not run until [`thread_start`](Self::thread_start).
    pub fn spawn_unstarted<F>(&self, f: F) -> SpawnHandle
    where
        F: FnOnce(&ThreadCtx) + Send + 'static,
    {
        let handle = self.coordinator.new_handle();
        let Some((id, permit)) = self.add_thread(handle) else {
            return SpawnHandle { thread: None };
        };
        let child = ThreadCtx::new(Arc::clone(&self.coordinator), id, permit);
        match launch(child, f) {
            Ok(join) => {
                self.coordinator.adopt(join);
                SpawnHandle { thread: Some(id) }
            }
            Err(e) => {
                self.request(Request::SpawnFailed { callee: id, reason: e.to_string() });
                SpawnHandle { thread: None }
            }
        }
    }

    /// Register and start a new logical thread.
    pub fn spawn<F>(&self, f: F) -> SpawnHandle
    where
        F: FnOnce(&ThreadCtx) + Send + 'static,
    {
        let spawned = self.spawn_unstarted(f);
        if let Some(id) = spawned.thread {
            self.thread_start(id);
        }
        spawned
    }

    /// Register `handle`, returning the new id and permit.
    fn add_thread(&self, handle: ThreadHandle) -> Option<(ThreadId, Arc<Permit>)> {
        match self.request(Request::Register { handle })? {
            Reply::Registered { id, permit } => Some((id, permit)),
            Reply::Received { .. } => None,
        }
    }

    pub fn thread_start(&self, callee: ThreadId) {
        self.request(Request::Start { callee });
    }

    /// Block until `target` has finished.
    pub fn join(&self, target: ThreadId) {
        self.request(Request::Join { target });
    }

    // ───────────────────────────────────────────────────────────────────
    //  Monitors
    // ───────────────────────────────────────────────────────────────────

    pub fn enter_monitor(&self, monitor: MonitorId) {
        self.request(Request::EnterMonitor { monitor });
    }

    pub fn exit_monitor(&self, monitor: MonitorId) {
        self.request(Request::ExitMonitor { monitor });
    }

    /// Run `f` while holding `monitor`. The monitor is released even if
    /// `f` panics.
    pub fn synchronized<R>(&self, monitor: MonitorId, f: impl FnOnce() -> R) -> R {
        self.enter_monitor(monitor);
        let _guard = MonitorGuard { ctx: self, monitor };
        f()
    }

    // ───────────────────────────────────────────────────────────────────
    //  Shared state
    // ───────────────────────────────────────────────────────────────────

    /// Report a load of `location` that observed `value`.
    pub fn read_operation(&self, location: Location, value: Value) {
        self.request(Request::Read { location, value });
    }

    /// Report a store of `value` to `location`.
    pub fn write_operation(&self, location: Location, value: Value) {
        self.request(Request::Write { location, value });
    }

    /// Report a compare-and-swap on `location` whose effect was applied.
    pub fn cas_operation(&self, location: Location, expected: Value, new: Value, success: bool) {
        self.request(Request::Cas { location, expected, new, success });
    }

    // ───────────────────────────────────────────────────────────────────
    //  Message passing
    // ───────────────────────────────────────────────────────────────────

    /// Append `value` to `receiver`'s mailbox.
    pub fn send(&self, receiver: ThreadId, value: impl Into<Value>) {
        self.request(Request::Send { receiver, tag: None, value: value.into() });
    }

    pub fn send_tagged(&self, receiver: ThreadId, tag: u64, value: impl Into<Value>) {
        self.request(Request::Send { receiver, tag: Some(tag), value: value.into() });
    }

    /// Take the oldest message, or `None` when the mailbox is empty.
    pub fn try_receive(&self) -> Option<Value> {
        self.receive_reply(None, false)
    }

    /// Take the oldest message, waiting until one arrives.
    pub fn receive(&self) -> Value {
        self.receive_reply(None, true).unwrap_or(Value::Null)
    }

    /// Take the oldest message sent with `tag`, waiting until one arrives.
    pub fn receive_tagged(&self, tag: u64) -> Value {
        self.receive_reply(Some(tag), true).unwrap_or(Value::Null)
    }

    fn receive_reply(&self, tag: Option<u64>, blocking: bool) -> Option<Value> {
        match self.request(Request::Receive { tag, blocking })? {
            Reply::Received { value } => Some(value),
            Reply::Registered { .. } => None,
        }
    }

    // ───────────────────────────────────────────────────────────────────
    //  Parking, assertions, yields
    // ───────────────────────────────────────────────────────────────────

    pub fn park(&self) {
        self.request(Request::Park);
    }

    pub fn unpark(&self, target: ThreadId) {
        self.request(Request::Unpark { target });
    }

    /// Fail the iteration with `message`. Does not return normally.
    pub fn assert_operation(&self, message: impl Into<String>) {
        self.request(Request::AssertFailure { message: message.into() });
    }

    /// Fail the iteration with `message` unless `condition` holds.
    pub fn check(&self, condition: bool, message: impl Into<String>) {
        if !condition {
            self.assert_operation(message);
        }
    }

    /// Prune the execution unless `condition` holds. An execution cut off
    /// this way is neither a pass nor a bug.
    pub fn assume(&self, condition: bool) {
        self.request(Request::Assume { holds: condition });
    }

    /// A scheduling point with no event.
    pub fn yield_now(&self) {
        self.request(Request::Yield);
    }

    pub fn new_object(&self) -> ObjectId {
        self.coordinator.new_object()
    }

    pub fn new_monitor(&self) -> MonitorId {
        self.coordinator.new_monitor()
    }

    // ───────────────────────────────────────────────────────────────────
    //  Entry point
    // ───────────────────────────────────────────────────────────────────

    /// Body of every program OS thread.
    fn run<F: FnOnce(&ThreadCtx)>(self, f: F) {
        if let (Signal::Abort, _) = self.permit.wait() {
            return;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| f(&self))) {
            Ok(()) => self.request_final(Request::Finish, false),
            Err(payload) if payload.is::<IterationAborted>() => {}
            Err(payload) => {
                let message = format!("{} panicked: {}", self.id, panic_message(payload.as_ref()));
                self.request_final(Request::AssertFailure { message }, true);
            }
        }
    }
}

/// Launch the OS thread for a registered logical thread.
pub(crate) fn launch<F>(ctx: ThreadCtx, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce(&ThreadCtx) + Send + 'static,
{
    thread::Builder::new()
        .name(format!("weft-{}", ctx.id))
        .spawn(move || ctx.run(f))
}

fn unwind_unless_panicking() {
    if !thread::panicking() {
        panic::resume_unwind(Box::new(IterationAborted));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Releases a monitor on drop.
pub struct MonitorGuard<'a> {
    ctx: &'a ThreadCtx,
    monitor: MonitorId,
}

impl<'a> MonitorGuard<'a> {
    /// Enter `monitor` and return a guard that exits it.
    pub fn lock(ctx: &'a ThreadCtx, monitor: MonitorId) -> Self {
        ctx.enter_monitor(monitor);
        Self { ctx, monitor }
    }
}

impl Drop for MonitorGuard<'_> {
    fn drop(&mut self) {
        self.ctx.exit_monitor(self.monitor);
    }
}
