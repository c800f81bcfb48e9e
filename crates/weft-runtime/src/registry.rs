//! Thread registry: logical thread identities, lifecycle state and the
//! per-thread permission primitive.
//!
//! Each [`LogicalThread`] owns a [`Permit`]. A program thread blocks on
//! its own permit after every hook call; the driver wakes exactly one
//! permit per grant. The permit carries a one-shot signal slot, so a
//! grant issued before the thread starts waiting is never lost.

use crate::error::SchedulerError;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use weft_trace::{ThreadId, Value};

/// Opaque handle identifying a program thread before registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadHandle(pub u64);

impl fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a logical thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadState {
    /// Registered, not yet started.
    Created,
    Ready,
    /// Holds the grant.
    Running,
    WaitingOnMonitor,
    WaitingOnJoin,
    /// In a blocking receive with no matching message.
    WaitingOnMessage,
    Parked,
    /// Chosen by a strategy while its request could not be satisfied.
    Suspended,
    Finished,
}

impl ThreadState {
    pub fn is_live(self) -> bool {
        !matches!(self, ThreadState::Finished)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Permit
// ═══════════════════════════════════════════════════════════════════════

/// What the driver tells a waiting thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Run until the next hook call.
    Run,
    /// The iteration is over; unwind.
    Abort,
}

/// Data handed back to a thread along with its next grant.
#[derive(Debug, Clone)]
pub enum Reply {
    Registered { id: ThreadId, permit: Arc<Permit> },
    /// A message taken from the thread's mailbox.
    Received { value: Value },
}

#[derive(Debug, Default)]
struct PermitSlot {
    signal: Option<Signal>,
    reply: Option<Reply>,
}

/// Single-slot permission primitive owned by one logical thread.
#[derive(Debug, Default)]
pub struct Permit {
    slot: Mutex<PermitSlot>,
    cond: Condvar,
}

impl Permit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a signal and wake the owner.
    ///
    /// An `Abort` is never overwritten by a later `Run`.
    pub fn grant(&self, signal: Signal) {
        let mut slot = self.slot.lock();
        if slot.signal != Some(Signal::Abort) {
            slot.signal = Some(signal);
        }
        self.cond.notify_one();
    }

    /// Attach a reply to be delivered with the next signal.
    pub fn set_reply(&self, reply: Reply) {
        self.slot.lock().reply = Some(reply);
    }

    /// Block until a signal arrives, consuming it.
    pub fn wait(&self) -> (Signal, Option<Reply>) {
        let mut slot = self.slot.lock();
        loop {
            if let Some(signal) = slot.signal {
                if signal == Signal::Run {
                    slot.signal = None;
                }
                return (signal, slot.reply.take());
            }
            self.cond.wait(&mut slot);
        }
    }

    /// Whether a signal is waiting to be consumed.
    pub fn is_signalled(&self) -> bool {
        self.slot.lock().signal.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Logical threads
// ═══════════════════════════════════════════════════════════════════════

/// The coordinator's record of one thread of the program under test.
#[derive(Debug)]
pub struct LogicalThread {
    pub id: ThreadId,
    pub handle: ThreadHandle,
    pub state: ThreadState,
    /// Serial of the last event emitted by this thread.
    pub serial: u32,
    pub permit: Arc<Permit>,
    /// Set by an unpark that arrived while the thread was not parked.
    pub parking_permit: bool,
}

impl LogicalThread {
    fn new(id: ThreadId, handle: ThreadHandle) -> Self {
        Self {
            id,
            handle,
            state: ThreadState::Created,
            serial: 0,
            permit: Arc::new(Permit::new()),
            parking_permit: false,
        }
    }
}

/// Maps handles to logical ids and owns every [`LogicalThread`].
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: Vec<LogicalThread>,
    by_handle: BTreeMap<ThreadHandle, ThreadId>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next id to `handle`.
    ///
    /// Ids are dense and start at 0, so the first registration is the root.
    pub fn register(&mut self, handle: ThreadHandle) -> Result<ThreadId, SchedulerError> {
        if self.by_handle.contains_key(&handle) {
            return Err(SchedulerError::DuplicateRegistration(handle));
        }
        let id = ThreadId(self.threads.len() as u32);
        self.threads.push(LogicalThread::new(id, handle));
        self.by_handle.insert(handle, id);
        Ok(id)
    }

    pub fn lookup(&self, handle: ThreadHandle) -> Option<ThreadId> {
        self.by_handle.get(&handle).copied()
    }

    pub fn get(&self, id: ThreadId) -> Result<&LogicalThread, SchedulerError> {
        self.threads
            .get(id.index())
            .ok_or(SchedulerError::UnknownThread(id))
    }

    pub fn get_mut(&mut self, id: ThreadId) -> Result<&mut LogicalThread, SchedulerError> {
        self.threads
            .get_mut(id.index())
            .ok_or(SchedulerError::UnknownThread(id))
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        id.index() < self.threads.len()
    }

    pub fn state(&self, id: ThreadId) -> Result<ThreadState, SchedulerError> {
        Ok(self.get(id)?.state)
    }

    pub fn set_state(&mut self, id: ThreadId, state: ThreadState) -> Result<(), SchedulerError> {
        self.get_mut(id)?.state = state;
        Ok(())
    }

    /// Advance and return the thread's event serial.
    pub fn next_serial(&mut self, id: ThreadId) -> Result<u32, SchedulerError> {
        let thread = self.get_mut(id)?;
        thread.serial += 1;
        Ok(thread.serial)
    }

    pub fn permit(&self, id: ThreadId) -> Result<Arc<Permit>, SchedulerError> {
        Ok(Arc::clone(&self.get(id)?.permit))
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogicalThread> {
        self.threads.iter()
    }

    /// Threads that have not finished.
    pub fn live(&self) -> impl Iterator<Item = &LogicalThread> {
        self.threads.iter().filter(|t| t.state.is_live())
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
