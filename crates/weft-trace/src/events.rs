//! Event types emitted by controlled executions.
//!
//! An [`Event`] is an immutable record of one hook operation performed by
//! one logical thread. Events carry a per-thread serial number; the trace
//! order (dispatch order) is the authoritative global order.

use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
//  Identities
// ═══════════════════════════════════════════════════════════════════════

/// Logical thread identifier, stable for one iteration.
///
/// Distinct from the OS thread id. The root thread is always `0`; other
/// threads are numbered in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u32);

impl ThreadId {
    /// The root (main) thread of every iteration.
    pub const ROOT: ThreadId = ThreadId(0);

    /// Index into per-thread tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// Identity of a monitor (lock object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(pub u64);

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// Identity of a shared object whose fields are read and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Payloads
// ═══════════════════════════════════════════════════════════════════════

/// A value observed by a read or stored by a write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// A shared field: the object instance plus its owner type, field name and
/// type descriptor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub object: ObjectId,
    pub owner: String,
    pub field: String,
    pub descriptor: String,
}

impl Location {
    pub fn new(
        object: ObjectId,
        owner: impl Into<String>,
        field: impl Into<String>,
        descriptor: impl Into<String>,
    ) -> Self {
        Self {
            object,
            owner: owner.into(),
            field: field.into(),
            descriptor: descriptor.into(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}: {}", self.owner, self.field, self.object, self.descriptor)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Event type
// ═══════════════════════════════════════════════════════════════════════

/// Payload-free event discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    Start,
    Finish,
    Read,
    Write,
    MonitorRequest,
    EnterMonitor,
    ExitMonitor,
    Release,
    Join,
    Park,
    Unpark,
    Cas,
    Assume,
    Send,
    Receive,
    ReceiveRequest,
    Assert,
    Deadlock,
}

impl EventType {
    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            EventType::Start => "Start",
            EventType::Finish => "Finish",
            EventType::Read => "Read",
            EventType::Write => "Write",
            EventType::MonitorRequest => "MonitorRequest",
            EventType::EnterMonitor => "EnterMonitor",
            EventType::ExitMonitor => "ExitMonitor",
            EventType::Release => "Release",
            EventType::Join => "Join",
            EventType::Park => "Park",
            EventType::Unpark => "Unpark",
            EventType::Cas => "Cas",
            EventType::Assume => "Assume",
            EventType::Send => "Send",
            EventType::Receive => "Receive",
            EventType::ReceiveRequest => "ReceiveRequest",
            EventType::Assert => "Assert",
            EventType::Deadlock => "Deadlock",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Event
// ═══════════════════════════════════════════════════════════════════════

/// Typed event payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// The acting thread started `callee`.
    Start { callee: ThreadId },
    Finish,
    Read { location: Location, value: Value },
    Write { location: Location, value: Value },
    /// The acting thread tried to enter a monitor held by another thread.
    MonitorRequest { monitor: MonitorId },
    EnterMonitor { monitor: MonitorId },
    ExitMonitor { monitor: MonitorId },
    /// Last exit of a re-entrant hold; the monitor is free again.
    Release { monitor: MonitorId },
    /// The acting thread joined `target` (emitted once the join resolves).
    Join { target: ThreadId },
    Park,
    Unpark { target: ThreadId },
    /// Atomic compare-and-swap; a write whether or not it succeeded.
    Cas { location: Location, expected: Value, new: Value, success: bool },
    /// An `assume`; when it does not hold the iteration is pruned.
    Assume { holds: bool },
    Send { receiver: ThreadId, tag: Option<u64>, value: Value },
    /// A receive that returned. `sender` is `None` when a non-blocking
    /// receive found no matching message.
    Receive { sender: Option<ThreadId>, value: Value },
    /// A blocking receive found no matching message and waits.
    ReceiveRequest { tag: Option<u64> },
    Assert { message: String },
    /// Emitted by the requester that closed a wait-for cycle.
    Deadlock { cycle: Vec<ThreadId> },
}

impl EventKind {
    pub fn event_type(&self) -> EventType {
        match self {
            EventKind::Start { .. } => EventType::Start,
            EventKind::Finish => EventType::Finish,
            EventKind::Read { .. } => EventType::Read,
            EventKind::Write { .. } => EventType::Write,
            EventKind::MonitorRequest { .. } => EventType::MonitorRequest,
            EventKind::EnterMonitor { .. } => EventType::EnterMonitor,
            EventKind::ExitMonitor { .. } => EventType::ExitMonitor,
            EventKind::Release { .. } => EventType::Release,
            EventKind::Join { .. } => EventType::Join,
            EventKind::Park => EventType::Park,
            EventKind::Unpark { .. } => EventType::Unpark,
            EventKind::Cas { .. } => EventType::Cas,
            EventKind::Assume { .. } => EventType::Assume,
            EventKind::Send { .. } => EventType::Send,
            EventKind::Receive { .. } => EventType::Receive,
            EventKind::ReceiveRequest { .. } => EventType::ReceiveRequest,
            EventKind::Assert { .. } => EventType::Assert,
            EventKind::Deadlock { .. } => EventType::Deadlock,
        }
    }

    /// The shared field touched by a read, write or compare-and-swap.
    pub fn location(&self) -> Option<&Location> {
        match self {
            EventKind::Read { location, .. }
            | EventKind::Write { location, .. }
            | EventKind::Cas { location, .. } => Some(location),
            _ => None,
        }
    }

    /// The monitor touched by a monitor operation.
    pub fn monitor(&self) -> Option<MonitorId> {
        match self {
            EventKind::MonitorRequest { monitor }
            | EventKind::EnterMonitor { monitor }
            | EventKind::ExitMonitor { monitor }
            | EventKind::Release { monitor } => Some(*monitor),
            _ => None,
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, EventKind::Write { .. } | EventKind::Cas { .. })
    }

    /// The thread whose mailbox a send or receive touches, given the
    /// acting thread.
    pub fn mailbox(&self, actor: ThreadId) -> Option<ThreadId> {
        match self {
            EventKind::Send { receiver, .. } => Some(*receiver),
            EventKind::Receive { .. } | EventKind::ReceiveRequest { .. } => Some(actor),
            _ => None,
        }
    }
}

/// One hook operation performed by one logical thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// The thread that performed the operation.
    pub thread: ThreadId,
    /// Per-thread sequence number, starting at 1.
    pub serial: u32,
    pub kind: EventKind,
}

impl Event {
    pub fn new(thread: ThreadId, serial: u32, kind: EventKind) -> Self {
        Self { thread, serial, kind }
    }

    pub fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Whether reordering `self` and `other` could change the outcome.
    ///
    /// Events of the same thread never conflict. Accesses to the same
    /// location conflict when at least one is a write. Acquisitions of the
    /// same monitor conflict. An unpark conflicts with the target's park.
    /// Two sends to one mailbox conflict, as does a send with a receive
    /// from that mailbox.
    pub fn conflicts_with(&self, other: &Event) -> bool {
        if self.thread == other.thread {
            return false;
        }
        if let (Some(a), Some(b)) = (self.kind.location(), other.kind.location()) {
            return a == b && (self.kind.is_write() || other.kind.is_write());
        }
        if let (Some(a), Some(b)) = (self.kind.mailbox(self.thread), other.kind.mailbox(other.thread)) {
            let either_sends = matches!(self.kind, EventKind::Send { .. })
                || matches!(other.kind, EventKind::Send { .. });
            return a == b && either_sends;
        }
        match (&self.kind, &other.kind) {
            (
                EventKind::EnterMonitor { monitor: a } | EventKind::MonitorRequest { monitor: a },
                EventKind::EnterMonitor { monitor: b } | EventKind::MonitorRequest { monitor: b },
            ) => a == b,
            (EventKind::Unpark { target }, EventKind::Park) => *target == other.thread,
            (EventKind::Park, EventKind::Unpark { target }) => *target == self.thread,
            _ => false,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4}#{:<4} ", self.thread, self.serial)?;
        match &self.kind {
            EventKind::Start { callee } => write!(f, "START   {}", callee),
            EventKind::Finish => write!(f, "FINISH"),
            EventKind::Read { location, value } => write!(f, "READ    {} -> {}", location, value),
            EventKind::Write { location, value } => write!(f, "WRITE   {} <- {}", location, value),
            EventKind::MonitorRequest { monitor } => write!(f, "REQUEST {}", monitor),
            EventKind::EnterMonitor { monitor } => write!(f, "ENTER   {}", monitor),
            EventKind::ExitMonitor { monitor } => write!(f, "EXIT    {}", monitor),
            EventKind::Release { monitor } => write!(f, "RELEASE {}", monitor),
            EventKind::Join { target } => write!(f, "JOIN    {}", target),
            EventKind::Park => write!(f, "PARK"),
            EventKind::Unpark { target } => write!(f, "UNPARK  {}", target),
            EventKind::Cas { location, expected, new, success } => {
                let result = if *success { "ok" } else { "failed" };
                write!(f, "CAS     {} {} -> {} {}", location, expected, new, result)
            }
            EventKind::Assume { holds } => write!(f, "ASSUME  {}", holds),
            EventKind::Send { receiver, tag: Some(tag), value } => {
                write!(f, "SEND    {} [{}] {}", receiver, tag, value)
            }
            EventKind::Send { receiver, tag: None, value } => write!(f, "SEND    {} {}", receiver, value),
            EventKind::Receive { sender: Some(sender), value } => write!(f, "RECV    {} from {}", value, sender),
            EventKind::Receive { sender: None, .. } => write!(f, "RECV    (empty)"),
            EventKind::ReceiveRequest { tag: Some(tag) } => write!(f, "WAITMSG [{}]", tag),
            EventKind::ReceiveRequest { tag: None } => write!(f, "WAITMSG"),
            EventKind::Assert { message } => write!(f, "ASSERT  {}", message),
            EventKind::Deadlock { cycle } => {
                write!(f, "DEADLOCK")?;
                for t in cycle {
                    write!(f, " {}", t)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_field() -> Location {
        Location::new(ObjectId(1), "Counter", "value", "i64")
    }

    #[test]
    fn event_type_matches_kind() {
        let e = Event::new(ThreadId(1), 1, EventKind::Start { callee: ThreadId(2) });
        assert_eq!(e.event_type(), EventType::Start);
        let e = Event::new(
            ThreadId(1),
            2,
            EventKind::Write { location: counter_field(), value: Value::Int(5) },
        );
        assert_eq!(e.event_type(), EventType::Write);
        assert_eq!(e.event_type().name(), "Write");
    }

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from(3i32), Value::Int(3));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("x"), Value::Text("x".into()));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(7i64)), Value::Int(7));
    }

    #[test]
    fn write_read_same_field_conflict() {
        let w = Event::new(
            ThreadId(1),
            1,
            EventKind::Write { location: counter_field(), value: Value::Int(1) },
        );
        let r = Event::new(
            ThreadId(2),
            1,
            EventKind::Read { location: counter_field(), value: Value::Int(0) },
        );
        assert!(w.conflicts_with(&r));
        assert!(r.conflicts_with(&w));
    }

    #[test]
    fn two_reads_do_not_conflict() {
        let a = Event::new(
            ThreadId(1),
            1,
            EventKind::Read { location: counter_field(), value: Value::Int(0) },
        );
        let b = Event::new(
            ThreadId(2),
            1,
            EventKind::Read { location: counter_field(), value: Value::Int(0) },
        );
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn same_thread_never_conflicts() {
        let w = Event::new(
            ThreadId(1),
            1,
            EventKind::Write { location: counter_field(), value: Value::Int(1) },
        );
        assert!(!w.conflicts_with(&w.clone()));
    }

    #[test]
    fn different_objects_do_not_conflict() {
        let a = Event::new(
            ThreadId(1),
            1,
            EventKind::Write { location: counter_field(), value: Value::Int(1) },
        );
        let mut other = counter_field();
        other.object = ObjectId(2);
        let b = Event::new(ThreadId(2), 1, EventKind::Write { location: other, value: Value::Int(1) });
        assert!(!a.conflicts_with(&b));
    }

    #[test]
    fn monitor_acquisitions_conflict() {
        let a = Event::new(ThreadId(1), 1, EventKind::EnterMonitor { monitor: MonitorId(7) });
        let b = Event::new(ThreadId(2), 1, EventKind::MonitorRequest { monitor: MonitorId(7) });
        let c = Event::new(ThreadId(2), 1, EventKind::EnterMonitor { monitor: MonitorId(8) });
        assert!(a.conflicts_with(&b));
        assert!(!a.conflicts_with(&c));
    }

    #[test]
    fn unpark_conflicts_with_target_park() {
        let park = Event::new(ThreadId(2), 3, EventKind::Park);
        let unpark = Event::new(ThreadId(1), 4, EventKind::Unpark { target: ThreadId(2) });
        let other = Event::new(ThreadId(1), 4, EventKind::Unpark { target: ThreadId(3) });
        assert!(unpark.conflicts_with(&park));
        assert!(park.conflicts_with(&unpark));
        assert!(!other.conflicts_with(&park));
    }

    #[test]
    fn cas_is_a_write() {
        let cas = Event::new(
            ThreadId(1),
            1,
            EventKind::Cas {
                location: counter_field(),
                expected: Value::Int(0),
                new: Value::Int(1),
                success: false,
            },
        );
        let read = Event::new(
            ThreadId(2),
            1,
            EventKind::Read { location: counter_field(), value: Value::Int(0) },
        );
        assert_eq!(cas.event_type(), EventType::Cas);
        assert!(cas.kind.is_write());
        assert!(cas.conflicts_with(&read));
        assert!(read.conflicts_with(&cas));
        assert!(format!("{}", cas).contains("0 -> 1 failed"));
    }

    #[test]
    fn sends_to_one_mailbox_conflict() {
        let send = |from: u32, to: u32| {
            Event::new(ThreadId(from), 1, EventKind::Send { receiver: ThreadId(to), tag: None, value: Value::Int(1) })
        };
        let recv = Event::new(ThreadId(3), 2, EventKind::Receive { sender: Some(ThreadId(1)), value: Value::Int(1) });
        assert!(send(1, 3).conflicts_with(&send(2, 3)));
        assert!(!send(1, 3).conflicts_with(&send(2, 4)));
        assert!(send(2, 3).conflicts_with(&recv));
        assert!(recv.conflicts_with(&send(2, 3)));
        assert!(!recv.conflicts_with(&send(2, 4)));

        let other_recv = Event::new(ThreadId(4), 1, EventKind::Receive { sender: None, value: Value::Null });
        assert!(!recv.conflicts_with(&other_recv));
    }

    #[test]
    fn display_formats() {
        let e = Event::new(
            ThreadId(1),
            2,
            EventKind::Write { location: counter_field(), value: Value::Int(5) },
        );
        let s = format!("{}", e);
        assert!(s.contains("T1"));
        assert!(s.contains("WRITE"));
        assert!(s.contains("Counter.value@1"));
        assert!(s.contains("<- 5"));

        let d = Event::new(ThreadId(2), 1, EventKind::Deadlock { cycle: vec![ThreadId(1), ThreadId(2)] });
        assert!(format!("{}", d).contains("DEADLOCK T1 T2"));
    }

    #[test]
    fn event_serde() {
        let e = Event::new(
            ThreadId(3),
            9,
            EventKind::Read { location: counter_field(), value: Value::Text("hi".into()) },
        );
        let json = serde_json::to_string(&e).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }
}
