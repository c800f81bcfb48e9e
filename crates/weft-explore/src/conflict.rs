//! Conflict analysis over a finished trace.
//!
//! Two events conflict when swapping them could change what the program
//! observes (see [`Event::conflicts_with`]). Only pairs that fall into
//! different grant windows matter for exploration: those are the places
//! where a different scheduling decision could have reordered them.

use std::collections::BTreeMap;
use std::fmt;
use weft_trace::{Event, EventKind, EventType, ExecutionTrace, Location, MonitorId, ThreadId};

/// The shared resource two conflicting events contend on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConflictKey {
    Field(Location),
    Monitor(MonitorId),
    /// The parking permit of a thread.
    Parking(ThreadId),
    /// The message queue of a receiving thread.
    Mailbox(ThreadId),
}

impl ConflictKey {
    /// Key of the resource `event` touches, if any.
    pub fn of(event: &Event) -> Option<Self> {
        match &event.kind {
            EventKind::Read { location, .. }
            | EventKind::Write { location, .. }
            | EventKind::Cas { location, .. } => Some(ConflictKey::Field(location.clone())),
            EventKind::EnterMonitor { monitor } | EventKind::MonitorRequest { monitor } => {
                Some(ConflictKey::Monitor(*monitor))
            }
            EventKind::Park => Some(ConflictKey::Parking(event.thread)),
            EventKind::Unpark { target } => Some(ConflictKey::Parking(*target)),
            kind => kind.mailbox(event.thread).map(ConflictKey::Mailbox),
        }
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKey::Field(location) => write!(f, "{}.{}{}", location.owner, location.field, location.object),
            ConflictKey::Monitor(monitor) => write!(f, "{}", monitor),
            ConflictKey::Parking(thread) => write!(f, "park({})", thread),
            ConflictKey::Mailbox(thread) => write!(f, "mailbox({})", thread),
        }
    }
}

/// Two conflicting events in different grant windows, in trace order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictPair {
    pub key: ConflictKey,
    /// Trace indices of the two events.
    pub first_event: usize,
    pub second_event: usize,
    /// Grant windows holding them; `first_window < second_window`.
    pub first_window: usize,
    pub second_window: usize,
    pub first_thread: ThreadId,
    pub second_thread: ThreadId,
    pub first_type: EventType,
    pub second_type: EventType,
}

/// Find every conflicting pair whose events sit in different grant windows.
///
/// Pairs are returned sorted by `(first_window, second_window, first_event,
/// second_event)`.
pub fn find_conflicts(trace: &ExecutionTrace) -> Vec<ConflictPair> {
    let window_of = window_index(trace);

    let mut by_key: BTreeMap<ConflictKey, Vec<usize>> = BTreeMap::new();
    for (i, event) in trace.events.iter().enumerate() {
        if let Some(key) = ConflictKey::of(event) {
            by_key.entry(key).or_default().push(i);
        }
    }

    let mut pairs = Vec::new();
    for (key, indices) in &by_key {
        for (n, &a) in indices.iter().enumerate() {
            for &b in &indices[n + 1..] {
                let (Some(wa), Some(wb)) = (window_of[a], window_of[b]) else {
                    continue;
                };
                if wa == wb {
                    continue;
                }
                let (ea, eb) = (&trace.events[a], &trace.events[b]);
                if !ea.conflicts_with(eb) {
                    continue;
                }
                pairs.push(ConflictPair {
                    key: key.clone(),
                    first_event: a,
                    second_event: b,
                    first_window: wa,
                    second_window: wb,
                    first_thread: ea.thread,
                    second_thread: eb.thread,
                    first_type: ea.event_type(),
                    second_type: eb.event_type(),
                });
            }
        }
    }
    pairs.sort_by_key(|p| (p.first_window, p.second_window, p.first_event, p.second_event));
    pairs
}

/// Grant window of every event, in one pass.
fn window_index(trace: &ExecutionTrace) -> Vec<Option<usize>> {
    let mut index = vec![None; trace.len()];
    for grant_window in trace.windows() {
        let start = trace.grants[grant_window.index].first_event;
        for offset in 0..grant_window.events.len() {
            index[start + offset] = Some(grant_window.index);
        }
    }
    index
}
