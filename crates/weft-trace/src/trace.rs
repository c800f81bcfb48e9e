//! Execution trace: the ordered events and grant schedule of one iteration.

use crate::events::{Event, EventKind, EventType, ThreadId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Errors from persisting a trace.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One scheduling decision: `thread` was granted permission to run, and
/// every event from `first_event` up to the next grant belongs to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub thread: ThreadId,
    pub first_event: usize,
}

/// The full ordered record of one controlled execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionTrace {
    /// All events in dispatch order.
    pub events: Vec<Event>,
    /// All grants in order. The thread sequence is the schedule.
    pub grants: Vec<Grant>,
}

/// A thread's contiguous stretch of events between two grants.
#[derive(Debug, Clone, Copy)]
pub struct GrantWindow<'a> {
    pub index: usize,
    pub thread: ThreadId,
    pub events: &'a [Event],
}

impl ExecutionTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Record that `thread` was granted the right to run.
    pub fn record_grant(&mut self, thread: ThreadId) {
        self.grants.push(Grant {
            thread,
            first_event: self.events.len(),
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.grants.clear();
    }

    /// The thread granted at each scheduling decision.
    pub fn schedule(&self) -> Vec<ThreadId> {
        self.grants.iter().map(|g| g.thread).collect()
    }

    /// The ordered sequence of event kinds.
    pub fn event_types(&self) -> Vec<EventType> {
        self.events.iter().map(Event::event_type).collect()
    }

    /// Events before the first grant are not part of any window.
    pub fn windows(&self) -> Vec<GrantWindow<'_>> {
        self.grants
            .iter()
            .enumerate()
            .map(|(index, grant)| {
                let end = self
                    .grants
                    .get(index + 1)
                    .map_or(self.events.len(), |next| next.first_event);
                GrantWindow {
                    index,
                    thread: grant.thread,
                    events: &self.events[grant.first_event.min(end)..end],
                }
            })
            .collect()
    }

    /// Index of the grant window containing event `event_index`.
    pub fn window_of(&self, event_index: usize) -> Option<usize> {
        match self
            .grants
            .binary_search_by(|g| g.first_event.cmp(&event_index))
        {
            Ok(mut i) => {
                // Empty windows share a start offset; the last one owns the event.
                while i + 1 < self.grants.len() && self.grants[i + 1].first_event == event_index {
                    i += 1;
                }
                Some(i)
            }
            Err(0) => None,
            Err(i) => Some(i - 1),
        }
    }

    /// Verify that every event belongs to the thread holding the grant.
    ///
    /// Returns the index of the first offending event.
    pub fn check_mutual_exclusion(&self) -> Result<(), usize> {
        if let Some(first) = self.grants.first() {
            if first.first_event > 0 {
                return Err(0);
            }
        } else if !self.events.is_empty() {
            return Err(0);
        }
        for window in self.windows() {
            if let Some(pos) = window.events.iter().position(|e| e.thread != window.thread) {
                let start = self.grants[window.index].first_event;
                return Err(start + pos);
            }
        }
        Ok(())
    }

    /// Check that per-thread serial numbers increase by exactly one.
    pub fn check_serials(&self) -> Result<(), usize> {
        let mut last: BTreeMap<ThreadId, u32> = BTreeMap::new();
        for (i, event) in self.events.iter().enumerate() {
            let prev = last.entry(event.thread).or_insert(0);
            if event.serial != *prev + 1 {
                return Err(i);
            }
            *prev = event.serial;
        }
        Ok(())
    }

    /// The last event, if it records a failure.
    pub fn failure_event(&self) -> Option<&Event> {
        self.events
            .last()
            .filter(|e| matches!(e.kind, EventKind::Assert { .. } | EventKind::Deadlock { .. }))
    }

    /// Event counts by kind name.
    pub fn summary(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.event_type().name().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Save trace to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TraceError> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Load trace from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let file = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(file)?)
    }
}
