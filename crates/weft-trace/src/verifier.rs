//! Determinism verification by comparing two execution traces.
//!
//! The [`DeterminismVerifier`] compares two [`ExecutionTrace`]s
//! event-by-event: acting thread, per-thread serial, event kind and
//! payload. Replaying a recorded schedule, or re-running the same seed,
//! must produce traces that compare equal.

use crate::events::{Event, EventKind};
use crate::trace::ExecutionTrace;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
//  Divergence
// ═══════════════════════════════════════════════════════════════════════

/// A point where two execution traces diverged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Divergence {
    /// Index in the event stream where divergence occurred.
    pub event_index: usize,
    /// Description of what differs.
    pub description: String,
    pub trace_a_event: Option<Event>,
    pub trace_b_event: Option<Event>,
    /// A few matching events before the divergence for context.
    pub context_before: Vec<Event>,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DIVERGENCE at event index {}:", self.event_index)?;
        writeln!(f, "  {}", self.description)?;

        match &self.trace_a_event {
            Some(a) => writeln!(f, "  Trace A: {}", a)?,
            None => writeln!(f, "  Trace A: <ended>")?,
        }
        match &self.trace_b_event {
            Some(b) => writeln!(f, "  Trace B: {}", b)?,
            None => writeln!(f, "  Trace B: <ended>")?,
        }

        if !self.context_before.is_empty() {
            writeln!(f, "  Context (preceding events):")?;
            let first = self.event_index - self.context_before.len();
            for (i, e) in self.context_before.iter().enumerate() {
                writeln!(f, "    [{:>6}] ✓ {}", first + i, e)?;
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Verification result
// ═══════════════════════════════════════════════════════════════════════

/// Result of comparing two traces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_deterministic: bool,
    pub trace_a_len: usize,
    pub trace_b_len: usize,
    /// Number of events that matched before the first divergence.
    pub matching_events: usize,
    /// Whether the grant schedules are identical.
    pub schedules_match: bool,
    pub first_divergence: Option<Divergence>,
    pub trace_a_summary: BTreeMap<String, usize>,
    pub trace_b_summary: BTreeMap<String, usize>,
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_deterministic {
            writeln!(f, "✅ DETERMINISTIC: {} events matched perfectly", self.matching_events)?;
        } else {
            writeln!(f, "❌ NON-DETERMINISTIC")?;
            writeln!(
                f,
                "   Trace A: {} events, Trace B: {} events",
                self.trace_a_len, self.trace_b_len
            )?;
            writeln!(f, "   Matched {} events before divergence", self.matching_events)?;
        }
        if !self.schedules_match {
            writeln!(f, "   Grant schedules differ")?;
        }

        if let Some(ref div) = self.first_divergence {
            writeln!(f)?;
            write!(f, "{}", div)?;
        }

        writeln!(f, "\nEvent type summary:")?;
        let all_types: BTreeSet<&String> = self
            .trace_a_summary
            .keys()
            .chain(self.trace_b_summary.keys())
            .collect();
        writeln!(f, "  {:>16} {:>10} {:>10} {:>10}", "Event", "Trace A", "Trace B", "Delta")?;
        for t in all_types {
            let a = self.trace_a_summary.get(t).copied().unwrap_or(0);
            let b = self.trace_b_summary.get(t).copied().unwrap_or(0);
            let delta = b as i64 - a as i64;
            let marker = if delta != 0 { " ⚠" } else { "" };
            writeln!(f, "  {:>16} {:>10} {:>10} {:>+10}{}", t, a, b, delta, marker)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Verifier
// ═══════════════════════════════════════════════════════════════════════

/// Compares two execution traces for deterministic equivalence.
pub struct DeterminismVerifier;

impl DeterminismVerifier {
    const CONTEXT_WINDOW: usize = 5;

    /// Compare two traces event-by-event.
    pub fn compare(trace_a: &ExecutionTrace, trace_b: &ExecutionTrace) -> VerificationResult {
        let events_a = &trace_a.events;
        let events_b = &trace_b.events;
        let min_len = events_a.len().min(events_b.len());

        let mismatch = (0..min_len).find(|&i| events_a[i] != events_b[i]);
        let divergence = match mismatch {
            Some(i) => Some(Divergence {
                event_index: i,
                description: describe_divergence(&events_a[i], &events_b[i]),
                trace_a_event: Some(events_a[i].clone()),
                trace_b_event: Some(events_b[i].clone()),
                context_before: context(events_a, i),
            }),
            None if events_a.len() != events_b.len() => Some(Divergence {
                event_index: min_len,
                description: format!(
                    "Trace length mismatch: A has {} events, B has {} events (delta: {})",
                    events_a.len(),
                    events_b.len(),
                    events_a.len() as i64 - events_b.len() as i64,
                ),
                trace_a_event: events_a.get(min_len).cloned(),
                trace_b_event: events_b.get(min_len).cloned(),
                context_before: context(events_a, min_len),
            }),
            None => None,
        };

        let schedules_match = trace_a.schedule() == trace_b.schedule();
        VerificationResult {
            is_deterministic: divergence.is_none() && schedules_match,
            trace_a_len: events_a.len(),
            trace_b_len: events_b.len(),
            matching_events: mismatch.unwrap_or(min_len),
            schedules_match,
            first_divergence: divergence,
            trace_a_summary: trace_a.summary(),
            trace_b_summary: trace_b.summary(),
        }
    }

    /// Compare only the sequence of event kinds, ignoring payloads.
    pub fn same_event_types(trace_a: &ExecutionTrace, trace_b: &ExecutionTrace) -> bool {
        trace_a.event_types() == trace_b.event_types()
    }
}

fn context(events: &[Event], index: usize) -> Vec<Event> {
    let start = index.saturating_sub(DeterminismVerifier::CONTEXT_WINDOW);
    events[start..index].to_vec()
}

/// Describe how two events differ.
fn describe_divergence(a: &Event, b: &Event) -> String {
    if a.thread != b.thread {
        return format!("Acting thread differs: A={}, B={}", a.thread, b.thread);
    }
    let (type_a, type_b) = (a.event_type(), b.event_type());
    if type_a != type_b {
        return format!("Event type mismatch: A={}, B={}", type_a, type_b);
    }
    if a.serial != b.serial {
        return format!(
            "Serial differs for {}: A={}, B={}",
            a.thread, a.serial, b.serial
        );
    }
    match (&a.kind, &b.kind) {
        (
            EventKind::Read { location: l1, value: v1 } | EventKind::Write { location: l1, value: v1 },
            EventKind::Read { location: l2, value: v2 } | EventKind::Write { location: l2, value: v2 },
        ) => {
            if l1 != l2 {
                format!("Location differs: A={}, B={}", l1, l2)
            } else {
                format!("Value at {} differs: A={}, B={}", l1, v1, v2)
            }
        }
        (EventKind::Start { callee: c1 }, EventKind::Start { callee: c2 }) => {
            format!("Started thread differs: A={}, B={}", c1, c2)
        }
        (EventKind::Assert { message: m1 }, EventKind::Assert { message: m2 }) => {
            format!("Assertion message differs: A={:?}, B={:?}", m1, m2)
        }
        _ => match (a.kind.monitor(), b.kind.monitor()) {
            (Some(m1), Some(m2)) => format!("Monitor differs: A={}, B={}", m1, m2),
            _ => format!("Events differ (same type: {})", type_a),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Location, MonitorId, ObjectId, ThreadId, Value};

    fn write(thread: u32, serial: u32, value: i64) -> Event {
        Event::new(
            ThreadId(thread),
            serial,
            EventKind::Write {
                location: Location::new(ObjectId(0), "Main", "x", "i64"),
                value: Value::Int(value),
            },
        )
    }

    fn trace_of(events: Vec<Event>) -> ExecutionTrace {
        let mut trace = ExecutionTrace::new();
        for e in events {
            trace.record_grant(e.thread);
            trace.push(e);
        }
        trace
    }

    #[test]
    fn identical_traces_are_deterministic() {
        let a = trace_of(vec![write(0, 1, 1), write(1, 1, 2)]);
        let b = a.clone();
        let result = DeterminismVerifier::compare(&a, &b);
        assert!(result.is_deterministic);
        assert_eq!(result.matching_events, 2);
        assert!(result.first_divergence.is_none());
        assert!(format!("{}", result).contains("DETERMINISTIC"));
    }

    #[test]
    fn value_divergence_described() {
        let a = trace_of(vec![write(0, 1, 1), write(1, 1, 2)]);
        let b = trace_of(vec![write(0, 1, 1), write(1, 1, 3)]);
        let result = DeterminismVerifier::compare(&a, &b);
        assert!(!result.is_deterministic);
        assert_eq!(result.matching_events, 1);
        let div = result.first_divergence.unwrap();
        assert_eq!(div.event_index, 1);
        assert!(div.description.contains("Value"));
        assert_eq!(div.context_before.len(), 1);
    }

    #[test]
    fn thread_divergence_described() {
        let a = trace_of(vec![write(0, 1, 1)]);
        let b = trace_of(vec![write(1, 1, 1)]);
        let result = DeterminismVerifier::compare(&a, &b);
        let div = result.first_divergence.unwrap();
        assert!(div.description.contains("Acting thread"));
        assert!(!result.schedules_match);
    }

    #[test]
    fn length_mismatch_detected() {
        let a = trace_of(vec![write(0, 1, 1), write(0, 2, 2)]);
        let b = trace_of(vec![write(0, 1, 1)]);
        let result = DeterminismVerifier::compare(&a, &b);
        assert!(!result.is_deterministic);
        let div = result.first_divergence.unwrap();
        assert_eq!(div.event_index, 1);
        assert!(div.trace_a_event.is_some());
        assert!(div.trace_b_event.is_none());
        assert!(format!("{}", div).contains("<ended>"));
    }

    #[test]
    fn monitor_divergence_described() {
        let a = trace_of(vec![Event::new(ThreadId(0), 1, EventKind::EnterMonitor { monitor: MonitorId(1) })]);
        let b = trace_of(vec![Event::new(ThreadId(0), 1, EventKind::EnterMonitor { monitor: MonitorId(2) })]);
        let div = DeterminismVerifier::compare(&a, &b).first_divergence.unwrap();
        assert!(div.description.contains("Monitor differs"));
    }

    #[test]
    fn event_types_only_comparison() {
        let a = trace_of(vec![write(0, 1, 1)]);
        let b = trace_of(vec![write(0, 1, 9)]);
        assert!(DeterminismVerifier::same_event_types(&a, &b));
        assert!(!DeterminismVerifier::compare(&a, &b).is_deterministic);
    }
}
