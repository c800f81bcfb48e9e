//! Conflict coverage: which orderings of conflicting operations have been
//! observed so far.
//!
//! A coverage point is one ordered conflict: "T1's write of `Counter.value`
//! happened before T2's read of it". Thread ids are assigned in
//! registration order, so the same point means the same thing in every
//! iteration of a program.

use crate::conflict::{ConflictKey, ConflictPair};
use log::info;
use std::collections::BTreeSet;
use weft_trace::{EventType, ThreadId};

/// One ordered conflict.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoveragePoint {
    pub key: ConflictKey,
    pub first: (ThreadId, EventType),
    pub second: (ThreadId, EventType),
}

impl From<&ConflictPair> for CoveragePoint {
    fn from(pair: &ConflictPair) -> Self {
        Self {
            key: pair.key.clone(),
            first: (pair.first_thread, pair.first_type),
            second: (pair.second_thread, pair.second_type),
        }
    }
}

/// Set of coverage points.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictCoverage {
    points: BTreeSet<CoveragePoint>,
}

impl ConflictCoverage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Coverage of one iteration's conflicts.
    pub fn from_pairs(pairs: &[ConflictPair]) -> Self {
        Self {
            points: pairs.iter().map(CoveragePoint::from).collect(),
        }
    }

    pub fn record(&mut self, point: CoveragePoint) -> bool {
        self.points.insert(point)
    }

    pub fn contains(&self, point: &CoveragePoint) -> bool {
        self.points.contains(point)
    }

    /// Union `other` into this set.
    pub fn merge(&mut self, other: &ConflictCoverage) {
        self.points.extend(other.points.iter().cloned());
    }

    /// Number of points in `self` that are missing from `global`.
    pub fn has_new_coverage(&self, global: &ConflictCoverage) -> usize {
        self.points.difference(&global.points).count()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoveragePoint> {
        self.points.iter()
    }
}

/// Accumulates coverage over a session.
#[derive(Debug, Default)]
pub struct CoverageTracker {
    global: ConflictCoverage,
    total_runs: u64,
}

impl CoverageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_interesting(&self, coverage: &ConflictCoverage) -> bool {
        coverage.has_new_coverage(&self.global) > 0
    }

    /// Merge one iteration's coverage and return how many points were new.
    pub fn update_global(&mut self, coverage: &ConflictCoverage) -> usize {
        self.total_runs += 1;
        let new_points = coverage.has_new_coverage(&self.global);
        self.global.merge(coverage);
        if new_points > 0 {
            info!("New conflict coverage: {} points (total: {})", new_points, self.global.len());
        }
        new_points
    }

    pub fn global(&self) -> &ConflictCoverage {
        &self.global
    }

    pub fn stats(&self) -> CoverageStats {
        CoverageStats {
            total_points: self.global.len(),
            total_runs: self.total_runs,
        }
    }
}

/// Session coverage summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoverageStats {
    pub total_points: usize,
    pub total_runs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_trace::MonitorId;

    fn point(first: u32, second: u32) -> CoveragePoint {
        CoveragePoint {
            key: ConflictKey::Monitor(MonitorId(0)),
            first: (ThreadId(first), EventType::EnterMonitor),
            second: (ThreadId(second), EventType::EnterMonitor),
        }
    }

    #[test]
    fn orderings_are_distinct_points() {
        let mut coverage = ConflictCoverage::new();
        assert!(coverage.record(point(1, 2)));
        assert!(coverage.record(point(2, 1)));
        assert!(!coverage.record(point(1, 2)));
        assert_eq!(coverage.len(), 2);
    }

    #[test]
    fn new_coverage_counted_against_global() {
        let mut global = ConflictCoverage::new();
        global.record(point(1, 2));

        let mut run = ConflictCoverage::new();
        run.record(point(1, 2));
        run.record(point(2, 1));
        assert_eq!(run.has_new_coverage(&global), 1);

        global.merge(&run);
        assert_eq!(run.has_new_coverage(&global), 0);
    }

    #[test]
    fn tracker_accumulates() {
        let mut tracker = CoverageTracker::new();
        let mut run = ConflictCoverage::new();
        run.record(point(1, 2));

        assert!(tracker.is_interesting(&run));
        assert_eq!(tracker.update_global(&run), 1);
        assert!(!tracker.is_interesting(&run));
        assert_eq!(tracker.update_global(&run), 0);
        assert_eq!(
            tracker.stats(),
            CoverageStats { total_points: 1, total_runs: 2 }
        );
    }
}
