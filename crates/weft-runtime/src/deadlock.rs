//! Deadlock detection over the blocked-on relation.
//!
//! The primitive relation holds a pair `(t1, t2)` whenever `t1` cannot
//! proceed until `t2` does something:
//!
//! - `t1` requests a monitor owned by `t2`, or
//! - `t1` waits to join `t2` and `t2` has not finished.
//!
//! The transitive closure is computed by repeated composition until it
//! stops growing. A deadlock exists iff the closure contains a self-pair.
//! Thread counts are small, so the cubic fixpoint is fine.

use std::collections::{BTreeMap, BTreeSet};
use weft_trace::{MonitorId, ThreadId};

/// Directed wait-for graph between logical threads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitForGraph {
    edges: BTreeSet<(ThreadId, ThreadId)>,
}

impl WaitForGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the monitor part of the relation.
    pub fn from_monitors(
        requests: &BTreeMap<ThreadId, MonitorId>,
        owners: &BTreeMap<MonitorId, ThreadId>,
    ) -> Self {
        let mut graph = Self::new();
        graph.add_monitor_waits(requests, owners);
        graph
    }

    pub fn add_monitor_waits(
        &mut self,
        requests: &BTreeMap<ThreadId, MonitorId>,
        owners: &BTreeMap<MonitorId, ThreadId>,
    ) {
        for (&waiter, monitor) in requests {
            if let Some(&owner) = owners.get(monitor) {
                self.edges.insert((waiter, owner));
            }
        }
    }

    /// Add join waits whose target is still live.
    pub fn add_join_waits(
        &mut self,
        joins: &BTreeMap<ThreadId, ThreadId>,
        is_live: impl Fn(ThreadId) -> bool,
    ) {
        for (&waiter, &target) in joins {
            if is_live(target) {
                self.edges.insert((waiter, target));
            }
        }
    }

    pub fn add_edge(&mut self, from: ThreadId, to: ThreadId) {
        self.edges.insert((from, to));
    }

    pub fn edges(&self) -> &BTreeSet<(ThreadId, ThreadId)> {
        &self.edges
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Repeated relational composition until fixpoint.
    pub fn transitive_closure(&self) -> BTreeSet<(ThreadId, ThreadId)> {
        let mut closure = self.edges.clone();
        loop {
            let mut added = Vec::new();
            for &(a, b) in &closure {
                for &(c, d) in &closure {
                    if b == c && !closure.contains(&(a, d)) {
                        added.push((a, d));
                    }
                }
            }
            if added.is_empty() {
                return closure;
            }
            closure.extend(added);
        }
    }

    /// Threads that can reach themselves, in id order.
    pub fn cycle(&self) -> Option<Vec<ThreadId>> {
        let members: Vec<ThreadId> = self
            .transitive_closure()
            .into_iter()
            .filter(|(a, b)| a == b)
            .map(|(a, _)| a)
            .collect();
        if members.is_empty() {
            None
        } else {
            Some(members)
        }
    }

    pub fn has_cycle(&self) -> bool {
        self.transitive_closure().iter().any(|(a, b)| a == b)
    }
}

/// Whether the monitor wait-for relation alone contains a cycle.
pub fn monitors_deadlocked(
    requests: &BTreeMap<ThreadId, MonitorId>,
    owners: &BTreeMap<MonitorId, ThreadId>,
) -> bool {
    WaitForGraph::from_monitors(requests, owners).has_cycle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const T1: ThreadId = ThreadId(1);
    const T2: ThreadId = ThreadId(2);
    const T3: ThreadId = ThreadId(3);
    const M1: MonitorId = MonitorId(1);
    const M2: MonitorId = MonitorId(2);
    const M3: MonitorId = MonitorId(3);

    #[test]
    fn two_monitor_cycle_is_deadlock() {
        // T1 holds M1 and wants M2; T2 holds M2 and wants M1.
        let owners = BTreeMap::from([(M1, T1), (M2, T2)]);
        let requests = BTreeMap::from([(T1, M2), (T2, M1)]);
        assert!(monitors_deadlocked(&requests, &owners));
        let graph = WaitForGraph::from_monitors(&requests, &owners);
        assert_eq!(graph.cycle(), Some(vec![T1, T2]));
    }

    #[test]
    fn acyclic_chain_is_not_deadlock() {
        let owners = BTreeMap::from([(M1, T2), (M2, T3)]);
        let requests = BTreeMap::from([(T1, M1), (T2, M2)]);
        assert!(!monitors_deadlocked(&requests, &owners));
    }

    #[test]
    fn free_monitor_request_adds_no_edge() {
        let owners = BTreeMap::new();
        let requests = BTreeMap::from([(T1, M1)]);
        assert!(WaitForGraph::from_monitors(&requests, &owners).is_empty());
    }

    #[test]
    fn three_way_cycle() {
        let owners = BTreeMap::from([(M1, T1), (M2, T2), (M3, T3)]);
        let requests = BTreeMap::from([(T1, M2), (T2, M3), (T3, M1)]);
        let graph = WaitForGraph::from_monitors(&requests, &owners);
        assert_eq!(graph.cycle(), Some(vec![T1, T2, T3]));
        assert!(graph.transitive_closure().contains(&(T1, T3)));
    }

    #[test]
    fn join_cycle_detected() {
        let joins = BTreeMap::from([(T1, T2), (T2, T1)]);
        let mut graph = WaitForGraph::new();
        graph.add_join_waits(&joins, |_| true);
        assert!(graph.has_cycle());
    }

    #[test]
    fn join_on_finished_thread_ignored() {
        let joins = BTreeMap::from([(T1, T2), (T2, T1)]);
        let mut graph = WaitForGraph::new();
        graph.add_join_waits(&joins, |t| t != T2);
        assert!(!graph.has_cycle());
    }

    #[test]
    fn mixed_monitor_and_join_cycle() {
        // T1 joins T2; T2 wants M1 held by T1.
        let owners = BTreeMap::from([(M1, T1)]);
        let requests = BTreeMap::from([(T2, M1)]);
        let joins = BTreeMap::from([(T1, T2)]);
        let mut graph = WaitForGraph::from_monitors(&requests, &owners);
        assert!(!graph.has_cycle());
        graph.add_join_waits(&joins, |_| true);
        assert_eq!(graph.cycle(), Some(vec![T1, T2]));
    }

    #[test]
    fn self_join_is_cycle() {
        let mut graph = WaitForGraph::new();
        graph.add_edge(T1, T1);
        assert_eq!(graph.cycle(), Some(vec![T1]));
    }

    proptest! {
        #[test]
        fn forward_chains_never_deadlock(edges in prop::collection::vec((0u32..16, 1u32..16), 0..32)) {
            // Edges only point from lower to higher ids, so no cycle can form.
            let mut graph = WaitForGraph::new();
            for (from, step) in edges {
                graph.add_edge(ThreadId(from), ThreadId(from + step));
            }
            prop_assert!(!graph.has_cycle());
        }

        #[test]
        fn closing_a_chain_deadlocks(len in 2u32..8) {
            let mut graph = WaitForGraph::new();
            for i in 0..len - 1 {
                graph.add_edge(ThreadId(i), ThreadId(i + 1));
            }
            prop_assert!(!graph.has_cycle());
            graph.add_edge(ThreadId(len - 1), ThreadId(0));
            let cycle = graph.cycle().unwrap();
            prop_assert_eq!(cycle.len(), len as usize);
        }
    }
}
