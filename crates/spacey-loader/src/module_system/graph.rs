// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Wait-for graph between in-flight loads.
//!
//! An edge `a -> b` means the load of `a` is blocked on `b`. A dependency
//! request that would close a cycle is answered with the in-flight record
//! instead of waiting, so cyclic graphs terminate.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Counted `from -> to` edges between loads that are waiting.
#[derive(Debug, Default)]
pub struct WaitGraph {
    edges: Mutex<FxHashMap<String, FxHashMap<String, usize>>>,
}

impl WaitGraph {
    /// An empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` waits on `to`, unless that would close a cycle.
    pub fn enter(&self, from: &str, to: &str) -> Option<WaitGuard<'_>> {
        let mut edges = self.edges.lock();
        if from == to || reaches(&edges, to, from) {
            return None;
        }
        *edges
            .entry(from.to_string())
            .or_default()
            .entry(to.to_string())
            .or_default() += 1;

        Some(WaitGuard {
            graph: self,
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Whether `from` currently waits, directly or transitively, on `to`.
    pub fn waits_on(&self, from: &str, to: &str) -> bool {
        reaches(&self.edges.lock(), from, to)
    }

    fn leave(&self, from: &str, to: &str) {
        let mut edges = self.edges.lock();
        if let Some(targets) = edges.get_mut(from) {
            if let Some(count) = targets.get_mut(to) {
                *count -= 1;
                if *count == 0 {
                    targets.remove(to);
                }
            }
            if targets.is_empty() {
                edges.remove(from);
            }
        }
    }
}

fn reaches(edges: &FxHashMap<String, FxHashMap<String, usize>>, start: &str, goal: &str) -> bool {
    let mut stack = vec![start];
    let mut seen = rustc_hash::FxHashSet::default();

    while let Some(node) = stack.pop() {
        if node == goal {
            return true;
        }
        if !seen.insert(node) {
            continue;
        }
        if let Some(targets) = edges.get(node) {
            stack.extend(targets.keys().map(String::as_str));
        }
    }
    false
}

/// Removes its edge when dropped.
#[derive(Debug)]
pub struct WaitGuard<'a> {
    graph: &'a WaitGraph,
    from: String,
    to: String,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        self.graph.leave(&self.from, &self.to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_cycle_is_refused() {
        let graph = WaitGraph::new();
        let _a = graph.enter("a", "b").unwrap();
        assert!(graph.enter("b", "a").is_none());
        assert!(graph.enter("a", "a").is_none());
    }

    #[test]
    fn test_transitive_cycle_is_refused() {
        let graph = WaitGraph::new();
        let _ab = graph.enter("a", "b").unwrap();
        let _bc = graph.enter("b", "c").unwrap();
        assert!(graph.waits_on("a", "c"));
        assert!(graph.enter("c", "a").is_none());
        assert!(graph.enter("c", "d").is_some());
    }

    #[test]
    fn test_edges_removed_on_drop() {
        let graph = WaitGraph::new();
        {
            let _ab = graph.enter("a", "b").unwrap();
            let _ab_again = graph.enter("a", "b").unwrap();
        }
        assert!(!graph.waits_on("a", "b"));
        assert!(graph.enter("b", "a").is_some());
    }
}
