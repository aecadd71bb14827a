// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::cmp::{Ordering, Reverse};
use std::collections::BTreeSet;

use super::NodeId;

/// f64 with a total order, for use as a set key.
#[derive(Debug, Clone, Copy)]
struct Priority(f64);

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Priority queue of octree leaves supporting removal by id.
///
/// Equal priorities pop in ascending id order. A node is present at most
/// once; inserting it again replaces its priority.
#[derive(Debug, Clone, Default)]
pub struct ResultIndex {
    set: BTreeSet<(Priority, Reverse<NodeId>)>,
    keys: Vec<Option<f64>>,
}

impl ResultIndex {
    /// Number of queued nodes.
    pub fn len(&self) -> usize {
        self.set.len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// True if `id` is queued.
    pub fn contains(&self, id: NodeId) -> bool {
        self.priority(id).is_some()
    }

    /// Priority of `id`, if queued.
    pub fn priority(&self, id: NodeId) -> Option<f64> {
        self.keys.get(id).copied().flatten()
    }

    /// Queue `id` with `priority`, replacing any earlier entry.
    pub fn insert(&mut self, id: NodeId, priority: f64) {
        self.remove(id);
        if self.keys.len() <= id {
            self.keys.resize(id + 1, None);
        }
        self.keys[id] = Some(priority);
        self.set.insert((Priority(priority), Reverse(id)));
    }

    /// Remove `id`. Returns whether it was queued.
    pub fn remove(&mut self, id: NodeId) -> bool {
        match self.keys.get_mut(id).and_then(Option::take) {
            Some(p) => self.set.remove(&(Priority(p), Reverse(id))),
            None => false,
        }
    }

    /// Remove and return the highest-priority node.
    pub fn pop_max(&mut self) -> Option<(NodeId, f64)> {
        let (Priority(p), Reverse(id)) = self.set.pop_last()?;
        self.keys[id] = None;
        Some((id, p))
    }

    /// Remove and return the highest-priority node satisfying `pred`.
    pub fn pop_max_where<F>(&mut self, mut pred: F) -> Option<(NodeId, f64)>
    where
        F: FnMut(NodeId) -> bool,
    {
        let found = self
            .set
            .iter()
            .rev()
            .find(|(_, Reverse(id))| pred(*id))
            .copied()?;
        self.set.remove(&found);
        let (Priority(p), Reverse(id)) = found;
        self.keys[id] = None;
        Some((id, p))
    }

    /// Queued nodes, highest priority first.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.set.iter().rev().map(|(Priority(p), Reverse(id))| (*id, *p))
    }
}
