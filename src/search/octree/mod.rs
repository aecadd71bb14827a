// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Adaptive octree over the search domain.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. The roots
//! tile the domain box; a node is split into eight half-size children, with
//! child `k` on the high side of axis `a` iff bit `a` of `k` is set. Leaves
//! waiting to be split are ranked in a [`ResultIndex`] owned by the tree.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

mod result_index;
mod search;
mod station_density;

pub use self::result_index::ResultIndex;
pub use self::search::run;
pub use self::station_density::StationDensity;

/// Index of a node in the arena.
pub type NodeId = usize;

/// Why the subdivision loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OctreeStop {
    /// Splitting the next node would exceed the node budget.
    NodeBudget,
    /// The best remaining node is below the size floor.
    MinNodeSize,
    /// No leaf is left to split.
    IndexExhausted,
}

/// One cell of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct OctNode {
    /// Cell center, where the objective was evaluated.
    pub center: Vec3,
    /// Side lengths.
    pub size: Vec3,
    /// Log probability density at the center; `-inf` if it could not be
    /// scored.
    pub value: f64,
    /// Depth below the roots (roots are level 0).
    pub level: usize,
    /// Parent node, `None` for roots.
    pub parent: Option<NodeId>,
    /// Children, once split.
    pub children: Option<[NodeId; 8]>,
    /// Station-density priority bonus.
    pub station_weight: f64,
}

impl OctNode {
    /// True if the node has not been split.
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// True if the node could be scored.
    pub fn is_valid(&self) -> bool {
        self.value.is_finite()
    }

    /// Cell volume.
    pub fn volume(&self) -> f64 {
        self.size.product()
    }

    /// True if `p` lies in the closed cell box.
    pub fn contains(&self, p: Vec3) -> bool {
        (0..3).all(|a| (p[a] - self.center[a]).abs() <= 0.5 * self.size[a])
    }
}

/// Octree arena with its priority index.
#[derive(Debug, Clone)]
pub struct Octree {
    nodes: Vec<OctNode>,
    roots: Vec<NodeId>,
    origin: Vec3,
    root_size: Vec3,
    dims: [usize; 3],
    index: ResultIndex,
}

impl Octree {
    /// Tile the box at `origin` with `dims` roots of side `root_size`.
    /// Roots start unscored.
    pub fn new(origin: Vec3, root_size: Vec3, dims: [usize; 3]) -> Self {
        let mut tree = Octree {
            nodes: Vec::with_capacity(dims.iter().product()),
            roots: Vec::with_capacity(dims.iter().product()),
            origin,
            root_size,
            dims,
            index: ResultIndex::default(),
        };
        for ix in 0..dims[0] {
            for iy in 0..dims[1] {
                for iz in 0..dims[2] {
                    let center = Vec3::new(
                        origin.x + (ix as f64 + 0.5) * root_size.x,
                        origin.y + (iy as f64 + 0.5) * root_size.y,
                        origin.z + (iz as f64 + 0.5) * root_size.z,
                    );
                    let id = tree.push(OctNode {
                        center,
                        size: root_size,
                        value: f64::NEG_INFINITY,
                        level: 0,
                        parent: None,
                        children: None,
                        station_weight: 0.0,
                    });
                    tree.roots.push(id);
                }
            }
        }
        tree
    }

    fn push(&mut self, node: OctNode) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Number of nodes, roots included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if the tree has no node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node `id`.
    pub fn node(&self, id: NodeId) -> &OctNode {
        &self.nodes[id]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut OctNode {
        &mut self.nodes[id]
    }

    /// All nodes in creation order.
    pub fn nodes(&self) -> &[OctNode] {
        &self.nodes
    }

    /// Root ids.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Leaves queued for splitting.
    pub fn index(&self) -> &ResultIndex {
        &self.index
    }

    pub(crate) fn index_mut(&mut self) -> &mut ResultIndex {
        &mut self.index
    }

    /// Pop the highest-priority queued node whose cell satisfies `pred`.
    pub(crate) fn pop_queued_where<F>(&mut self, mut pred: F) -> Option<(NodeId, f64)>
    where
        F: FnMut(&OctNode) -> bool,
    {
        let nodes = &self.nodes;
        self.index.pop_max_where(|id| pred(&nodes[id]))
    }

    /// Ids of all leaves.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_leaf())
            .map(|(id, _)| id)
    }

    /// Centers and sizes of the eight children `id` would have.
    pub fn child_cells(&self, id: NodeId) -> [(Vec3, Vec3); 8] {
        let node = &self.nodes[id];
        let half = node.size * 0.5;
        let quarter = node.size * 0.25;
        std::array::from_fn(|k| {
            let mut c = node.center;
            for axis in 0..3 {
                if k & (1 << axis) != 0 {
                    c[axis] += quarter[axis];
                } else {
                    c[axis] -= quarter[axis];
                }
            }
            (c, half)
        })
    }

    /// Split leaf `id`, attaching children with the given values and
    /// station weights (in child-index order).
    pub fn subdivide(&mut self, id: NodeId, values: [f64; 8], weights: [f64; 8]) -> [NodeId; 8] {
        debug_assert!(self.nodes[id].is_leaf());
        let cells = self.child_cells(id);
        let level = self.nodes[id].level + 1;
        let first = self.nodes.len();
        for (k, (center, size)) in cells.into_iter().enumerate() {
            self.push(OctNode {
                center,
                size,
                value: values[k],
                level,
                parent: Some(id),
                children: None,
                station_weight: weights[k],
            });
        }
        let children = std::array::from_fn(|k| first + k);
        self.nodes[id].children = Some(children);
        children
    }

    /// Leaf whose cell contains `p`, or `None` outside the domain.
    pub fn leaf_containing(&self, p: Vec3) -> Option<NodeId> {
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            let t = (p[axis] - self.origin[axis]) / self.root_size[axis];
            let n = self.dims[axis] as f64;
            if !(t >= 0.0 && t <= n) {
                return None;
            }
            // points on the far face belong to the last root
            idx[axis] = (t.floor() as usize).min(self.dims[axis] - 1);
        }
        let mut id = self.roots[(idx[0] * self.dims[1] + idx[1]) * self.dims[2] + idx[2]];
        while let Some(children) = self.nodes[id].children {
            let center = self.nodes[id].center;
            let k = (0..3).fold(0, |k, axis| {
                if p[axis] >= center[axis] {
                    k | (1 << axis)
                } else {
                    k
                }
            });
            id = children[k];
        }
        Some(id)
    }
}
