// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use super::{NodeId, Octree, OctreeStop, StationDensity};
use crate::arrival::Station;
use crate::config::OctreeParams;
use crate::error::{LocateError, Result};
use crate::geometry::{SearchGrid, Vec3};
use crate::misfit::{CellInfo, Evaluation};
use crate::search::{log_sum_exp, Objective, ScatterSample, SearchOutcome, SearchStats};
use crate::stats::MomentAccumulator;

struct Builder<'a, O: Objective> {
    params: &'a OctreeParams,
    objective: &'a O,
    scratch: O::Scratch,
    density: Option<StationDensity>,
    tree: Octree,
    best: Option<(NodeId, Evaluation)>,
    rejected: usize,
}

impl<'a, O: Objective> Builder<'a, O> {
    fn score(&mut self, center: Vec3, size: Vec3) -> Option<Evaluation> {
        let cell = CellInfo::for_box(size, self.params.mean_cell_velocity);
        let eval = self.objective.evaluate(center, &cell, &mut self.scratch);
        if eval.is_none() {
            self.rejected += 1;
        }
        eval
    }

    fn note_best(&mut self, id: NodeId, eval: Evaluation) {
        if self.best.map_or(true, |(_, b)| eval.ln_prob > b.ln_prob) {
            self.best = Some((id, eval));
        }
    }

    fn enqueue(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        if node.is_valid() {
            let priority = node.value + node.volume().ln() + node.station_weight;
            self.tree.index_mut().insert(id, priority);
        }
    }

    fn below_floor(&self, id: NodeId) -> bool {
        self.tree.node(id).size.max_component() < self.params.min_node_size
    }

    fn evaluate_roots(&mut self) {
        for k in 0..self.tree.roots().len() {
            let id = self.tree.roots()[k];
            let (center, size) = {
                let n = self.tree.node(id);
                (n.center, n.size)
            };
            let eval = self.score(center, size);
            let weight = self
                .density
                .as_ref()
                .map_or(0.0, |d| d.weight(center, size, 0, 0.0));
            self.tree.node_mut(id).station_weight = weight;
            if let Some(e) = eval {
                self.tree.node_mut(id).value = e.ln_prob;
                self.note_best(id, e);
            }
            self.enqueue(id);
        }
    }

    fn split(&mut self, id: NodeId) {
        let cells = self.tree.child_cells(id);
        let parent = self.tree.node(id);
        let (level, parent_weight) = (parent.level + 1, parent.station_weight);
        let mut values = [f64::NEG_INFINITY; 8];
        let mut weights = [0.0; 8];
        let mut evals: [Option<Evaluation>; 8] = [None; 8];
        for (k, (center, size)) in cells.into_iter().enumerate() {
            evals[k] = self.score(center, size);
            if let Some(e) = evals[k] {
                values[k] = e.ln_prob;
            }
            if let Some(d) = &self.density {
                weights[k] = d.weight(center, size, level, parent_weight);
            }
        }
        let children = self.tree.subdivide(id, values, weights);
        for (k, &child) in children.iter().enumerate() {
            if let Some(e) = evals[k] {
                self.note_best(child, e);
            }
            self.enqueue(child);
        }
    }

    /// Same-level leaves adjacent to `id` across each face, still queued.
    fn neighbours(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.tree.node(id);
        let mut out = Vec::with_capacity(6);
        for axis in 0..3 {
            for sign in [-1.0, 1.0] {
                let mut probe = node.center;
                probe[axis] += sign * node.size[axis];
                let Some(n) = self.tree.leaf_containing(probe) else {
                    continue;
                };
                if n != id
                    && self.tree.node(n).level == node.level
                    && self.tree.index().contains(n)
                    && !out.contains(&n)
                {
                    out.push(n);
                }
            }
        }
        out
    }

    fn pop_target(&mut self) -> std::result::Result<NodeId, OctreeStop> {
        if self.params.stop_on_min_node_size {
            let (id, priority) = self.tree.index_mut().pop_max().ok_or(OctreeStop::IndexExhausted)?;
            if self.below_floor(id) {
                self.tree.index_mut().insert(id, priority);
                return Err(OctreeStop::MinNodeSize);
            }
            Ok(id)
        } else {
            if self.tree.index().is_empty() {
                return Err(OctreeStop::IndexExhausted);
            }
            let min = self.params.min_node_size;
            self.tree
                .pop_queued_where(|n| n.size.max_component() >= min)
                .map(|(id, _)| id)
                .ok_or(OctreeStop::MinNodeSize)
        }
    }

    fn refine(&mut self, with_neighbours: bool) -> OctreeStop {
        loop {
            let target = match self.pop_target() {
                Ok(id) => id,
                Err(stop) => return stop,
            };
            let mut targets = vec![target];
            if with_neighbours {
                for n in self.neighbours(target) {
                    if !self.below_floor(n) {
                        self.tree.index_mut().remove(n);
                        targets.push(n);
                    }
                }
            }
            for k in 0..targets.len() {
                if self.tree.len() + 8 > self.params.max_num_nodes {
                    for &id in &targets[k..] {
                        self.enqueue(id);
                    }
                    return OctreeStop::NodeBudget;
                }
                self.split(targets[k]);
            }
        }
    }
}

/// Draw scatter samples from the leaves, most probable first. Each leaf
/// gets `num * P(leaf)` samples, the fractional part resolved randomly, each
/// uniform within the leaf.
fn scatter(
    tree: &Octree,
    leaves: &[(NodeId, f64)],
    ln_norm: f64,
    num: usize,
    rng: &mut ChaCha8Rng,
) -> Vec<ScatterSample> {
    let mut samples = Vec::with_capacity(num);
    for &(id, ln_mass) in leaves {
        if samples.len() >= num {
            break;
        }
        let expected = num as f64 * (ln_mass - ln_norm).exp();
        let mut count = expected.floor() as usize;
        if rng.gen::<f64>() < expected - expected.floor() {
            count += 1;
        }
        let node = tree.node(id);
        for _ in 0..count.min(num - samples.len()) {
            let mut p = node.center;
            for axis in 0..3 {
                p[axis] += (rng.gen::<f64>() - 0.5) * node.size[axis];
            }
            samples.push(ScatterSample {
                position: p,
                ln_prob: node.value,
            });
        }
    }
    samples
}

/// Adaptive octree search.
///
/// Roots tiling the domain are scored at their centers, then the leaf with
/// the highest `ln p + ln V + station weight` is split, together with its
/// queued same-level face neighbours unless `skip_neighbours` is set. The
/// loop ends at the node budget, the size floor, or when nothing is left.
/// The posterior integral, moments and scatter samples come from the final
/// leaves.
///
/// # Errors
/// `NoValidSamples` if no root can be scored.
pub fn run<O: Objective>(
    grid: &SearchGrid,
    params: &OctreeParams,
    objective: &O,
    stations: &[Station],
    skip_neighbours: bool,
    seed: u64,
) -> Result<SearchOutcome> {
    let dims = params.init_num_cells;
    let root_size = params.root_size(grid);
    let density = params
        .station_density
        .and_then(|p| StationDensity::new(stations, p));
    if params.station_density.is_some() && density.is_none() {
        warn!("station density weighting needs two distinct stations, disabled");
    }

    let mut builder = Builder {
        params,
        objective,
        scratch: objective.scratch(),
        density,
        tree: Octree::new(grid.origin, root_size, dims),
        best: None,
        rejected: 0,
    };
    builder.evaluate_roots();
    if builder.best.is_none() {
        return Err(LocateError::NoValidSamples {
            evaluated: builder.tree.len(),
        });
    }
    let stop = builder.refine(!skip_neighbours);
    let Builder {
        tree,
        best,
        rejected,
        ..
    } = builder;
    let (best_id, best_eval) = best.ok_or(LocateError::NoValidSamples {
        evaluated: tree.len(),
    })?;

    // leaves by probability mass, most probable first
    let mut leaves: Vec<(NodeId, f64)> = tree
        .leaves()
        .filter(|&id| tree.node(id).is_valid())
        .map(|id| {
            let n = tree.node(id);
            (id, n.value + n.volume().ln())
        })
        .collect();
    leaves.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    let ln_norm = log_sum_exp(leaves.iter().map(|l| l.1));

    let best_node = tree.node(best_id);
    let mut acc = MomentAccumulator::new(best_node.center);
    if let Some(&(_, top)) = leaves.first() {
        for &(id, mass) in &leaves {
            acc.add(tree.node(id).center, (mass - top).exp());
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let samples = match ln_norm {
        Some(norm) => scatter(&tree, &leaves, norm, params.num_scatter, &mut rng),
        None => Vec::new(),
    };

    debug!(
        nodes = tree.len(),
        leaves = leaves.len(),
        rejected,
        ?stop,
        "octree search complete"
    );

    Ok(SearchOutcome {
        best: best_node.center,
        best_eval,
        samples,
        stats: SearchStats {
            evaluated: tree.len(),
            rejected,
            ln_normalization: ln_norm,
            stop: Some(stop),
            ..Default::default()
        },
        moments: acc.finish(),
        boundary_tolerance: best_node.size * 0.5 + Vec3::splat(1e-9),
        pdf_grid: None,
        octree: Some(tree),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationDensityParams;
    use crate::search::test_support::Bump;

    fn grid() -> SearchGrid {
        SearchGrid::new(Vec3::default(), Vec3::splat(1.0), [11, 11, 11]).unwrap()
    }

    fn params() -> OctreeParams {
        OctreeParams::default()
            .with_init_num_cells([5, 5, 5])
            .with_limits(3000, 0.05)
    }

    #[test]
    fn converges_on_peak() {
        let bump = Bump::new(Vec3::new(3.3, 6.1, 4.7), 0.7);
        let out = run(&grid(), &params(), &bump, &[], false, 1).unwrap();
        assert!(out.best.dist(&Vec3::new(3.3, 6.1, 4.7)) < 0.2, "best {:?}", out.best);
        let tree = out.octree.as_ref().unwrap();
        assert!(tree.len() <= 3000);
        assert_eq!(out.stats.stop, Some(OctreeStop::NodeBudget));
        assert!(out.samples.len() > 4800 && out.samples.len() <= 5000);
        let m = out.moments.unwrap();
        assert!(m.mean.dist(&Vec3::new(3.3, 6.1, 4.7)) < 0.2);
    }

    #[test]
    fn index_holds_exactly_the_valid_leaves() {
        let bump = Bump::new(Vec3::new(5.0, 5.0, 5.0), 1.0);
        let out = run(&grid(), &params().with_limits(600, 0.05), &bump, &[], false, 1).unwrap();
        let tree = out.octree.unwrap();
        for (id, node) in tree.nodes().iter().enumerate() {
            let queued = tree.index().contains(id);
            assert_eq!(queued, node.is_leaf() && node.is_valid(), "node {}", id);
        }
    }

    #[test]
    fn size_floor_stops_refinement() {
        let bump = Bump::new(Vec3::new(5.0, 5.0, 5.0), 0.2);
        let out = run(&grid(), &params().with_limits(100_000, 0.5), &bump, &[], true, 1).unwrap();
        assert_eq!(out.stats.stop, Some(OctreeStop::MinNodeSize));
        let tree = out.octree.unwrap();
        // only nodes at or above the floor were split
        for node in tree.nodes() {
            if !node.is_leaf() {
                assert!(node.size.max_component() >= 0.5);
            }
        }
    }

    #[test]
    fn skip_policy_drains_the_index() {
        let bump = Bump::new(Vec3::new(5.0, 5.0, 5.0), 0.2);
        let mut p = params().with_limits(100_000, 0.5);
        p.stop_on_min_node_size = false;
        let out = run(&grid(), &p, &bump, &[], true, 1).unwrap();
        assert_eq!(out.stats.stop, Some(OctreeStop::MinNodeSize));
        let tree = out.octree.unwrap();
        assert!(tree
            .index()
            .iter()
            .all(|(id, _)| tree.node(id).size.max_component() < 0.5));
    }

    #[test]
    fn rejected_cells_are_not_queued() {
        let mut bump = Bump::new(Vec3::new(7.0, 5.0, 5.0), 1.0);
        bump.reject_below_x = Some(4.0);
        let out = run(&grid(), &params().with_limits(500, 0.05), &bump, &[], false, 1).unwrap();
        assert!(out.stats.rejected > 0);
        let tree = out.octree.unwrap();
        for (id, _) in tree.index().iter() {
            assert!(tree.node(id).center.x >= 4.0);
        }
        assert!(out.samples.iter().all(|s| s.position.x >= 4.0 - 1.1));
    }

    #[test]
    fn no_valid_root() {
        let mut bump = Bump::new(Vec3::default(), 1.0);
        bump.reject_below_x = Some(1e9);
        let r = run(&grid(), &params(), &bump, &[], false, 1);
        assert!(matches!(r, Err(LocateError::NoValidSamples { evaluated: 125 })));
    }

    #[test]
    fn station_density_sets_root_weights() {
        let stations = vec![
            Station::new("A", Vec3::new(1.0, 1.0, 1.0)),
            Station::new("B", Vec3::new(9.0, 9.0, 1.0)),
        ];
        let mut p = params().with_limits(125, 0.05);
        p.station_density = Some(StationDensityParams::default());
        let bump = Bump::new(Vec3::new(5.0, 5.0, 5.0), 3.0);
        let out = run(&grid(), &p, &bump, &stations, false, 1).unwrap();
        let tree = out.octree.unwrap();
        // root 0 spans [0,2]^3 and holds station A
        assert_eq!(tree.node(0).station_weight, 3.0);
        let id = tree.leaf_containing(Vec3::new(9.0, 1.0, 9.0)).unwrap();
        assert!(tree.node(id).station_weight < 3.0);
    }
}
