// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Exhaustive evaluation of every search-grid node.

use ndarray::Array3;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::config::GridSearchParams;
use crate::error::{LocateError, Result};
use crate::geometry::SearchGrid;
use crate::misfit::{CellInfo, Evaluation};
use crate::search::{log_sum_exp, Objective, SearchOutcome, SearchStats};
use crate::stats::MomentAccumulator;

#[derive(Debug, Clone, Copy)]
enum NodeResult {
    Skipped,
    Rejected,
    Scored(Evaluation),
}

impl NodeResult {
    fn ln_prob(&self) -> f64 {
        match self {
            NodeResult::Scored(e) => e.ln_prob,
            _ => f64::NEG_INFINITY,
        }
    }
}

/// Evaluate every admissible node, in parallel over x-planes.
///
/// The maximum is taken sequentially afterwards, so ties go to the lowest
/// flat index regardless of the thread count. Nodes are normalized as cells
/// of volume `dx * dy * dz`.
///
/// # Errors
/// `NoValidSamples` if no node can be scored; thread pool failures.
pub fn run<O: Objective>(
    grid: &SearchGrid,
    params: &GridSearchParams,
    objective: &O,
) -> Result<SearchOutcome> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(params.threads.unwrap_or(0))
        .build()
        .map_err(|e| LocateError::Other(e.to_string()))?;

    let [_, ny, nz] = grid.num;
    let num_nodes = grid.num_nodes();
    let mut results = vec![NodeResult::Skipped; num_nodes];
    pool.install(|| {
        results.par_chunks_mut(ny * nz).enumerate().for_each_init(
            || objective.scratch(),
            |scratch, (ix, plane)| {
                for (k, slot) in plane.iter_mut().enumerate() {
                    let p = grid.node([ix, k / nz, k % nz]);
                    if !objective.is_admissible(p) {
                        continue;
                    }
                    *slot = match objective.evaluate(p, &CellInfo::POINT, scratch) {
                        Some(e) => NodeResult::Scored(e),
                        None => NodeResult::Rejected,
                    };
                }
            },
        )
    });

    let mut best: Option<(usize, Evaluation)> = None;
    let (mut rejected, mut skipped) = (0usize, 0usize);
    for (flat, r) in results.iter().enumerate() {
        match r {
            NodeResult::Skipped => skipped += 1,
            NodeResult::Rejected => rejected += 1,
            NodeResult::Scored(e) => {
                if best.map_or(true, |(_, b)| e.ln_prob > b.ln_prob) {
                    best = Some((flat, *e));
                }
            }
        }
    }
    let evaluated = num_nodes - skipped;
    let (best_flat, best_eval) = best.ok_or(LocateError::NoValidSamples { evaluated })?;
    if rejected * 10 > evaluated {
        warn!(rejected, evaluated, "grid search rejected more than 10% of nodes");
    }

    let ln_cell = grid.spacing.product().ln();
    let ln_norm = log_sum_exp(results.iter().map(NodeResult::ln_prob)).map(|v| v + ln_cell);

    let best_point = grid.node(grid.flat_to_nd(best_flat));
    let mut acc = MomentAccumulator::new(best_point);
    let mut pdf = Array3::from_elem((grid.num[0], grid.num[1], grid.num[2]), f64::NEG_INFINITY);
    for (flat, r) in results.iter().enumerate() {
        if let NodeResult::Scored(e) = r {
            let idx = grid.flat_to_nd(flat);
            acc.add(grid.node(idx), (e.ln_prob - best_eval.ln_prob).exp());
            if let Some(norm) = ln_norm {
                pdf[(idx[0], idx[1], idx[2])] = e.ln_prob - norm;
            }
        }
    }
    debug!(
        evaluated,
        rejected,
        skipped,
        best_ln_prob = best_eval.ln_prob,
        "grid search complete"
    );

    Ok(SearchOutcome {
        best: best_point,
        best_eval,
        samples: Vec::new(),
        stats: SearchStats {
            evaluated,
            rejected,
            skipped,
            ln_normalization: ln_norm,
            ..Default::default()
        },
        moments: acc.finish(),
        boundary_tolerance: grid.spacing * 0.01,
        pdf_grid: Some(pdf),
        octree: None,
    })
}
