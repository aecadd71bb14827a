// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Search strategies over the location domain.
//!
//! All three strategies see the problem only through [`Objective`]: score a
//! point (or a cell, via [`CellInfo`]) and get back an [`Evaluation`], or
//! `None` when the candidate cannot be scored. Each produces a
//! [`SearchOutcome`] that the finalizer turns into a hypocenter.

use ndarray::Array3;
use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;
use crate::misfit::{CellInfo, Evaluation};
use crate::stats::Moments;

pub mod grid;
pub mod metropolis;
pub mod octree;

pub use self::octree::{Octree, OctreeStop};

/// Function maximized by the searches.
///
/// Implementations must be shareable across the grid-search workers; each
/// worker owns one `Scratch`.
pub trait Objective: Sync {
    /// Per-worker reusable buffers.
    type Scratch: Send;

    /// Fresh scratch buffers.
    fn scratch(&self) -> Self::Scratch;

    /// Score `p`. `None` means the point is rejected (for instance a travel
    /// time could not be resolved); searches count it and move on.
    fn evaluate(&self, p: Vec3, cell: &CellInfo, scratch: &mut Self::Scratch)
        -> Option<Evaluation>;

    /// False for points that are not candidates at all, such as points above
    /// the surface. The grid search skips them without counting a rejection.
    fn is_admissible(&self, _p: Vec3) -> bool {
        true
    }
}

/// One sample drawn from the location PDF.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterSample {
    /// Sample position.
    pub position: Vec3,
    /// Log probability density at the sample.
    pub ln_prob: f64,
}

/// Bookkeeping of one search run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Objective evaluations attempted.
    pub evaluated: usize,
    /// Evaluations that returned no score.
    pub rejected: usize,
    /// Grid nodes skipped as inadmissible.
    pub skipped: usize,
    /// Accepted Metropolis proposals.
    pub accepted: usize,
    /// Metropolis proposals clipped to the domain.
    pub clipped: usize,
    /// Metropolis samples accepted without the Metropolis test after the
    /// retry ceiling.
    pub forced_accepts: usize,
    /// `ln` of the integral of the PDF over the domain, where computed.
    pub ln_normalization: Option<f64>,
    /// Why the octree stopped subdividing.
    pub stop: Option<OctreeStop>,
}

/// Result of a search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Maximum-likelihood point.
    pub best: Vec3,
    /// Score at `best`.
    pub best_eval: Evaluation,
    /// Samples of the PDF (empty for the grid search).
    pub samples: Vec<ScatterSample>,
    /// Counters.
    pub stats: SearchStats,
    /// Mean and covariance of the PDF.
    pub moments: Option<Moments>,
    /// Distance from a domain face under which `best` counts as on the
    /// boundary.
    pub boundary_tolerance: Vec3,
    /// Normalized log probability at every grid node (grid search only).
    pub pdf_grid: Option<Array3<f64>>,
    /// Final tree (octree search only).
    pub octree: Option<Octree>,
}

/// `ln(sum exp(v))` over the finite values; `None` if there are none.
pub fn log_sum_exp<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64> + Clone,
{
    let max = values
        .clone()
        .into_iter()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let sum: f64 = values
        .into_iter()
        .filter(|v| v.is_finite())
        .map(|v| (v - max).exp())
        .sum();
    Some(max + sum.ln())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Isotropic Gaussian bump: `ln p = -0.5 |p - center|^2 / sigma^2`.
    pub struct Bump {
        pub center: Vec3,
        pub sigma: f64,
        /// Points with `x` below this are rejected.
        pub reject_below_x: Option<f64>,
    }

    impl Bump {
        pub fn new(center: Vec3, sigma: f64) -> Self {
            Bump {
                center,
                sigma,
                reject_below_x: None,
            }
        }
    }

    impl Objective for Bump {
        type Scratch = ();

        fn scratch(&self) -> Self::Scratch {}

        fn evaluate(&self, p: Vec3, _cell: &CellInfo, _scratch: &mut ()) -> Option<Evaluation> {
            if let Some(x) = self.reject_below_x {
                if p.x < x {
                    return None;
                }
            }
            let d2 = {
                let d = p - self.center;
                d.x * d.x + d.y * d.y + d.z * d.z
            };
            let ln_prob = -0.5 * d2 / (self.sigma * self.sigma);
            Some(Evaluation {
                ln_prob,
                misfit: d2.sqrt(),
                origin_time: 0.0,
                origin_time_var: 0.0,
                num_used: 1,
            })
        }
    }
}
