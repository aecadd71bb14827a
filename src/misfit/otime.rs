// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use super::{CellInfo, Evaluation, MisfitScratch, Scorer};

const REFINE_STEPS: i32 = 10;
const REFINE_PASSES: usize = 3;

/// Maximum-likelihood origin time from per-arrival estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlOriginTime {
    /// Origin time maximizing the kernel sum (s).
    pub origin_time: f64,
    /// Likelihood-weighted variance of the estimates about it (s^2).
    pub variance: f64,
    /// Kernel sum at the maximum.
    pub likelihood: f64,
}

fn kernel_sum(est: &[f64], var: &[f64], w: &[f64], t: f64) -> f64 {
    est.iter()
        .zip(var)
        .zip(w)
        .map(|((e, v), w)| {
            let d = e - t;
            w * (-0.5 * d * d / v).exp()
        })
        .sum()
}

fn weighted_spread(est: &[f64], var: &[f64], w: &[f64], t: f64) -> f64 {
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for ((e, v), w) in est.iter().zip(var).zip(w) {
        let d = e - t;
        let lambda = w * (-0.5 * d * d / v).exp();
        sum += lambda;
        sum_sq += lambda * d * d;
    }
    if sum > 0.0 {
        sum_sq / sum
    } else {
        0.0
    }
}

/// Maximize `L(t) = sum_k w_k exp(-0.5 (est_k - t)^2 / var_k)`.
///
/// Each estimate is tried as a starting point, then the best one is refined
/// on a shrinking grid of `sigma_min / 4` steps. Returns `None` when there is
/// nothing to maximize (no estimates, no positive weight, or a non-positive
/// variance).
pub fn ml_origin_time(est: &[f64], var: &[f64], w: &[f64]) -> Option<MlOriginTime> {
    if est.is_empty() || est.len() != var.len() || est.len() != w.len() {
        return None;
    }
    if var.iter().any(|v| !(*v > 0.0)) || !w.iter().any(|w| *w > 0.0) {
        return None;
    }

    let mut best_t = est[0];
    let mut best = f64::NEG_INFINITY;
    for &t in est {
        let l = kernel_sum(est, var, w, t);
        if l > best {
            best = l;
            best_t = t;
        }
    }

    let var_min = var.iter().copied().fold(f64::INFINITY, f64::min);
    let mut step = 0.25 * var_min.sqrt();
    for _ in 0..REFINE_PASSES {
        let center = best_t;
        for j in -REFINE_STEPS..=REFINE_STEPS {
            let t = center + j as f64 * step;
            let l = kernel_sum(est, var, w, t);
            if l > best {
                best = l;
                best_t = t;
            }
        }
        step /= REFINE_STEPS as f64;
    }

    Some(MlOriginTime {
        origin_time: best_t,
        variance: weighted_spread(est, var, w, best_t),
        likelihood: best,
    })
}

/// Per-arrival origin-time estimates, variances and weights of the timed
/// arrivals. Returns the mean variance, or `None` if nothing is timed.
pub(super) fn fill_estimates(
    s: &Scorer,
    pred: &[Option<f64>],
    cell: &CellInfo,
    scratch: &mut MisfitScratch,
) -> Option<f64> {
    let MisfitScratch { used, est, var, w, .. } = scratch;
    s.collect_timed(pred, used);
    if used.is_empty() {
        return None;
    }
    est.clear();
    var.clear();
    w.clear();
    for &i in used.iter() {
        let sigma = s.weights.sigmas[i];
        est.push(s.implied_origin(i, pred));
        var.push(sigma * sigma + cell.time_var);
        w.push(s.kernel_weight(i));
    }
    Some(var.iter().sum::<f64>() / var.len() as f64)
}

/// Origin-time statistics of the timed arrivals for the EDT penalty and
/// report: ML result (or the fixed time) and the mean variance.
pub(super) fn origin_time_stats(
    s: &Scorer,
    pred: &[Option<f64>],
    cell: &CellInfo,
    scratch: &mut MisfitScratch,
) -> Option<(MlOriginTime, f64)> {
    let mean_var = fill_estimates(s, pred, cell, scratch)?;
    let (est, var, w) = (&scratch.est, &scratch.var, &scratch.w);
    let ml = match s.fixed_origin_time {
        Some(t) => MlOriginTime {
            origin_time: t,
            variance: weighted_spread(est, var, w, t),
            likelihood: kernel_sum(est, var, w, t),
        },
        None => ml_origin_time(est, var, w)?,
    };
    Some((ml, mean_var))
}

/// Kernel sum at the maximum-likelihood origin time, with the
/// origin-time variance term.
pub(super) fn ml_ot(
    s: &Scorer,
    pred: &[Option<f64>],
    cell: &CellInfo,
    scratch: &mut MisfitScratch,
) -> Option<Evaluation> {
    let (ml, mean_var) = origin_time_stats(s, pred, cell, scratch)?;
    let n = scratch.used.len();
    let ln_prob = n as f64 * ml.likelihood.max(f64::MIN_POSITIVE).ln()
        + s.ot_variance_term(n, ml.variance, mean_var);
    Some(Evaluation {
        ln_prob,
        misfit: -ln_prob,
        origin_time: ml.origin_time,
        origin_time_var: ml.variance,
        num_used: n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn single_estimate() {
        let r = ml_origin_time(&[3.0], &[0.01], &[1.0]).unwrap();
        assert_relative_eq!(r.origin_time, 3.0);
        assert_relative_eq!(r.likelihood, 1.0);
        assert_eq!(r.variance, 0.0);
    }

    #[test]
    fn ignores_outlier() {
        let est = [2.0, 2.01, 1.99, 2.0, 9.0];
        let var = [0.01; 5];
        let w = [1.0; 5];
        let r = ml_origin_time(&est, &var, &w).unwrap();
        assert!((r.origin_time - 2.0).abs() < 0.005, "{}", r.origin_time);
        assert!(r.likelihood > 3.9 && r.likelihood < 4.01);
    }

    #[test]
    fn refinement_finds_midpoint() {
        // two equal kernels 0.1 s apart peak halfway between them
        let r = ml_origin_time(&[1.0, 1.1], &[0.04, 0.04], &[1.0, 1.0]).unwrap();
        assert!((r.origin_time - 1.05).abs() < 1e-3, "{}", r.origin_time);
        assert!(r.variance > 0.0);
    }

    #[test]
    fn degenerate_inputs() {
        assert!(ml_origin_time(&[], &[], &[]).is_none());
        assert!(ml_origin_time(&[1.0], &[0.0], &[1.0]).is_none());
        assert!(ml_origin_time(&[1.0, 2.0], &[0.1, 0.1], &[0.0, 0.0]).is_none());
    }
}
