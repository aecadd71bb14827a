// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use super::{CellInfo, Evaluation, MisfitScratch, Scorer};

const SHIFT_STEPS: i32 = 10;
const SHIFT_PASSES: usize = 3;

/// Fill `res` with residuals about the centered origin time and return
/// `(origin_time, origin_time_var)`.
fn residuals(
    s: &Scorer,
    pred: &[Option<f64>],
    used: &[usize],
    res: &mut Vec<f64>,
) -> (f64, f64) {
    let (ot, ot_var) = s.centered_origin_time(used, pred);
    res.clear();
    res.extend(used.iter().map(|&i| s.implied_origin(i, pred) - ot));
    (ot, ot_var)
}

/// Gaussian likelihood with the origin time removed analytically.
pub(super) fn analytic(
    s: &Scorer,
    pred: &[Option<f64>],
    scratch: &mut MisfitScratch,
) -> Option<Evaluation> {
    let MisfitScratch { used, est, .. } = scratch;
    s.collect_timed(pred, used);
    if used.is_empty() {
        return None;
    }
    let (ot, ot_var) = residuals(s, pred, used, est);

    let w = &s.weights.weight_matrix;
    let mut q = 0.0;
    for (ia, &a) in used.iter().enumerate() {
        q += w[(a, a)] * est[ia] * est[ia];
        for (ib, &b) in used.iter().enumerate().skip(ia + 1) {
            q += 2.0 * w[(a, b)] * est[ia] * est[ib];
        }
    }
    let n = used.len();
    Some(Evaluation {
        ln_prob: -0.5 * q,
        misfit: (q.max(0.0) / n as f64).sqrt(),
        origin_time: ot,
        origin_time_var: ot_var,
        num_used: n,
    })
}

fn shifted_likelihood(res: &[f64], var: &[f64], w: &[f64], shift: f64) -> f64 {
    res.iter()
        .zip(var)
        .zip(w)
        .map(|((r, v), w)| {
            let d = r - shift;
            w * (-0.5 * d * d / v).exp()
        })
        .sum()
}

/// Sum of per-arrival Gaussian kernels, maximized over an origin-time shift
/// by a coarse-to-fine line search.
pub(super) fn line_search(
    s: &Scorer,
    pred: &[Option<f64>],
    cell: &CellInfo,
    scratch: &mut MisfitScratch,
) -> Option<Evaluation> {
    let MisfitScratch { used, est, var, w, .. } = scratch;
    s.collect_timed(pred, used);
    if used.is_empty() {
        return None;
    }
    let (ot, ot_var) = residuals(s, pred, used, est);
    var.clear();
    var.extend(used.iter().map(|&i| {
        let sigma = s.weights.sigmas[i];
        sigma * sigma + cell.time_var
    }));
    w.clear();
    w.extend(used.iter().map(|&i| s.kernel_weight(i)));

    let mut best_shift = 0.0;
    let mut best = shifted_likelihood(est, var, w, 0.0);
    if s.fixed_origin_time.is_none() {
        let mut step = est.iter().fold(0.0f64, |m, r| m.max(r.abs())) / SHIFT_STEPS as f64;
        for _ in 0..SHIFT_PASSES {
            if !(step > 0.0) {
                break;
            }
            let center = best_shift;
            for j in -SHIFT_STEPS..=SHIFT_STEPS {
                let shift = center + j as f64 * step;
                let p = shifted_likelihood(est, var, w, shift);
                if p > best {
                    best = p;
                    best_shift = shift;
                }
            }
            step /= SHIFT_STEPS as f64;
        }
    }

    let sum_w: f64 = w.iter().sum();
    let ss: f64 = est
        .iter()
        .zip(w.iter())
        .map(|(r, w)| w * (r - best_shift) * (r - best_shift))
        .sum();
    let misfit = if sum_w > 0.0 { (ss / sum_w).sqrt() } else { 0.0 };

    Some(Evaluation {
        ln_prob: best.max(f64::MIN_POSITIVE).ln(),
        misfit,
        origin_time: ot + best_shift,
        origin_time_var: ot_var,
        num_used: used.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::{LocMethod, MethodConfig};
    use approx::assert_relative_eq;

    fn all(pred: &[f64]) -> Vec<Option<f64>> {
        pred.iter().map(|&t| Some(t)).collect()
    }

    #[test]
    fn analytic_recovers_origin_time_and_zero_misfit() {
        let pred = [1.2, 2.3, 1.9, 2.8];
        let arr = arrivals(&pred, 7.5);
        let s = scorer(&arr, MethodConfig::new(LocMethod::GauAnalytic), 0.0);
        let mut scratch = s.scratch();
        let e = analytic(&s, &all(&pred), &mut scratch).unwrap();
        assert_relative_eq!(e.origin_time, 7.5, epsilon = 1e-12);
        assert_relative_eq!(e.ln_prob, 0.0, epsilon = 1e-12);
        assert_relative_eq!(e.misfit, 0.0, epsilon = 1e-6);
        assert!(e.origin_time_var > 0.0);
    }

    #[test]
    fn analytic_penalizes_inconsistent_times() {
        let pred = [1.2, 2.3, 1.9, 2.8];
        let arr = arrivals(&pred, 0.0);
        let s = scorer(&arr, MethodConfig::new(LocMethod::GauAnalytic), 0.0);
        let mut scratch = s.scratch();
        let good = analytic(&s, &all(&pred), &mut scratch).unwrap();
        let bad = analytic(&s, &all(&[1.2, 2.3, 1.9, 3.3]), &mut scratch).unwrap();
        assert!(bad.ln_prob < good.ln_prob);
        assert!(bad.misfit > good.misfit);
    }

    #[test]
    fn analytic_skips_arrivals_without_absolute_timing() {
        let pred = [1.2, 2.3, 1.9, 2.8];
        let mut arr = arrivals(&pred, 3.0);
        arr[3] = arr[3].clone().without_abs_timing();
        arr[3].obs_time += 100.0;
        let s = scorer(&arr, MethodConfig::new(LocMethod::GauAnalytic), 0.0);
        let mut scratch = s.scratch();
        let e = analytic(&s, &all(&pred), &mut scratch).unwrap();
        assert_eq!(e.num_used, 3);
        assert_relative_eq!(e.origin_time, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn line_search_finds_shift_of_outlier_free_cluster() {
        // three consistent arrivals and one outlier: the kernel sum should
        // lock onto the cluster rather than the weighted mean
        let pred = [1.0, 2.0, 3.0, 4.0];
        let mut arr = arrivals(&pred, 5.0);
        arr[3].obs_time += 2.0;
        let s = scorer(&arr, MethodConfig::new(LocMethod::GauTest), 0.0);
        let mut scratch = s.scratch();
        let e = line_search(&s, &all(&pred), &CellInfo::POINT, &mut scratch).unwrap();
        assert!((e.origin_time - 5.0).abs() < 0.01, "ot {}", e.origin_time);
    }

    #[test]
    fn fixed_origin_time_is_reported() {
        let pred = [1.0, 2.0, 3.0, 4.0];
        let arr = arrivals(&pred, 5.0);
        let mut s = scorer(&arr, MethodConfig::new(LocMethod::GauTest), 0.0);
        s.fixed_origin_time = Some(4.9);
        let mut scratch = s.scratch();
        let e = line_search(&s, &all(&pred), &CellInfo::POINT, &mut scratch).unwrap();
        assert_eq!(e.origin_time, 4.9);
        assert_eq!(e.origin_time_var, 0.0);
    }
}
