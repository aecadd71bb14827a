// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use super::otime::origin_time_stats;
use super::{CellInfo, Evaluation, MisfitScratch, Scorer};
use crate::config::OtWeighting;

/// Equal differential time: sum over arrival pairs of a kernel on the
/// difference between observed and predicted time differences. No origin
/// time enters the pair terms.
///
/// A pair where either arrival lacks absolute timing is only used when both
/// were recorded on the same clock.
pub(super) fn evaluate(
    s: &Scorer,
    pred: &[Option<f64>],
    cell: &CellInfo,
    box_kernel: bool,
    scratch: &mut MisfitScratch,
) -> Option<Evaluation> {
    let wd = &s.weights;
    let n = s.len();
    let participants = &mut scratch.used;
    participants.clear();

    let mut sum = 0.0;
    let mut num_pairs = 0usize;
    for a in 0..n {
        let Some(pa) = pred[a] else { continue };
        for b in (a + 1)..n {
            let Some(pb) = pred[b] else { continue };
            if !(s.abs_timing[a] && s.abs_timing[b]) && !s.same_clock(a, b) {
                continue;
            }
            let d = (s.obs[a] - s.obs[b]) - (pa - pb);
            let pair_weight =
                (1.0 - wd.edt_matrix[(a, b)]) * wd.station_weights[a] * wd.station_weights[b];
            let kernel = if box_kernel {
                let half = wd.pick_errors[a]
                    + wd.tt_errors[a]
                    + wd.pick_errors[b]
                    + wd.tt_errors[b]
                    + cell.half_diag_time;
                if d.abs() <= half {
                    1.0
                } else {
                    0.0
                }
            } else {
                let var = wd.edt_matrix[(a, a)] + wd.edt_matrix[(b, b)] + 2.0 * cell.time_var;
                (-0.5 * d * d / var).exp()
            };
            sum += pair_weight * kernel;
            num_pairs += 1;
            participants.push(a);
            participants.push(b);
        }
    }
    if num_pairs == 0 {
        return None;
    }
    participants.sort_unstable();
    participants.dedup();
    let num_used = participants.len();

    let mut ln_prob = num_used as f64 * sum.max(f64::MIN_POSITIVE).ln();

    let mut origin_time = s.fixed_origin_time.unwrap_or(0.0);
    let mut origin_time_var = f64::INFINITY;
    match s.method.ot_weighting {
        OtWeighting::Off => {
            s.collect_timed(pred, &mut scratch.used);
            if !scratch.used.is_empty() {
                (origin_time, origin_time_var) = s.centered_origin_time(&scratch.used, pred);
            }
        }
        weighting => {
            if let Some((ml, mean_var)) = origin_time_stats(s, pred, cell, scratch) {
                ln_prob += s.ot_variance_term(num_used, ml.variance, mean_var);
                origin_time_var = ml.variance;
                origin_time = if weighting == OtWeighting::MaximumLikelihood {
                    ml.origin_time
                } else {
                    s.centered_origin_time(&scratch.used, pred).0
                };
            }
        }
    }

    Some(Evaluation {
        ln_prob,
        misfit: -ln_prob,
        origin_time,
        origin_time_var,
        num_used,
    })
}
