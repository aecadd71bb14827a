// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::cmp::Ordering;

use super::{CellInfo, Evaluation, MisfitScratch, Scorer};

/// Start or end of one arrival's origin-time range.
#[derive(Debug, Clone, Copy)]
pub(super) struct StackEvent {
    time: f64,
    opening: bool,
    estimate: f64,
    var: f64,
    weight: f64,
}

fn event_order(a: &StackEvent, b: &StackEvent) -> Ordering {
    a.time
        .total_cmp(&b.time)
        // openings first, so touching ranges overlap
        .then_with(|| b.opening.cmp(&a.opening))
}

#[derive(Debug, Default)]
struct Sums {
    count: usize,
    s0: f64,
    s1: f64,
    s2: f64,
    var: f64,
}

impl Sums {
    fn apply(&mut self, e: &StackEvent, sign: f64) {
        self.s0 += sign * e.weight;
        self.s1 += sign * e.weight * e.estimate;
        self.s2 += sign * e.weight * e.estimate * e.estimate;
        self.var += sign * e.var;
    }
}

/// Origin-time stacking.
///
/// Each timed arrival implies an origin-time range `est +/- h` with
/// `h = k sigma + half_diag_time`. The ranges are swept in time order and at
/// every opening the overlapping set is scored by its summed weight times a
/// coherence factor `1 / (1 + var / mean_var)`. The best overlap wins.
pub(super) fn evaluate(
    s: &Scorer,
    pred: &[Option<f64>],
    cell: &CellInfo,
    scratch: &mut MisfitScratch,
) -> Option<Evaluation> {
    let MisfitScratch { used, events, .. } = scratch;
    s.collect_timed(pred, used);
    if used.is_empty() {
        return None;
    }
    let k = s.method.ot_stack_sigma_factor;
    events.clear();
    for &i in used.iter() {
        let sigma = s.weights.sigmas[i];
        let half = k * sigma + cell.half_diag_time;
        let estimate = s.implied_origin(i, pred);
        let base = StackEvent {
            time: estimate - half,
            opening: true,
            estimate,
            var: sigma * sigma,
            weight: s.kernel_weight(i),
        };
        events.push(base);
        events.push(StackEvent {
            time: estimate + half,
            opening: false,
            ..base
        });
    }
    events.sort_unstable_by(event_order);

    let min_count = used.len().min(2);
    let mut sums = Sums::default();
    let mut best: Option<(f64, f64, f64, usize)> = None;
    for e in events.iter() {
        if !e.opening {
            sums.apply(e, -1.0);
            sums.count -= 1;
            continue;
        }
        sums.apply(e, 1.0);
        sums.count += 1;
        if sums.count < min_count || !(sums.s0 > 0.0) {
            continue;
        }
        let mean = sums.s1 / sums.s0;
        let var = (sums.s2 / sums.s0 - mean * mean).max(0.0);
        let mean_var = sums.var / sums.count as f64;
        let coherence = 1.0 / (1.0 + var / mean_var);
        let score = coherence * sums.s0;
        if best.map_or(true, |(b, ..)| score > b) {
            best = Some((score, mean, var, sums.count));
        }
    }

    let (score, mean, var, count) = best?;
    let (origin_time, origin_time_var) = match s.fixed_origin_time {
        Some(t) => (t, 0.0),
        None => (mean, var),
    };
    Some(Evaluation {
        ln_prob: score - cell.volume.ln(),
        misfit: -score,
        origin_time,
        origin_time_var,
        num_used: count,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::{LocMethod, MethodConfig};

    fn all(pred: &[f64]) -> Vec<Option<f64>> {
        pred.iter().map(|&t| Some(t)).collect()
    }

    #[test]
    fn stacks_the_coherent_subset() {
        let pred = [1.0, 2.0, 2.5, 3.0];
        let mut arr = arrivals(&pred, 4.0);
        arr[3].obs_time += 5.0;
        let s = scorer(&arr, MethodConfig::new(LocMethod::OtStack), 0.0);
        let mut scratch = s.scratch();
        let e = evaluate(&s, &all(&pred), &CellInfo::POINT, &mut scratch).unwrap();
        assert_eq!(e.num_used, 3);
        assert!((e.origin_time - 4.0).abs() < 1e-9);
        assert!((e.ln_prob - 3.0).abs() < 1e-9);
    }

    #[test]
    fn cell_volume_is_divided_out() {
        let pred = [1.0, 2.0, 2.5, 3.0];
        let s = scorer(&arrivals(&pred, 0.0), MethodConfig::new(LocMethod::OtStack), 0.0);
        let mut scratch = s.scratch();
        let point = evaluate(&s, &all(&pred), &CellInfo::POINT, &mut scratch).unwrap();
        let cell = CellInfo {
            volume: 8.0,
            ..CellInfo::POINT
        };
        let boxed = evaluate(&s, &all(&pred), &cell, &mut scratch).unwrap();
        assert!((point.ln_prob - boxed.ln_prob - 8.0f64.ln()).abs() < 1e-9);
    }

    #[test]
    fn touching_ranges_overlap() {
        let a = StackEvent {
            time: 1.0,
            opening: false,
            estimate: 0.0,
            var: 1.0,
            weight: 1.0,
        };
        let b = StackEvent { opening: true, ..a };
        assert_eq!(event_order(&b, &a), Ordering::Less);
    }
}
