// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Likelihood and misfit evaluation of a candidate location.
//!
//! A [`Scorer`] holds everything about the event that does not depend on the
//! candidate point: observed times, timing flags, clock groups and the weight
//! products. Given the predicted travel times at a point it dispatches to the
//! configured [`LocMethod`] kernel. Shared bookkeeping (which arrivals are
//! usable, origin-time centering) lives here so the kernels only score.

use crate::arrival::Arrival;
use crate::config::{LocMethod, MethodConfig};
use crate::geometry::Vec3;
use crate::weights::WeightData;

mod edt;
mod gaussian;
mod ot_stack;
mod otime;

pub use self::otime::{ml_origin_time, MlOriginTime};

/// Score of one candidate point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// Log probability density (higher is better).
    pub ln_prob: f64,
    /// Misfit (lower is better); RMS-like for the Gaussian methods.
    pub misfit: f64,
    /// Origin time estimate (s).
    pub origin_time: f64,
    /// Origin time variance (s^2).
    pub origin_time_var: f64,
    /// Number of arrivals that contributed.
    pub num_used: usize,
}

/// Size-dependent terms for scoring a cell rather than a point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellInfo {
    /// Extra time variance from the cell size (s^2).
    pub time_var: f64,
    /// Travel time across half the cell diagonal (s).
    pub half_diag_time: f64,
    /// Cell volume (km^3).
    pub volume: f64,
}

impl CellInfo {
    /// A point: no size terms, unit volume.
    pub const POINT: CellInfo = CellInfo {
        time_var: 0.0,
        half_diag_time: 0.0,
        volume: 1.0,
    };

    /// Terms for a box of side lengths `size`. Without a characteristic
    /// velocity only the volume is used.
    pub fn for_box(size: Vec3, mean_cell_velocity: Option<f64>) -> CellInfo {
        let half_diag_time = match mean_cell_velocity {
            Some(v) if v > 0.0 => 0.5 * size.norm() / v,
            _ => 0.0,
        };
        CellInfo {
            time_var: half_diag_time * half_diag_time,
            half_diag_time,
            volume: size.product(),
        }
    }
}

/// Reusable buffers for one search worker.
#[derive(Debug, Default, Clone)]
pub struct MisfitScratch {
    used: Vec<usize>,
    est: Vec<f64>,
    var: Vec<f64>,
    w: Vec<f64>,
    events: Vec<ot_stack::StackEvent>,
}

/// Per-event scorer over the active arrivals.
#[derive(Debug, Clone)]
pub struct Scorer {
    method: MethodConfig,
    obs: Vec<f64>,
    abs_timing: Vec<bool>,
    clock_group: Vec<usize>,
    weights: WeightData,
    fixed_origin_time: Option<f64>,
}

impl Scorer {
    /// Create a scorer for `arrivals` (the active set, in weight-matrix
    /// order).
    pub fn new(
        method: MethodConfig,
        arrivals: &[&Arrival],
        weights: WeightData,
        fixed_origin_time: Option<f64>,
    ) -> Self {
        let mut clocks: Vec<(&str, Option<&str>)> = Vec::new();
        let clock_group = arrivals
            .iter()
            .map(|a| {
                let key = (a.station.label.as_str(), a.instrument.as_deref());
                match clocks.iter().position(|c| *c == key) {
                    Some(g) => g,
                    None => {
                        clocks.push(key);
                        clocks.len() - 1
                    }
                }
            })
            .collect();
        Scorer {
            method,
            obs: arrivals.iter().map(|a| a.obs_time).collect(),
            abs_timing: arrivals.iter().map(|a| a.abs_timing).collect(),
            clock_group,
            weights,
            fixed_origin_time,
        }
    }

    /// Number of active arrivals.
    pub fn len(&self) -> usize {
        self.obs.len()
    }

    /// True if there are no active arrivals.
    pub fn is_empty(&self) -> bool {
        self.obs.is_empty()
    }

    /// Scoring method.
    pub fn method(&self) -> &MethodConfig {
        &self.method
    }

    /// Weight products.
    pub fn weights(&self) -> &WeightData {
        &self.weights
    }

    /// Fresh scratch buffers.
    pub fn scratch(&self) -> MisfitScratch {
        let n = self.len();
        MisfitScratch {
            used: Vec::with_capacity(n),
            est: Vec::with_capacity(n),
            var: Vec::with_capacity(n),
            w: Vec::with_capacity(n),
            events: Vec::with_capacity(2 * n),
        }
    }

    /// Score a candidate from its predicted travel times (one per active
    /// arrival, `None` where unresolved).
    ///
    /// Returns `None` when no arrival can contribute.
    pub fn evaluate(
        &self,
        pred: &[Option<f64>],
        cell: &CellInfo,
        scratch: &mut MisfitScratch,
    ) -> Option<Evaluation> {
        debug_assert_eq!(pred.len(), self.len());
        match self.method.method {
            LocMethod::GauAnalytic => gaussian::analytic(self, pred, scratch),
            LocMethod::GauTest => gaussian::line_search(self, pred, cell, scratch),
            LocMethod::Edt => edt::evaluate(self, pred, cell, false, scratch),
            LocMethod::EdtBox => edt::evaluate(self, pred, cell, true, scratch),
            LocMethod::MlOt => otime::ml_ot(self, pred, cell, scratch),
            LocMethod::OtStack => ot_stack::evaluate(self, pred, cell, scratch),
        }
    }

    /// True if `i` and `j` were recorded with the same clock.
    fn same_clock(&self, i: usize, j: usize) -> bool {
        self.clock_group[i] == self.clock_group[j]
    }

    /// Indices of arrivals with a prediction and absolute timing.
    fn collect_timed(&self, pred: &[Option<f64>], used: &mut Vec<usize>) {
        used.clear();
        used.extend((0..self.len()).filter(|&i| self.abs_timing[i] && pred[i].is_some()));
    }

    /// Observed minus predicted time, the origin time implied by arrival `i`.
    fn implied_origin(&self, i: usize, pred: &[Option<f64>]) -> f64 {
        self.obs[i] - pred[i].unwrap_or(f64::NAN)
    }

    /// Non-negative kernel weight of arrival `i`.
    fn kernel_weight(&self, i: usize) -> f64 {
        self.weights.weights[i].max(0.0)
    }

    /// Origin time and its variance for the arrivals in `used`: the fixed
    /// origin time, or weighted mean observed minus weighted mean predicted.
    fn centered_origin_time(&self, used: &[usize], pred: &[Option<f64>]) -> (f64, f64) {
        if let Some(t) = self.fixed_origin_time {
            return (t, 0.0);
        }
        let w = &self.weights.weights;
        let mut sum_w: f64 = used.iter().map(|&i| w[i]).sum();
        let uniform = !(sum_w > 0.0);
        if uniform {
            sum_w = used.len() as f64;
        }
        let ot = used
            .iter()
            .map(|&i| {
                let wi = if uniform { 1.0 } else { w[i] };
                wi * self.implied_origin(i, pred)
            })
            .sum::<f64>()
            / sum_w;

        let mut total = 0.0;
        for &a in used {
            for &b in used {
                total += self.weights.weight_matrix[(a, b)];
            }
        }
        let var = if total > 0.0 { 1.0 / total } else { f64::INFINITY };
        (ot, var)
    }

    /// `-0.5 N ln(max(var_ml / mean_var, floor))`.
    fn ot_variance_term(&self, n: usize, ml_var: f64, mean_var: f64) -> f64 {
        let ratio = if mean_var > 0.0 { ml_var / mean_var } else { 0.0 };
        -0.5 * n as f64 * ratio.max(self.method.ot_variance_floor).ln()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::arrival::Station;
    use crate::config::MethodConfig;
    use crate::weights::{build_weights, ArrivalErrors};

    /// Arrivals at the four corners of a 10 km square, P and S, with
    /// observations generated from `pred` and origin time `t0`.
    pub fn arrivals(pred: &[f64], t0: f64) -> Vec<Arrival> {
        let corners = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)];
        pred.iter()
            .enumerate()
            .map(|(i, &tt)| {
                let (x, y) = corners[i % 4];
                let phase = if i < 4 { "P" } else { "S" };
                Arrival::new(
                    Station::new(format!("S{}", i % 4), Vec3::new(x, y, 0.0)),
                    phase,
                    t0 + tt,
                    0.1,
                )
            })
            .collect()
    }

    pub fn scorer(arrivals: &[Arrival], method: MethodConfig, corr_len: f64) -> Scorer {
        let errs: Vec<ArrivalErrors> = arrivals
            .iter()
            .map(|a| ArrivalErrors {
                station: &a.station,
                phase: &a.phase,
                pick_error: a.error,
                tt_error: 0.05,
                station_weight: a.station_weight,
            })
            .collect();
        let wd = build_weights(&errs, corr_len).unwrap();
        let refs: Vec<&Arrival> = arrivals.iter().collect();
        Scorer::new(method, &refs, wd, None)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cell_info_for_box() {
        let c = CellInfo::for_box(Vec3::new(2.0, 2.0, 1.0), Some(6.0));
        assert_relative_eq!(c.half_diag_time, 0.25);
        assert_relative_eq!(c.time_var, 0.0625);
        assert_relative_eq!(c.volume, 4.0);
        let c = CellInfo::for_box(Vec3::new(2.0, 2.0, 1.0), None);
        assert_eq!(c.time_var, 0.0);
    }

    #[test]
    fn clock_groups_follow_station_and_instrument() {
        let mut arr = arrivals(&[1.0, 2.0, 3.0, 4.0, 1.5], 0.0);
        arr[4].instrument = Some("HHN".to_string());
        let s = scorer(&arr, MethodConfig::default(), 0.0);
        assert!(s.same_clock(0, 0));
        assert!(!s.same_clock(0, 1));
        // same station S0, different instrument
        assert!(!s.same_clock(0, 4));
    }

    #[test]
    fn every_method_scores_a_consistent_point() {
        let pred = [1.0, 2.0, 2.5, 3.0, 1.7, 3.4, 4.2, 5.1];
        let arr = arrivals(&pred, 10.0);
        let pred: Vec<Option<f64>> = pred.iter().map(|&t| Some(t)).collect();
        for method in [
            LocMethod::GauAnalytic,
            LocMethod::GauTest,
            LocMethod::Edt,
            LocMethod::EdtBox,
            LocMethod::MlOt,
            LocMethod::OtStack,
        ] {
            let s = scorer(&arr, MethodConfig::new(method), 0.0);
            let mut scratch = s.scratch();
            let e = s
                .evaluate(&pred, &CellInfo::POINT, &mut scratch)
                .unwrap_or_else(|| panic!("{:?} returned None", method));
            assert!(e.ln_prob.is_finite(), "{:?}", method);
            assert_eq!(e.num_used, 8, "{:?}", method);
            assert!(
                (e.origin_time - 10.0).abs() < 1e-3,
                "{:?} origin time {}",
                method,
                e.origin_time
            );
        }
    }

    #[test]
    fn nothing_predicted_is_none() {
        let arr = arrivals(&[1.0, 2.0, 3.0, 4.0], 0.0);
        let s = scorer(&arr, MethodConfig::default(), 0.0);
        let mut scratch = s.scratch();
        assert!(s
            .evaluate(&[None, None, None, None], &CellInfo::POINT, &mut scratch)
            .is_none());
    }
}
