// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Data covariance, weight matrix and station weights for one event.

use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::arrival::Station;
use crate::config::GaussParams;
use crate::error::{LocateError, Result};

/// Reciprocal condition number below which the covariance is treated as
/// singular.
pub const MIN_RECIPROCAL_CONDITION: f64 = 1e-12;

/// Error description of one active arrival, as seen by the builder.
#[derive(Debug, Clone, Copy)]
pub struct ArrivalErrors<'a> {
    /// Recording station.
    pub station: &'a Station,
    /// Phase label; only identical labels are correlated.
    pub phase: &'a str,
    /// Pick error, one standard deviation (s).
    pub pick_error: f64,
    /// Travel-time error, one standard deviation (s).
    pub tt_error: f64,
    /// Station distribution weight.
    pub station_weight: f64,
}

/// Products of the weight builder, indexed by active arrival.
#[derive(Debug, Clone)]
pub struct WeightData {
    /// Inverse data covariance with station weights applied (`W_ij s_i s_j`).
    pub weight_matrix: DMatrix<f64>,
    /// Total variance on the diagonal, correlation coefficient off it.
    pub edt_matrix: DMatrix<f64>,
    /// Row sums of the weight matrix, normalized to mean 1.
    pub weights: Vec<f64>,
    /// Travel-time errors.
    pub tt_errors: Vec<f64>,
    /// Pick errors.
    pub pick_errors: Vec<f64>,
    /// Total standard deviation `sqrt(pick^2 + tt^2)`.
    pub sigmas: Vec<f64>,
    /// Station distribution weights.
    pub station_weights: Vec<f64>,
    /// Sum of all weight-matrix entries.
    pub total: f64,
}

impl WeightData {
    /// Number of arrivals covered.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// True if no arrival is covered.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

/// Spatial correlation of model errors between two stations.
fn correlation(a: &Station, b: &Station, corr_len: f64) -> f64 {
    if corr_len <= 0.0 {
        return 0.0;
    }
    let d = a.position.dist(&b.position);
    (-0.5 * (d * d) / (corr_len * corr_len)).exp()
}

/// Build the weight and EDT matrices for the active arrivals.
///
/// # Errors
/// `SingularWeightMatrix` if the covariance has a non-finite entry, is
/// numerically singular, or its inverse is not finite.
pub fn build_weights(arrivals: &[ArrivalErrors<'_>], corr_len: f64) -> Result<WeightData> {
    let n = arrivals.len();
    if n == 0 {
        return Err(LocateError::SingularWeightMatrix {
            reason: "no active arrivals".to_string(),
        });
    }
    let mut cov = DMatrix::<f64>::zeros(n, n);
    let mut edt = DMatrix::<f64>::zeros(n, n);

    for (i, a) in arrivals.iter().enumerate() {
        let var = a.tt_error * a.tt_error + a.pick_error * a.pick_error;
        cov[(i, i)] = var;
        edt[(i, i)] = var;
        for (j, b) in arrivals.iter().enumerate().skip(i + 1) {
            if a.phase != b.phase {
                continue;
            }
            let rho = correlation(a.station, b.station, corr_len);
            cov[(i, j)] = a.tt_error * b.tt_error * rho;
            cov[(j, i)] = cov[(i, j)];
            edt[(i, j)] = rho;
            edt[(j, i)] = rho;
        }
    }

    if let Some(v) = cov.iter().find(|v| !v.is_finite()) {
        return Err(LocateError::SingularWeightMatrix {
            reason: format!("covariance contains non-finite value {}", v),
        });
    }

    let svd = cov.clone().svd(false, false);
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    let rcond = if s_max > 0.0 { s_min / s_max } else { 0.0 };
    if !(rcond >= MIN_RECIPROCAL_CONDITION) {
        return Err(LocateError::SingularWeightMatrix {
            reason: format!(
                "reciprocal condition number {:e} below {:e}",
                rcond, MIN_RECIPROCAL_CONDITION
            ),
        });
    }

    let mut wmat = cov
        .try_inverse()
        .ok_or_else(|| LocateError::SingularWeightMatrix {
            reason: "covariance inversion failed".to_string(),
        })?;
    if wmat.iter().any(|v| !v.is_finite()) {
        return Err(LocateError::SingularWeightMatrix {
            reason: "inverse covariance is not finite".to_string(),
        });
    }

    for i in 0..n {
        for j in 0..n {
            wmat[(i, j)] *= arrivals[i].station_weight * arrivals[j].station_weight;
        }
    }

    let mut weights: Vec<f64> = (0..n).map(|i| wmat.row(i).sum()).collect();
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        let scale = n as f64 / sum;
        weights.iter_mut().for_each(|w| *w *= scale);
    } else {
        warn!(sum, "weight sum not positive, weights left unnormalized");
    }
    for (i, &w) in weights.iter().enumerate() {
        if w < 0.0 {
            warn!(
                arrival = i,
                station = %arrivals[i].station.label,
                phase = arrivals[i].phase,
                weight = w,
                "negative arrival weight, model error may be large relative to pick error"
            );
        }
    }

    let total = wmat.sum();
    debug!(arrivals = n, rcond, total, "weight matrix built");

    Ok(WeightData {
        weight_matrix: wmat,
        edt_matrix: edt,
        weights,
        tt_errors: arrivals.iter().map(|a| a.tt_error).collect(),
        pick_errors: arrivals.iter().map(|a| a.pick_error).collect(),
        sigmas: arrivals
            .iter()
            .map(|a| (a.tt_error * a.tt_error + a.pick_error * a.pick_error).sqrt())
            .collect(),
        station_weights: arrivals.iter().map(|a| a.station_weight).collect(),
        total,
    })
}

/// Travel-time error for one arrival: `sigma_t`, or the clamped fraction of
/// the reference travel time when the proportional model is active and the
/// reference time is known.
pub fn travel_time_error(gauss: &GaussParams, reference_time: Option<f64>) -> f64 {
    match (gauss.gauss2, reference_time) {
        (Some(g2), Some(tt)) => (g2.fraction * tt).clamp(g2.min, g2.max),
        _ => gauss.sigma_t,
    }
}

/// Mean distance over all distinct station pairs, `None` with fewer than
/// two stations.
pub fn mean_inter_station_distance(stations: &[Station]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (i, a) in stations.iter().enumerate() {
        for b in &stations[i + 1..] {
            sum += a.position.dist(&b.position);
            count += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Station distribution weights `1 / sum_j exp(-(d_ij / (f D))^2)`,
/// normalized to mean 1, one per station in input order.
///
/// Densely clustered stations share their weight; isolated ones keep more.
pub fn station_distribution_weights(stations: &[Station], cutoff_factor: f64) -> Vec<f64> {
    let mean_dist = match mean_inter_station_distance(stations) {
        Some(d) if d > 0.0 => d,
        _ => {
            warn!(
                stations = stations.len(),
                "too few distinct stations for distribution weighting, using unit weights"
            );
            return vec![1.0; stations.len()];
        }
    };
    let cutoff = cutoff_factor * mean_dist;
    let mut weights: Vec<f64> = stations
        .iter()
        .map(|a| {
            let density: f64 = stations
                .iter()
                .map(|b| {
                    let r = a.position.dist(&b.position) / cutoff;
                    (-r * r).exp()
                })
                .sum();
            1.0 / density
        })
        .collect();
    let mean = weights.iter().sum::<f64>() / weights.len() as f64;
    weights.iter_mut().for_each(|w| *w /= mean);
    debug!(mean_dist, cutoff, "station distribution weights computed");
    weights
}
