// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Event location: per-run context, search dispatch and finalization.

use std::collections::HashMap;

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arrival::{distinct_stations, Arrival, Station};
use crate::config::{LocMethod, LocateConfig, SearchConfig};
use crate::error::{LocateError, Result};
use crate::geometry::Vec3;
use crate::misfit::{CellInfo, Evaluation, MisfitScratch, Scorer};
use crate::search::{self, Objective, Octree, ScatterSample, SearchOutcome, SearchStats};
use crate::stats::{error_ellipsoid, Ellipsoid};
use crate::ttime::{TakeOffAngle, Topography, TravelTimeField};
use crate::weights::{build_weights, station_distribution_weights, travel_time_error, ArrivalErrors};

/// Outcome of a completed search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LocStatus {
    /// A usable location.
    Located,
    /// The search finished but the solution is not acceptable.
    Rejected {
        /// Why the solution was rejected.
        reason: String,
    },
}

/// Per-arrival quantities at the final location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrivalResult {
    /// Station label.
    pub station: String,
    /// Phase label.
    pub phase: String,
    /// Epicentral distance (km).
    pub distance: f64,
    /// Azimuth from the epicenter to the station, degrees.
    pub azimuth: f64,
    /// Predicted travel time (s), if it could be resolved.
    pub travel_time: Option<f64>,
    /// Predicted arrival time: origin time plus travel time.
    pub predicted_time: Option<f64>,
    /// Observed minus predicted arrival time.
    pub residual: Option<f64>,
    /// Statistical weight; zero for ignored arrivals.
    pub weight: f64,
    /// Take-off angle, when requested and supported by the field.
    pub take_off: Option<TakeOffAngle>,
    /// True if the arrival was excluded from scoring.
    pub ignored: bool,
}

/// Location result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypocenter {
    /// Maximum-likelihood point.
    pub position: Vec3,
    /// Origin time (s).
    pub origin_time: f64,
    /// Origin time variance (s^2).
    pub origin_time_var: f64,
    /// Log probability density at `position`.
    pub ln_prob: f64,
    /// Misfit at `position`.
    pub misfit: f64,
    /// Weighted RMS residual of the used arrivals (s).
    pub rms: f64,
    /// Arrivals that entered the score. Picks without absolute timing count
    /// only under EDT methods, and only when another scored pick shares
    /// their clock.
    pub num_readings: usize,
    /// P readings among them.
    pub num_p: usize,
    /// S readings among them.
    pub num_s: usize,
    /// Distinct stations among them.
    pub num_stations: usize,
    /// Largest azimuthal gap (degrees).
    pub gap: f64,
    /// Largest gap when any single station is removed (degrees).
    pub secondary_gap: f64,
    /// Smallest epicentral distance (km).
    pub min_distance: f64,
    /// Largest epicentral distance (km).
    pub max_distance: f64,
    /// Median epicentral distance (km).
    pub median_distance: f64,
    /// Expectation of the PDF.
    pub expectation: Option<Vec3>,
    /// Covariance of the PDF.
    pub covariance: Option<[[f64; 3]; 3]>,
    /// Confidence ellipsoid from the covariance.
    pub ellipsoid: Option<Ellipsoid>,
    /// Per-arrival results, one per input arrival.
    pub arrivals: Vec<ArrivalResult>,
    /// Search counters.
    pub search: SearchStats,
    /// Located or rejected.
    pub status: LocStatus,
}

/// Everything a location produces.
#[derive(Debug, Clone)]
pub struct Location {
    /// The hypocenter record.
    pub hypocenter: Hypocenter,
    /// PDF samples (Metropolis and octree).
    pub scatter: Vec<ScatterSample>,
    /// Final octree (octree search).
    pub octree: Option<Octree>,
    /// Normalized log-PDF on the search grid (grid search).
    pub pdf_grid: Option<Array3<f64>>,
}

/// Scratch buffers of one search worker.
#[derive(Debug)]
pub struct RunScratch {
    pred: Vec<Option<f64>>,
    misfit: MisfitScratch,
}

/// One event being located: active arrivals, weights and the travel-time
/// sources, shared read-only by the search workers.
pub struct LocationRun<'a, F: TravelTimeField + ?Sized, T: Topography + ?Sized> {
    arrivals: &'a [Arrival],
    active: Vec<usize>,
    field: &'a F,
    topo: &'a T,
    config: &'a LocateConfig,
    scorer: Scorer,
}

impl<'a, F, T> LocationRun<'a, F, T>
where
    F: TravelTimeField + ?Sized,
    T: Topography + ?Sized,
{
    /// Validate the configuration, select the active arrivals and build
    /// their weights.
    ///
    /// # Errors
    /// `InvalidConfig`, `TooFewArrivals` or `SingularWeightMatrix`.
    pub fn new(
        arrivals: &'a [Arrival],
        field: &'a F,
        topo: &'a T,
        config: &'a LocateConfig,
    ) -> Result<Self> {
        config.validate()?;
        for (i, a) in arrivals.iter().enumerate() {
            if let Some(c) = a.companion {
                if c >= arrivals.len() || c == i {
                    return Err(LocateError::InvalidConfig(format!(
                        "arrival {} has invalid companion index {}",
                        i, c
                    )));
                }
            }
        }

        let active: Vec<usize> = (0..arrivals.len()).filter(|&i| !arrivals[i].ignore).collect();
        if active.len() < config.min_num_arrivals {
            return Err(LocateError::TooFewArrivals {
                got: active.len(),
                min: config.min_num_arrivals,
            });
        }
        let num_s = active.iter().filter(|&&i| arrivals[i].is_s_phase()).count();
        if num_s < config.min_num_s_arrivals {
            return Err(LocateError::TooFewArrivals {
                got: num_s,
                min: config.min_num_s_arrivals,
            });
        }

        let station_weights: Vec<f64> = match config.station_weighting {
            Some(sw) => {
                let stations = distinct_stations(arrivals);
                let w = station_distribution_weights(&stations, sw.cutoff_factor);
                let by_label: HashMap<&str, f64> = stations
                    .iter()
                    .zip(w)
                    .map(|(s, w)| (s.label.as_str(), w))
                    .collect();
                active
                    .iter()
                    .map(|&i| {
                        by_label
                            .get(arrivals[i].station.label.as_str())
                            .copied()
                            .unwrap_or(1.0)
                    })
                    .collect()
            }
            None => active.iter().map(|&i| arrivals[i].station_weight).collect(),
        };

        let center = config.grid.center();
        let errors: Vec<ArrivalErrors> = active
            .iter()
            .zip(&station_weights)
            .map(|(&i, &sw)| {
                let a = &arrivals[i];
                let reference = if config.gauss.gauss2.is_some() {
                    predict_travel_time(arrivals, field, config, i, center)
                } else {
                    None
                };
                ArrivalErrors {
                    station: &a.station,
                    phase: &a.phase,
                    pick_error: a.error,
                    tt_error: travel_time_error(&config.gauss, reference),
                    station_weight: sw,
                }
            })
            .collect();
        let weights = build_weights(&errors, config.gauss.corr_len)?;
        let refs: Vec<&Arrival> = active.iter().map(|&i| &arrivals[i]).collect();
        let scorer = Scorer::new(config.method.clone(), &refs, weights, config.fixed_origin_time);

        debug!(
            arrivals = arrivals.len(),
            active = active.len(),
            num_s,
            method = ?config.method.method,
            "location run prepared"
        );
        Ok(LocationRun {
            arrivals,
            active,
            field,
            topo,
            config,
            scorer,
        })
    }

    /// Indices of the arrivals that enter the score.
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    /// The scorer built for this event.
    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Predicted travel time of arrival `i` at `p`, including the companion
    /// reuse and the elevation correction.
    pub fn travel_time(&self, i: usize, p: Vec3) -> Option<f64> {
        predict_travel_time(self.arrivals, self.field, self.config, i, p)
    }

    /// Run the configured search.
    ///
    /// # Errors
    /// Search failures (`NoValidSamples`, `MetropolisRetriesExceeded`,
    /// `LikelihoodBelowFloor`).
    pub fn search(&self) -> Result<SearchOutcome> {
        let grid = &self.config.grid;
        match &self.config.search {
            SearchConfig::Grid(p) => search::grid::run(grid, p, self),
            SearchConfig::Metropolis(p) => search::metropolis::run(grid, p, self, self.config.seed),
            SearchConfig::Octree(p) => {
                let stations: Vec<Station> = distinct_stations(self.arrivals);
                let alone = self.config.method.method == LocMethod::OtStack;
                search::octree::run(grid, p, self, &stations, alone, self.config.seed)
            }
        }
    }

    /// Build the hypocenter record from a search outcome. The best point is
    /// re-scored as a point, so octree cell terms do not enter the reported
    /// likelihood; the search's own score is kept if that fails.
    pub fn finalize(&self, outcome: SearchOutcome) -> Location {
        let p = outcome.best;
        let mut scratch = self.scratch();
        let eval = self
            .evaluate(p, &CellInfo::POINT, &mut scratch)
            .unwrap_or(outcome.best_eval);

        let mut slot = vec![None; self.arrivals.len()];
        for (k, &i) in self.active.iter().enumerate() {
            slot[i] = Some(k);
        }
        let weights = &self.scorer.weights().weights;

        let results: Vec<ArrivalResult> = self
            .arrivals
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let tt = self.travel_time(i, p);
                let predicted = tt.map(|t| eval.origin_time + t);
                let take_off = if self.config.take_off_angles {
                    self.field.take_off_angle(&a.phase, &a.station, p)
                } else {
                    None
                };
                ArrivalResult {
                    station: a.station.label.clone(),
                    phase: a.phase.clone(),
                    distance: p.dist_horizontal(&a.station.position),
                    azimuth: p.azimuth_to(&a.station.position),
                    travel_time: tt,
                    predicted_time: predicted,
                    residual: predicted.map(|t| a.obs_time - t),
                    weight: slot[i].map_or(0.0, |k| weights[k]),
                    take_off,
                    ignored: a.ignore,
                }
            })
            .collect();

        // arrivals that entered the score; under EDT an untimed pick counts
        // when another scored pick shares its clock
        let pairs_untimed = matches!(
            self.config.method.method,
            LocMethod::Edt | LocMethod::EdtBox
        );
        let scored: Vec<usize> = self
            .active
            .iter()
            .copied()
            .filter(|&i| results[i].residual.is_some())
            .collect();
        let used: Vec<usize> = scored
            .iter()
            .copied()
            .filter(|&i| {
                let a = &self.arrivals[i];
                a.abs_timing
                    || (pairs_untimed
                        && scored
                            .iter()
                            .any(|&j| j != i && a.shares_clock_with(&self.arrivals[j])))
            })
            .collect();

        let rms = weighted_rms(
            used.iter()
                .map(|&i| (results[i].weight, results[i].residual.unwrap_or(0.0))),
        );
        let mut azimuths: Vec<f64> = used.iter().map(|&i| results[i].azimuth).collect();
        let (gap, secondary_gap) = azimuth_gaps(&mut azimuths);
        let mut distances: Vec<f64> = used.iter().map(|&i| results[i].distance).collect();
        distances.sort_by(f64::total_cmp);
        let num_s = used.iter().filter(|&&i| self.arrivals[i].is_s_phase()).count();
        let mut labels: Vec<&str> = used
            .iter()
            .map(|&i| self.arrivals[i].station.label.as_str())
            .collect();
        labels.sort_unstable();
        labels.dedup();

        let status = if self.config.grid.is_on_boundary(p, outcome.boundary_tolerance) {
            warn!(x = p.x, y = p.y, z = p.z, "location on search domain boundary");
            LocStatus::Rejected {
                reason: "location on search domain boundary".to_string(),
            }
        } else {
            LocStatus::Located
        };

        let ellipsoid = outcome
            .moments
            .as_ref()
            .and_then(|m| error_ellipsoid(&m.cov, self.config.delta_chi2));

        let hypocenter = Hypocenter {
            position: p,
            origin_time: eval.origin_time,
            origin_time_var: eval.origin_time_var,
            ln_prob: eval.ln_prob,
            misfit: eval.misfit,
            rms,
            num_readings: used.len(),
            num_p: used.len() - num_s,
            num_s,
            num_stations: labels.len(),
            gap,
            secondary_gap,
            min_distance: distances.first().copied().unwrap_or(0.0),
            max_distance: distances.last().copied().unwrap_or(0.0),
            median_distance: median(&distances),
            expectation: outcome.moments.map(|m| m.mean),
            covariance: outcome.moments.map(|m| m.cov),
            ellipsoid,
            arrivals: results,
            search: outcome.stats,
            status,
        };
        Location {
            hypocenter,
            scatter: outcome.samples,
            octree: outcome.octree,
            pdf_grid: outcome.pdf_grid,
        }
    }
}

impl<'a, F, T> Objective for LocationRun<'a, F, T>
where
    F: TravelTimeField + ?Sized,
    T: Topography + ?Sized,
{
    type Scratch = RunScratch;

    fn scratch(&self) -> RunScratch {
        RunScratch {
            pred: vec![None; self.active.len()],
            misfit: self.scorer.scratch(),
        }
    }

    fn evaluate(&self, p: Vec3, cell: &CellInfo, scratch: &mut RunScratch) -> Option<Evaluation> {
        if self.topo.is_above_surface(p) {
            return None;
        }
        for (slot, &i) in scratch.pred.iter_mut().zip(&self.active) {
            *slot = self.travel_time(i, p);
            if slot.is_none() && self.config.require_all_travel_times {
                return None;
            }
        }
        self.scorer.evaluate(&scratch.pred, cell, &mut scratch.misfit)
    }

    fn is_admissible(&self, p: Vec3) -> bool {
        !self.topo.is_above_surface(p)
    }
}

fn predict_travel_time<F: TravelTimeField + ?Sized>(
    arrivals: &[Arrival],
    field: &F,
    config: &LocateConfig,
    i: usize,
    p: Vec3,
) -> Option<f64> {
    let a = &arrivals[i];
    let mut tt = match a.companion {
        Some(c) => {
            let comp = arrivals.get(c)?;
            field.travel_time(&comp.phase, &comp.station, p)? * config.vp_vs
        }
        None => field.travel_time(&a.phase, &a.station, p)?,
    };
    if let Some(ec) = config.elevation_correction {
        let v = if a.is_s_phase() { ec.vs } else { ec.vp };
        tt -= a.station.position.z / v;
    }
    Some(tt)
}

/// `sqrt(sum w r^2 / sum w)`, unweighted when the weights do not sum to a
/// positive value.
fn weighted_rms<I: Iterator<Item = (f64, f64)> + Clone>(pairs: I) -> f64 {
    let sum_w: f64 = pairs.clone().map(|(w, _)| w.max(0.0)).sum();
    let (num, den) = if sum_w > 0.0 {
        (pairs.map(|(w, r)| w.max(0.0) * r * r).sum::<f64>(), sum_w)
    } else {
        let (n, s) = pairs.fold((0usize, 0.0), |(n, s), (_, r)| (n + 1, s + r * r));
        (s, n as f64)
    };
    if den > 0.0 {
        (num / den).sqrt()
    } else {
        0.0
    }
}

/// Primary and secondary azimuthal gaps of a set of azimuths (degrees).
/// Sorts `az` in place; 360 for both with fewer than two azimuths.
pub fn azimuth_gaps(az: &mut [f64]) -> (f64, f64) {
    let n = az.len();
    if n < 2 {
        return (360.0, 360.0);
    }
    az.sort_by(f64::total_cmp);
    let at = |i: usize| az[i % n] + 360.0 * (i / n) as f64;
    let mut gap = 0.0f64;
    let mut secondary = 0.0f64;
    for i in 0..n {
        gap = gap.max(at(i + 1) - az[i]);
        // skipping station i + 1
        secondary = secondary.max(at(i + 2) - az[i]);
    }
    (gap, secondary.min(360.0))
}

fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2],
        _ => 0.5 * (sorted[n / 2 - 1] + sorted[n / 2]),
    }
}

/// Locate one event.
///
/// Builds the per-event run (active arrivals, weights), runs the configured
/// search over `field` and finalizes the best point. A solution on the
/// domain boundary is returned with [`LocStatus::Rejected`].
///
/// # Errors
/// Any [`LocateError`] that aborts the location; see
/// [`LocateError::status_code`].
pub fn locate<F, T>(
    arrivals: &[Arrival],
    field: &F,
    topo: &T,
    config: &LocateConfig,
) -> Result<Location>
where
    F: TravelTimeField + ?Sized,
    T: Topography + ?Sized,
{
    let run = LocationRun::new(arrivals, field, topo, config)?;
    let outcome = run.search()?;
    let location = run.finalize(outcome);
    let h = &location.hypocenter;
    info!(
        x = h.position.x,
        y = h.position.y,
        z = h.position.z,
        origin_time = h.origin_time,
        rms = h.rms,
        readings = h.num_readings,
        status = ?h.status,
        "event located"
    );
    Ok(location)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GridSearchParams, MethodConfig};
    use crate::geometry::SearchGrid;
    use crate::ttime::{ConstantVelocity, FlatSurface, NoTopography};
    use approx::assert_relative_eq;

    fn stations() -> Vec<Station> {
        [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 10.0)]
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| Station::new(format!("ST{}", i), Vec3::new(x, y, 0.0)))
            .collect()
    }

    fn synthetic(field: &ConstantVelocity, source: Vec3, t0: f64) -> Vec<Arrival> {
        let mut out = Vec::new();
        for phase in ["P", "S"] {
            for s in stations() {
                let t = field.travel_time(phase, &s, source).unwrap();
                out.push(Arrival::new(s, phase, t0 + t, 0.1));
            }
        }
        out
    }

    fn config() -> LocateConfig {
        let grid = SearchGrid::new(Vec3::default(), Vec3::splat(1.0), [11, 11, 11]).unwrap();
        LocateConfig::new(grid, SearchConfig::Grid(GridSearchParams::default()))
    }

    #[test]
    fn gaps_of_four_quadrants() {
        let mut az = vec![45.0, 135.0, 225.0, 315.0];
        let (gap, sec) = azimuth_gaps(&mut az);
        assert_relative_eq!(gap, 90.0);
        assert_relative_eq!(sec, 180.0);
        let mut one = vec![10.0];
        assert_eq!(azimuth_gaps(&mut one), (360.0, 360.0));
        let mut wrap = vec![350.0, 10.0];
        let (gap, sec) = azimuth_gaps(&mut wrap);
        assert_relative_eq!(gap, 340.0);
        assert_relative_eq!(sec, 360.0);
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[1.0, 2.0, 7.0]), 2.0);
        assert_eq!(median(&[1.0, 2.0, 4.0, 7.0]), 3.0);
        assert_eq!(median(&[]), 0.0);
    }

    #[test]
    fn rms_weighted_and_fallback() {
        let pairs = vec![(1.0, 0.3), (3.0, 0.1)];
        assert_relative_eq!(weighted_rms(pairs.into_iter()), ((0.09 + 0.03) / 4.0f64).sqrt());
        let zero = vec![(0.0, 0.3), (0.0, 0.4)];
        assert_relative_eq!(weighted_rms(zero.into_iter()), (0.25f64 / 2.0).sqrt());
    }

    #[test]
    fn too_few_arrivals() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let mut arr = synthetic(&field, Vec3::new(5.0, 5.0, 5.0), 0.0);
        arr.truncate(2);
        let cfg = config();
        let r = LocationRun::new(&arr, &field, &NoTopography, &cfg);
        assert!(matches!(r, Err(LocateError::TooFewArrivals { got: 2, min: 3 })));

        let mut arr = synthetic(&field, Vec3::new(5.0, 5.0, 5.0), 0.0);
        for a in arr.iter_mut().skip(4) {
            a.ignore = true;
        }
        let mut cfg = config();
        cfg.min_num_s_arrivals = 1;
        let r = LocationRun::new(&arr, &field, &NoTopography, &cfg);
        assert!(matches!(r, Err(LocateError::TooFewArrivals { got: 0, min: 1 })));
    }

    #[test]
    fn companion_scales_by_vp_vs() {
        let field = ConstantVelocity::new(6.0, 3.0);
        let mut arr = synthetic(&field, Vec3::new(5.0, 5.0, 5.0), 0.0);
        arr[4] = arr[4].clone().with_companion(0);
        let cfg = config();
        let run = LocationRun::new(&arr, &field, &NoTopography, &cfg).unwrap();
        let p = Vec3::new(1.0, 2.0, 3.0);
        let tp = run.travel_time(0, p).unwrap();
        assert_relative_eq!(run.travel_time(4, p).unwrap(), tp * 1.73, epsilon = 1e-12);
    }

    #[test]
    fn elevation_correction_adds_station_height() {
        let field = ConstantVelocity::new(6.0, 3.0);
        let mut arr = synthetic(&field, Vec3::new(5.0, 5.0, 5.0), 0.0);
        arr[0].station.position.z = -1.2;
        let mut cfg = config();
        cfg.elevation_correction = Some(crate::config::ElevationCorrection { vp: 4.0, vs: 2.0 });
        let run = LocationRun::new(&arr, &field, &NoTopography, &cfg).unwrap();
        let p = Vec3::new(5.0, 5.0, 5.0);
        let raw = field.travel_time("P", &arr[0].station, p).unwrap();
        assert_relative_eq!(run.travel_time(0, p).unwrap(), raw + 0.3, epsilon = 1e-12);
    }

    #[test]
    fn invalid_companion_index() {
        let field = ConstantVelocity::new(6.0, 3.0);
        let mut arr = synthetic(&field, Vec3::new(5.0, 5.0, 5.0), 0.0);
        arr[1].companion = Some(99);
        let cfg = config();
        let r = LocationRun::new(&arr, &field, &NoTopography, &cfg);
        assert!(matches!(r, Err(LocateError::InvalidConfig(_))));
    }

    #[test]
    fn grid_location_recovers_node_source() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let source = Vec3::new(4.0, 6.0, 5.0);
        let mut arr = synthetic(&field, source, 12.0);
        arr.push(Arrival::new(stations()[0].clone(), "P", 99.0, 0.1).ignored());
        let loc = locate(&arr, &field, &NoTopography, &config()).unwrap();
        let h = &loc.hypocenter;
        assert_eq!(h.position, source);
        assert_eq!(h.status, LocStatus::Located);
        assert_relative_eq!(h.origin_time, 12.0, epsilon = 1e-9);
        assert!(h.rms < 1e-9);
        assert_eq!(h.num_readings, 8);
        assert_eq!((h.num_p, h.num_s, h.num_stations), (4, 4, 4));
        assert_eq!(h.arrivals.len(), 9);
        let ignored = &h.arrivals[8];
        assert!(ignored.ignored);
        assert_eq!(ignored.weight, 0.0);
        assert!(ignored.residual.unwrap() > 80.0);
        assert!(loc.pdf_grid.is_some());
        assert!(h.ellipsoid.is_some());
    }

    #[test]
    fn untimed_picks_counted_when_edt_pairs_them() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let source = Vec3::new(4.0, 6.0, 5.0);
        let mut arr = synthetic(&field, source, 12.0);
        // ST0 S shares a clock with ST0 P; ST1 S is left alone on its clock
        arr[4] = arr[4].clone().without_abs_timing();
        arr[5] = arr[5].clone().without_abs_timing();
        arr[1] = arr[1].clone().ignored();

        let edt = config().with_method(MethodConfig::new(LocMethod::Edt));
        let h = locate(&arr, &field, &NoTopography, &edt).unwrap().hypocenter;
        assert_eq!(h.num_readings, 6);
        assert_eq!((h.num_p, h.num_s), (3, 3));
        assert_eq!(h.num_stations, 3);
    }

    #[test]
    fn boundary_solution_is_rejected() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let arr = synthetic(&field, Vec3::new(4.0, 6.0, 0.0), 0.0);
        let loc = locate(&arr, &field, &NoTopography, &config()).unwrap();
        assert!(matches!(loc.hypocenter.status, LocStatus::Rejected { .. }));
    }

    #[test]
    fn topography_excludes_points_above_surface() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let arr = synthetic(&field, Vec3::new(4.0, 6.0, 5.0), 0.0);
        let topo = FlatSurface { surface_z: 2.0 };
        let loc = locate(&arr, &field, &topo, &config()).unwrap();
        assert_eq!(loc.hypocenter.search.skipped, 2 * 121);
        assert_eq!(loc.hypocenter.position, Vec3::new(4.0, 6.0, 5.0));
    }

    #[test]
    fn take_off_angles_when_requested() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let arr = synthetic(&field, Vec3::new(4.0, 6.0, 5.0), 0.0);
        let loc = locate(&arr, &field, &NoTopography, &config().with_take_off_angles(true)).unwrap();
        assert!(loc.hypocenter.arrivals.iter().all(|a| a.take_off.is_some()));
        let loc = locate(&arr, &field, &NoTopography, &config()).unwrap();
        assert!(loc.hypocenter.arrivals.iter().all(|a| a.take_off.is_none()));
    }

    #[test]
    fn fixed_origin_time_is_reported() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let arr = synthetic(&field, Vec3::new(4.0, 6.0, 5.0), 12.0);
        let loc = locate(&arr, &field, &NoTopography, &config().with_fixed_origin_time(12.0)).unwrap();
        assert_eq!(loc.hypocenter.position, Vec3::new(4.0, 6.0, 5.0));
        assert_eq!(loc.hypocenter.origin_time, 12.0);
        assert_eq!(loc.hypocenter.origin_time_var, 0.0);
    }

    #[test]
    fn clustered_stations_are_down_weighted() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let source = Vec3::new(4.0, 6.0, 5.0);
        let mut arr = synthetic(&field, source, 0.0);
        let extra = Station::new("ST4", Vec3::new(0.5, 0.0, 0.0));
        let t = field.travel_time("P", &extra, source).unwrap();
        arr.push(Arrival::new(extra, "P", t, 0.1));

        let plain = locate(&arr, &field, &NoTopography, &config()).unwrap();
        let w = &plain.hypocenter.arrivals;
        assert_relative_eq!(w[0].weight, w[3].weight, epsilon = 1e-12);

        let cfg = config().with_station_weighting(1.0);
        let weighted = locate(&arr, &field, &NoTopography, &cfg).unwrap();
        let w = &weighted.hypocenter.arrivals;
        assert!(w[3].weight > w[0].weight);
        assert_eq!(weighted.hypocenter.position, source);
    }

    #[test]
    fn ot_stack_rejected_outside_octree() {
        let field = ConstantVelocity::from_vp_vs(6.0, 1.73);
        let arr = synthetic(&field, Vec3::new(4.0, 6.0, 5.0), 0.0);
        let cfg = config().with_method(MethodConfig::new(LocMethod::OtStack));
        let r = locate(&arr, &field, &NoTopography, &cfg);
        assert!(matches!(r, Err(LocateError::InvalidConfig(_))));
    }
}
