// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Location configuration.
//!
//! Every struct here deserializes from JSON with sensible defaults for the
//! fields that are left out, and offers `with_*` builder methods for use
//! from code.

use serde::{Deserialize, Serialize};

use crate::error::{LocateError, Result};
use crate::geometry::{SearchGrid, Vec3};

/// Likelihood / misfit formulation used to score candidate points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocMethod {
    /// Weighted least squares with an analytic origin time.
    GauAnalytic,
    /// Least squares residuals with a line search over the origin-time shift.
    GauTest,
    /// Equal differential time, Gaussian pair kernel.
    Edt,
    /// Equal differential time, box pair kernel.
    EdtBox,
    /// Per-arrival kernel sum at the maximum-likelihood origin time.
    MlOt,
    /// Origin-time stacking over per-arrival time ranges. Octree only.
    OtStack,
}

/// Origin-time weighting applied on top of the EDT formulations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtWeighting {
    /// No origin-time term.
    #[default]
    Off,
    /// Penalize scatter of the per-arrival origin times.
    Variance,
    /// As `Variance`, and report the maximum-likelihood origin time.
    MaximumLikelihood,
}

/// Scoring method and its tuning constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodConfig {
    /// Scoring formulation.
    pub method: LocMethod,
    /// Origin-time weighting for EDT and EDT_BOX.
    pub ot_weighting: OtWeighting,
    /// Lower bound on the ML origin-time variance ratio used in the
    /// log-probability penalty term.
    pub ot_variance_floor: f64,
    /// Half-width multiplier of the per-arrival origin-time ranges in OT_STACK.
    pub ot_stack_sigma_factor: f64,
}

impl Default for MethodConfig {
    fn default() -> Self {
        MethodConfig {
            method: LocMethod::GauAnalytic,
            ot_weighting: OtWeighting::Off,
            ot_variance_floor: 0.01,
            ot_stack_sigma_factor: 2.0,
        }
    }
}

impl MethodConfig {
    /// Create a configuration for `method` with default constants.
    pub fn new(method: LocMethod) -> Self {
        MethodConfig {
            method,
            ..Default::default()
        }
    }

    /// Set the origin-time weighting mode (builder method).
    pub fn with_ot_weighting(mut self, weighting: OtWeighting) -> Self {
        self.ot_weighting = weighting;
        self
    }
}

/// Travel-time error proportional to the travel time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gauss2Params {
    /// Fraction of the travel time.
    pub fraction: f64,
    /// Lower clamp (s).
    pub min: f64,
    /// Upper clamp (s).
    pub max: f64,
}

/// Gaussian model-error parameters for the data covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaussParams {
    /// Nominal travel-time (model) error, one standard deviation (s).
    pub sigma_t: f64,
    /// Spatial correlation length (km). No correlation when `<= 0`.
    pub corr_len: f64,
    /// Optional travel-time-proportional error replacing `sigma_t`.
    pub gauss2: Option<Gauss2Params>,
}

impl Default for GaussParams {
    fn default() -> Self {
        GaussParams {
            sigma_t: 0.05,
            corr_len: 0.0,
            gauss2: None,
        }
    }
}

/// Station distribution weighting derived from station geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationWeighting {
    /// Cutoff distance as a multiple of the mean inter-station distance.
    pub cutoff_factor: f64,
}

/// Additive station elevation correction `-z / v`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationCorrection {
    /// Near-surface P velocity (km/s).
    pub vp: f64,
    /// Near-surface S velocity (km/s).
    pub vs: f64,
}

/// Grid search parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchParams {
    /// Worker thread count for the sweep. `None` uses the rayon default.
    pub threads: Option<usize>,
}

/// Metropolis sampler parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetropolisParams {
    /// Total number of accepted samples.
    pub num_samples: usize,
    /// Length of the learning phase (accepted samples).
    pub learn: usize,
    /// Length of the equilibration phase (accepted samples).
    pub equil: usize,
    /// Accepted-sample count after which samples are saved.
    pub start_save: usize,
    /// Save every `skip`-th accepted sample.
    pub skip: usize,
    /// Initial step length (km). Negative selects mean grid side / 4.
    pub step_init: f64,
    /// Minimum step length during equilibration (km).
    pub step_min: f64,
    /// Step multiplier applied to the sample standard deviation.
    pub step_fact: f64,
    /// Minimum acceptable likelihood after learning (linear scale).
    pub prob_min: f64,
    /// Annealing temperature at the start of learning.
    pub initial_temperature: f64,
    /// Consecutive rejections tolerated before the retry policy kicks in.
    pub max_retries: usize,
    /// Forced acceptances allowed after learning.
    pub max_forced_accepts: usize,
}

impl Default for MetropolisParams {
    fn default() -> Self {
        MetropolisParams {
            num_samples: 10_000,
            learn: 1_000,
            equil: 4_000,
            start_save: 5_000,
            skip: 5,
            step_init: -1.0,
            step_min: 0.01,
            step_fact: 8.0,
            prob_min: 1.0e-10,
            initial_temperature: 1.0,
            max_retries: 1_000,
            max_forced_accepts: 5,
        }
    }
}

impl MetropolisParams {
    /// Set the phase lengths (builder method).
    pub fn with_phases(mut self, learn: usize, equil: usize, start_save: usize, skip: usize) -> Self {
        self.learn = learn;
        self.equil = equil;
        self.start_save = start_save;
        self.skip = skip;
        self
    }

    /// Set the total number of accepted samples (builder method).
    pub fn with_num_samples(mut self, num_samples: usize) -> Self {
        self.num_samples = num_samples;
        self
    }

    /// Set the step controls (builder method).
    pub fn with_steps(mut self, step_init: f64, step_min: f64, step_fact: f64) -> Self {
        self.step_init = step_init;
        self.step_min = step_min;
        self.step_fact = step_fact;
        self
    }
}

/// Station-density weighting of octree node priorities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationDensityParams {
    /// Deepest level at which the weight is computed; deeper nodes inherit.
    pub max_level: usize,
    /// Magnitude bound of the negative weight far from stations.
    pub max_weight: f64,
    /// Weight given to nodes that contain, or nearly contain, a station.
    pub force_weight: f64,
}

impl Default for StationDensityParams {
    fn default() -> Self {
        StationDensityParams {
            max_level: 4,
            max_weight: 3.0,
            force_weight: 3.0,
        }
    }
}

/// Octree search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OctreeParams {
    /// Number of root cells along each axis.
    pub init_num_cells: [usize; 3],
    /// Node size floor (km).
    pub min_node_size: f64,
    /// Budget of evaluated nodes, roots included.
    pub max_num_nodes: usize,
    /// Number of scatter samples drawn from the final tree.
    pub num_scatter: usize,
    /// Stop when the best node is below the size floor; otherwise skip
    /// such nodes and keep going.
    pub stop_on_min_node_size: bool,
    /// Characteristic velocity converting cell size to time uncertainty.
    pub mean_cell_velocity: Option<f64>,
    /// Station-density priority weighting.
    pub station_density: Option<StationDensityParams>,
}

impl Default for OctreeParams {
    fn default() -> Self {
        OctreeParams {
            init_num_cells: [10, 10, 5],
            min_node_size: 0.01,
            max_num_nodes: 20_000,
            num_scatter: 5_000,
            stop_on_min_node_size: true,
            mean_cell_velocity: None,
            station_density: None,
        }
    }
}

impl OctreeParams {
    /// Set the root tiling (builder method).
    pub fn with_init_num_cells(mut self, cells: [usize; 3]) -> Self {
        self.init_num_cells = cells;
        self
    }

    /// Side lengths of the root cells tiling `grid`'s box.
    pub fn root_size(&self, grid: &SearchGrid) -> Vec3 {
        let extent = grid.extent();
        let n = self.init_num_cells;
        Vec3::new(
            extent.x / n[0] as f64,
            extent.y / n[1] as f64,
            extent.z / n[2] as f64,
        )
    }

    /// Set the node budget and size floor (builder method).
    pub fn with_limits(mut self, max_num_nodes: usize, min_node_size: f64) -> Self {
        self.max_num_nodes = max_num_nodes;
        self.min_node_size = min_node_size;
        self
    }
}

/// Search strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchConfig {
    /// Exhaustive sweep of the search grid.
    Grid(GridSearchParams),
    /// Metropolis random walk inside the search grid box.
    Metropolis(MetropolisParams),
    /// Adaptive octree over the search grid box.
    Octree(OctreeParams),
}

/// Everything needed to locate one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocateConfig {
    /// Search grid; its box is the search domain for all strategies.
    pub grid: SearchGrid,
    /// Search strategy.
    pub search: SearchConfig,
    /// Scoring method.
    #[serde(default)]
    pub method: MethodConfig,
    /// Gaussian error model.
    #[serde(default)]
    pub gauss: GaussParams,
    /// Derive station weights from station geometry.
    #[serde(default)]
    pub station_weighting: Option<StationWeighting>,
    /// Station elevation correction.
    #[serde(default)]
    pub elevation_correction: Option<ElevationCorrection>,
    /// Minimum number of usable arrivals.
    #[serde(default = "default_min_num_arrivals")]
    pub min_num_arrivals: usize,
    /// Minimum number of usable S arrivals.
    #[serde(default)]
    pub min_num_s_arrivals: usize,
    /// Vp/Vs ratio for companion arrivals.
    #[serde(default = "default_vp_vs")]
    pub vp_vs: f64,
    /// Fix the origin time instead of estimating it.
    #[serde(default)]
    pub fixed_origin_time: Option<f64>,
    /// Reject a sample when any usable arrival has no travel time. When
    /// false, such arrivals are skipped for that sample.
    #[serde(default = "default_true")]
    pub require_all_travel_times: bool,
    /// Compute take-off angles in the finalizer.
    #[serde(default)]
    pub take_off_angles: bool,
    /// Chi-square increment of the confidence ellipsoid (3 DOF).
    #[serde(default = "default_delta_chi2")]
    pub delta_chi2: f64,
    /// Seed for the random number generator.
    #[serde(default)]
    pub seed: u64,
}

fn default_min_num_arrivals() -> usize {
    3
}

fn default_vp_vs() -> f64 {
    1.73
}

fn default_true() -> bool {
    true
}

fn default_delta_chi2() -> f64 {
    3.53
}

impl LocateConfig {
    /// Create a configuration with default scoring for `grid` and `search`.
    pub fn new(grid: SearchGrid, search: SearchConfig) -> Self {
        LocateConfig {
            grid,
            search,
            method: MethodConfig::default(),
            gauss: GaussParams::default(),
            station_weighting: None,
            elevation_correction: None,
            min_num_arrivals: default_min_num_arrivals(),
            min_num_s_arrivals: 0,
            vp_vs: default_vp_vs(),
            fixed_origin_time: None,
            require_all_travel_times: true,
            take_off_angles: false,
            delta_chi2: default_delta_chi2(),
            seed: 0,
        }
    }

    /// Set the scoring method (builder method).
    pub fn with_method(mut self, method: MethodConfig) -> Self {
        self.method = method;
        self
    }

    /// Set the Gaussian error model (builder method).
    pub fn with_gauss(mut self, sigma_t: f64, corr_len: f64) -> Self {
        self.gauss.sigma_t = sigma_t;
        self.gauss.corr_len = corr_len;
        self
    }

    /// Set the random seed (builder method).
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fix the origin time (builder method).
    pub fn with_fixed_origin_time(mut self, origin_time: f64) -> Self {
        self.fixed_origin_time = Some(origin_time);
        self
    }

    /// Enable geometry-derived station weights (builder method).
    pub fn with_station_weighting(mut self, cutoff_factor: f64) -> Self {
        self.station_weighting = Some(StationWeighting { cutoff_factor });
        self
    }

    /// Enable take-off angle computation (builder method).
    pub fn with_take_off_angles(mut self, enabled: bool) -> Self {
        self.take_off_angles = enabled;
        self
    }

    /// Check the configuration for out-of-range values and unsupported
    /// combinations.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        let g = &self.gauss;
        if !(g.sigma_t.is_finite() && g.sigma_t >= 0.0) {
            return Err(invalid(format!("sigma_t must be >= 0, got {}", g.sigma_t)));
        }
        if !g.corr_len.is_finite() {
            return Err(invalid("corr_len must be finite"));
        }
        if let Some(g2) = g.gauss2 {
            if !(g2.fraction > 0.0 && g2.min >= 0.0 && g2.max >= g2.min) {
                return Err(invalid(format!("invalid gauss2 parameters {:?}", g2)));
            }
        }
        if !(self.vp_vs.is_finite() && self.vp_vs > 0.0) {
            return Err(invalid(format!("vp_vs must be positive, got {}", self.vp_vs)));
        }
        if !(self.delta_chi2 > 0.0) {
            return Err(invalid("delta_chi2 must be positive"));
        }
        if let Some(sw) = self.station_weighting {
            if !(sw.cutoff_factor > 0.0) {
                return Err(invalid("station weighting cutoff factor must be positive"));
            }
        }
        if let Some(ec) = self.elevation_correction {
            if !(ec.vp > 0.0 && ec.vs > 0.0) {
                return Err(invalid("elevation correction velocities must be positive"));
            }
        }
        if !(self.method.ot_variance_floor > 0.0) {
            return Err(invalid("ot_variance_floor must be positive"));
        }
        if !(self.method.ot_stack_sigma_factor > 0.0) {
            return Err(invalid("ot_stack_sigma_factor must be positive"));
        }

        match &self.search {
            SearchConfig::Grid(p) => {
                if p.threads == Some(0) {
                    return Err(invalid("grid search thread count must be >= 1"));
                }
            }
            SearchConfig::Metropolis(p) => {
                if p.skip == 0 {
                    return Err(invalid("metropolis skip must be >= 1"));
                }
                if p.num_samples == 0 || p.max_retries == 0 {
                    return Err(invalid("metropolis sample and retry counts must be >= 1"));
                }
                if !(p.step_min > 0.0 && p.step_fact > 0.0) {
                    return Err(invalid("metropolis step_min and step_fact must be positive"));
                }
                if !(p.prob_min > 0.0) {
                    return Err(invalid("metropolis prob_min must be positive"));
                }
                if !(p.initial_temperature >= 1.0) {
                    return Err(invalid("metropolis initial_temperature must be >= 1"));
                }
            }
            SearchConfig::Octree(p) => {
                if p.init_num_cells.iter().any(|&n| n == 0) {
                    return Err(invalid("octree init_num_cells must be >= 1 on every axis"));
                }
                let num_roots: usize = p.init_num_cells.iter().product();
                if p.max_num_nodes < num_roots {
                    return Err(invalid(format!(
                        "octree max_num_nodes {} is below the root count {}",
                        p.max_num_nodes, num_roots
                    )));
                }
                if !(p.min_node_size > 0.0) {
                    return Err(invalid("octree min_node_size must be positive"));
                }
                if let Some(v) = p.mean_cell_velocity {
                    if !(v > 0.0) {
                        return Err(invalid("octree mean_cell_velocity must be positive"));
                    }
                }
            }
        }

        if self.method.method == LocMethod::OtStack
            && !matches!(self.search, SearchConfig::Octree(_))
        {
            return Err(invalid("OT_STACK requires the octree search"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> LocateError {
    LocateError::InvalidConfig(msg.into())
}
