// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use tracing::{debug, warn};

use crate::error::{LocateError, Result};
use crate::geometry::Vec3;
use crate::ttime::grid::TravelTimeGrid;

/// A 3D slowness model on a regular grid with uniform spacing.
///
/// Node `[i, j, k]` sits at `origin + spacing * [i, j, k]`; values are stored
/// row-major with `k` fastest.
#[derive(Debug, Clone)]
pub struct SlownessModel {
    origin: Vec3,
    shape: [usize; 3],
    spacing: f64,
    slowness: Box<[f64]>,
}

impl SlownessModel {
    /// Create a slowness model.
    ///
    /// # Errors
    /// Returns an error if the spacing is not positive and finite, any axis
    /// has fewer than 2 nodes, the value count does not match the shape, or
    /// any slowness is not positive and finite.
    pub fn new(origin: Vec3, shape: [usize; 3], spacing: f64, slowness: Vec<f64>) -> Result<Self> {
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(LocateError::InvalidGridSpacing(spacing));
        }
        for (axis, &size) in shape.iter().enumerate() {
            if size < 2 {
                return Err(LocateError::InvalidGridShape { axis, size });
            }
        }
        let num_nodes: usize = shape.iter().product();
        if slowness.len() != num_nodes {
            return Err(LocateError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![slowness.len()],
            });
        }
        if let Some((index, &value)) = slowness
            .iter()
            .enumerate()
            .find(|(_, v)| !v.is_finite() || **v <= 0.0)
        {
            return Err(LocateError::InvalidSlowness { index, value });
        }
        Ok(SlownessModel {
            origin,
            shape,
            spacing,
            slowness: slowness.into_boxed_slice(),
        })
    }

    /// Homogeneous model of the given velocity.
    pub fn uniform(origin: Vec3, shape: [usize; 3], spacing: f64, velocity: f64) -> Result<Self> {
        if !velocity.is_finite() || velocity <= 0.0 {
            return Err(LocateError::InvalidVelocity {
                index: 0,
                value: velocity,
            });
        }
        let num_nodes: usize = shape.iter().product();
        Self::new(origin, shape, spacing, vec![1.0 / velocity; num_nodes])
    }

    /// Model from a velocity field (element-wise `1 / v`).
    pub fn from_velocity(
        origin: Vec3,
        shape: [usize; 3],
        spacing: f64,
        velocity: &[f64],
    ) -> Result<Self> {
        Self::new(origin, shape, spacing, velocity_to_slowness(velocity)?)
    }

    /// Model position of node `[0, 0, 0]`.
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Nodes per axis.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Node spacing.
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    /// Slowness at node `idx`.
    pub fn slowness_at(&self, idx: [usize; 3]) -> f64 {
        self.slowness[self.flat(idx)]
    }

    /// Copy with every slowness multiplied by `factor`, e.g. Vp/Vs to turn
    /// a P model into an S model.
    ///
    /// # Errors
    /// Returns an error if `factor` is not positive and finite.
    pub fn scaled(&self, factor: f64) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(LocateError::Other(format!(
                "slowness scale factor must be positive and finite, got {}",
                factor
            )));
        }
        Ok(SlownessModel {
            slowness: self.slowness.iter().map(|s| s * factor).collect(),
            ..self.clone()
        })
    }

    fn flat(&self, idx: [usize; 3]) -> usize {
        (idx[0] * self.shape[1] + idx[1]) * self.shape[2] + idx[2]
    }

    fn node(&self, idx: [usize; 3]) -> Vec3 {
        self.origin
            + Vec3::new(idx[0] as f64, idx[1] as f64, idx[2] as f64) * self.spacing
    }

    /// Travel times from `source` to every node, by fast sweeping with
    /// default settings.
    pub fn travel_times_from(&self, source: Vec3) -> Result<TravelTimeGrid> {
        SweepSolver::new(self, 1e-9)?.solve(source)
    }
}

/// Convert a velocity field to slowness (element-wise `1 / v`).
pub fn velocity_to_slowness(velocity: &[f64]) -> Result<Vec<f64>> {
    velocity
        .iter()
        .enumerate()
        .map(|(index, &v)| {
            if !v.is_finite() || v <= 0.0 {
                Err(LocateError::InvalidVelocity { index, value: v })
            } else {
                Ok(1.0 / v)
            }
        })
        .collect()
}

/// Sequential fast-sweeping eikonal solver.
///
/// Each pass runs the eight alternating sweep orderings with the Godunov
/// upwind update; passes repeat until no node decreases by more than the
/// tolerance.
pub struct SweepSolver<'a> {
    model: &'a SlownessModel,
    tolerance: f64,
    max_passes: usize,
}

impl<'a> SweepSolver<'a> {
    /// Create a solver over `model`.
    ///
    /// # Errors
    /// Returns an error if the tolerance is not positive and finite.
    pub fn new(model: &'a SlownessModel, tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(LocateError::Other(format!(
                "sweep tolerance must be positive and finite, got {}",
                tolerance
            )));
        }
        Ok(SweepSolver {
            model,
            tolerance,
            max_passes: 50,
        })
    }

    /// Set the maximum number of sweep passes (builder method).
    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes.max(1);
        self
    }

    /// Solve for the first-arrival times from a point source.
    ///
    /// # Errors
    /// Returns an error if the source lies outside the model.
    pub fn solve(&self, source: Vec3) -> Result<TravelTimeGrid> {
        let m = self.model;
        let mut times = vec![f64::INFINITY; m.slowness.len()];
        self.seed(source, &mut times)?;

        let [nx, ny, nz] = m.shape;
        let mut passes = 0;
        loop {
            let mut max_change = 0.0_f64;
            for order in 0..8 {
                let rev = [order & 1 != 0, order & 2 != 0, order & 4 != 0];
                for a in 0..nx {
                    let i = if rev[0] { nx - 1 - a } else { a };
                    for b in 0..ny {
                        let j = if rev[1] { ny - 1 - b } else { b };
                        for c in 0..nz {
                            let k = if rev[2] { nz - 1 - c } else { c };
                            let flat = m.flat([i, j, k]);
                            let candidate = self.update_node(&times, [i, j, k]);
                            if candidate < times[flat] {
                                if times[flat].is_finite() {
                                    max_change = max_change.max(times[flat] - candidate);
                                } else {
                                    max_change = f64::INFINITY;
                                }
                                times[flat] = candidate;
                            }
                        }
                    }
                }
            }
            passes += 1;
            if max_change <= self.tolerance {
                debug!(passes, "fast sweeping converged");
                break;
            }
            if passes >= self.max_passes {
                warn!(
                    passes,
                    max_change, "fast sweeping stopped before convergence"
                );
                break;
            }
        }

        TravelTimeGrid::new(m.origin, m.spacing, m.shape, times)
    }

    /// Exact straight-ray times on the nodes within two cells of the source.
    fn seed(&self, source: Vec3, times: &mut [f64]) -> Result<()> {
        let m = self.model;
        let h = m.spacing;
        let local = source - m.origin;
        for axis in 0..3 {
            let max_coord = (m.shape[axis] - 1) as f64 * h;
            if local[axis] < 0.0 || local[axis] > max_coord {
                return Err(LocateError::InvalidSource {
                    coord: source.to_array(),
                    reason: format!(
                        "coordinate {} on axis {} is outside model [{}, {}]",
                        source[axis],
                        axis,
                        m.origin[axis],
                        m.origin[axis] + max_coord
                    ),
                });
            }
        }

        let radius = 2.0 * h;
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        let mut nearest = [0usize; 3];
        for axis in 0..3 {
            let last = (m.shape[axis] - 1) as f64;
            lo[axis] = ((local[axis] - radius) / h).floor().max(0.0) as usize;
            hi[axis] = ((local[axis] + radius) / h).ceil().min(last) as usize;
            nearest[axis] = ((local[axis] / h).round() as usize).min(m.shape[axis] - 1);
        }
        let f_source = m.slowness_at(nearest);

        for i in lo[0]..=hi[0] {
            for j in lo[1]..=hi[1] {
                for k in lo[2]..=hi[2] {
                    let d = m.node([i, j, k]).dist(&source);
                    if d <= radius {
                        let flat = m.flat([i, j, k]);
                        times[flat] = times[flat].min(f_source * d);
                    }
                }
            }
        }
        Ok(())
    }

    /// Upwind neighbour per axis with the edge-averaged slowness, then the
    /// Godunov update.
    fn update_node(&self, times: &[f64], idx: [usize; 3]) -> f64 {
        let m = self.model;
        let f = m.slowness_at(idx);
        let mut upwind = [(f64::INFINITY, f); 3];
        for (axis, slot) in upwind.iter_mut().enumerate() {
            let mut best = (f64::INFINITY, f);
            if idx[axis] > 0 {
                let mut n = idx;
                n[axis] -= 1;
                best = (times[m.flat(n)], 0.5 * (f + m.slowness_at(n)));
            }
            if idx[axis] + 1 < m.shape[axis] {
                let mut n = idx;
                n[axis] += 1;
                let u = times[m.flat(n)];
                if u < best.0 {
                    best = (u, 0.5 * (f + m.slowness_at(n)));
                }
            }
            *slot = best;
        }
        godunov_update(upwind, m.spacing)
    }
}

/// Godunov upwind update for one node from its per-axis upwind neighbours
/// `(time, edge slowness)`.
///
/// Tries the full 3D update first, then 2D with the two earliest
/// neighbours, then 1D, accepting the first solution that is causal (later
/// than every neighbour it used). The effective slowness of a multi-axis
/// update is the RMS of the edge slownesses involved.
pub fn godunov_update(mut upwind: [(f64, f64); 3], h: f64) -> f64 {
    upwind.sort_by(|a, b| a.0.total_cmp(&b.0));
    let finite = upwind.iter().take_while(|(u, _)| u.is_finite()).count();
    if finite == 0 {
        return f64::INFINITY;
    }

    for used in (2..=finite).rev() {
        let terms = &upwind[..used];
        let n = used as f64;
        let fh_sq = terms.iter().map(|(_, f)| f * f).sum::<f64>() / n * h * h;
        let sum: f64 = terms.iter().map(|(u, _)| u).sum();
        let sum_sq: f64 = terms.iter().map(|(u, _)| u * u).sum();
        // n u^2 - 2 sum u + (sum_sq - n fh^2) = 0
        let disc = sum * sum - n * (sum_sq - fh_sq);
        if disc >= 0.0 {
            let u = (sum + disc.sqrt()) / n;
            if u > terms[used - 1].0 {
                return u;
            }
        }
    }

    let (a, fa) = upwind[0];
    a + fa * h
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn godunov_two_equal_neighbours() {
        // ((u-0)/1)^2 * 2 = 1  =>  u = 1/sqrt(2)
        let u = godunov_update([(0.0, 1.0), (0.0, 1.0), (f64::INFINITY, 1.0)], 1.0);
        assert_relative_eq!(u, std::f64::consts::FRAC_1_SQRT_2, epsilon = 1e-12);
    }

    #[test]
    fn godunov_three_equal_neighbours() {
        let u = godunov_update([(0.0, 1.0), (0.0, 1.0), (0.0, 1.0)], 1.0);
        assert_relative_eq!(u, 1.0 / 3.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn godunov_falls_back_to_1d() {
        let u = godunov_update([(0.0, 1.0), (100.0, 1.0), (f64::INFINITY, 1.0)], 1.0);
        assert_relative_eq!(u, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn godunov_no_neighbours() {
        let inf = f64::INFINITY;
        assert!(godunov_update([(inf, 1.0); 3], 1.0).is_infinite());
    }

    #[test]
    fn invalid_models_rejected() {
        let o = Vec3::default();
        assert!(matches!(
            SlownessModel::new(o, [1, 4, 4], 1.0, vec![1.0; 16]),
            Err(LocateError::InvalidGridShape { axis: 0, size: 1 })
        ));
        assert!(matches!(
            SlownessModel::new(o, [2, 2, 2], 0.0, vec![1.0; 8]),
            Err(LocateError::InvalidGridSpacing(_))
        ));
        assert!(matches!(
            SlownessModel::new(o, [2, 2, 2], 1.0, vec![1.0; 7]),
            Err(LocateError::ShapeMismatch { .. })
        ));
        let mut s = vec![1.0; 8];
        s[5] = -1.0;
        assert!(matches!(
            SlownessModel::new(o, [2, 2, 2], 1.0, s),
            Err(LocateError::InvalidSlowness { index: 5, .. })
        ));
    }

    #[test]
    fn velocity_conversion() {
        let s = velocity_to_slowness(&[1.0, 2.0, 4.0]).unwrap();
        assert_eq!(s, vec![1.0, 0.5, 0.25]);
        assert!(matches!(
            velocity_to_slowness(&[1.0, 0.0]),
            Err(LocateError::InvalidVelocity { index: 1, .. })
        ));
    }

    #[test]
    fn scaled_model_from_velocity() {
        let v = vec![2.0; 27];
        let p = SlownessModel::from_velocity(Vec3::default(), [3, 3, 3], 1.0, &v).unwrap();
        let s = p.scaled(1.5).unwrap();
        assert_eq!(s.slowness_at([1, 2, 0]), 0.75);
        assert_eq!(s.shape(), p.shape());
        assert!(p.scaled(0.0).is_err());
    }

    #[test]
    fn source_outside_model_rejected() {
        let model = SlownessModel::uniform(Vec3::default(), [5, 5, 5], 1.0, 1.0).unwrap();
        let r = model.travel_times_from(Vec3::new(2.0, 2.0, 9.0));
        assert!(matches!(r, Err(LocateError::InvalidSource { .. })));
    }

    #[test]
    fn homogeneous_point_source_close_to_distance() {
        let n = 21;
        let model = SlownessModel::uniform(Vec3::default(), [n, n, n], 0.5, 2.0).unwrap();
        let source = Vec3::new(5.0, 5.0, 5.0);
        let grid = model.travel_times_from(source).unwrap();
        let mut max_rel = 0.0_f64;
        for &p in &[
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(10.0, 5.0, 5.0),
            Vec3::new(5.0, 10.0, 0.0),
            Vec3::new(8.0, 2.0, 9.0),
        ] {
            let exact = p.dist(&source) / 2.0;
            let got = grid.interpolate(p).unwrap();
            max_rel = max_rel.max((got - exact).abs() / exact);
        }
        // first-order scheme on a coarse grid
        assert!(max_rel < 0.15, "max relative error {}", max_rel);
    }
}
