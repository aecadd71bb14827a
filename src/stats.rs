// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Sample statistics of the location PDF.

use nalgebra::{Matrix3, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// Weighted mean and covariance of a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Moments {
    /// Expectation.
    pub mean: Vec3,
    /// Covariance (km^2).
    pub cov: [[f64; 3]; 3],
}

/// Accumulates weighted first and second moments about a reference point.
#[derive(Debug, Clone)]
pub struct MomentAccumulator {
    reference: Vec3,
    sum_w: f64,
    sum: [f64; 3],
    sum_sq: [[f64; 3]; 3],
}

impl MomentAccumulator {
    /// Start accumulating. `reference` should be near the points; it is
    /// subtracted before squaring.
    pub fn new(reference: Vec3) -> Self {
        MomentAccumulator {
            reference,
            sum_w: 0.0,
            sum: [0.0; 3],
            sum_sq: [[0.0; 3]; 3],
        }
    }

    /// Add point `p` with weight `w`. Non-positive or non-finite weights are
    /// ignored.
    pub fn add(&mut self, p: Vec3, w: f64) {
        if !(w > 0.0) || !w.is_finite() {
            return;
        }
        let d = (p - self.reference).to_array();
        self.sum_w += w;
        for i in 0..3 {
            self.sum[i] += w * d[i];
            for j in 0..3 {
                self.sum_sq[i][j] += w * d[i] * d[j];
            }
        }
    }

    /// Total weight added.
    pub fn total_weight(&self) -> f64 {
        self.sum_w
    }

    /// Mean and covariance, or `None` if nothing was added.
    pub fn finish(&self) -> Option<Moments> {
        if !(self.sum_w > 0.0) {
            return None;
        }
        let m = [
            self.sum[0] / self.sum_w,
            self.sum[1] / self.sum_w,
            self.sum[2] / self.sum_w,
        ];
        let mut cov = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                cov[i][j] = self.sum_sq[i][j] / self.sum_w - m[i] * m[j];
            }
        }
        Some(Moments {
            mean: self.reference + Vec3::from(m),
            cov,
        })
    }
}

/// Weighted moments of `(point, weight)` pairs.
pub fn weighted_moments<I>(points: I) -> Option<Moments>
where
    I: IntoIterator<Item = (Vec3, f64)>,
{
    let mut iter = points.into_iter().peekable();
    let reference = iter.peek().map(|(p, _)| *p)?;
    let mut acc = MomentAccumulator::new(reference);
    for (p, w) in iter {
        acc.add(p, w);
    }
    acc.finish()
}

/// Welford running mean and variance per axis.
#[derive(Debug, Clone, Default)]
pub struct RunningVariance {
    count: usize,
    mean: Vec3,
    m2: Vec3,
}

impl RunningVariance {
    /// Add one point.
    pub fn push(&mut self, p: Vec3) {
        self.count += 1;
        let delta = p - self.mean;
        self.mean = self.mean + delta * (1.0 / self.count as f64);
        let delta2 = p - self.mean;
        for axis in 0..3 {
            self.m2[axis] += delta[axis] * delta2[axis];
        }
    }

    /// Number of points.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Running mean.
    pub fn mean(&self) -> Vec3 {
        self.mean
    }

    /// Unbiased variance per axis; `None` with fewer than two points.
    pub fn variance(&self) -> Option<Vec3> {
        if self.count < 2 {
            return None;
        }
        Some(self.m2 * (1.0 / (self.count - 1) as f64))
    }
}

/// One principal axis of the confidence ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipsoidAxis {
    /// Semi-axis length (km).
    pub length: f64,
    /// Azimuth of the axis, degrees clockwise from +y (north).
    pub azimuth: f64,
    /// Dip below horizontal, degrees, in `[0, 90]`.
    pub dip: f64,
}

/// Confidence ellipsoid from a covariance matrix, axes sorted by length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ellipsoid {
    /// Principal axes, shortest first.
    pub axes: [EllipsoidAxis; 3],
}

/// Confidence ellipsoid with semi-axes `sqrt(delta_chi2 * eigenvalue)`.
///
/// Returns `None` for a non-finite covariance.
pub fn error_ellipsoid(cov: &[[f64; 3]; 3], delta_chi2: f64) -> Option<Ellipsoid> {
    if cov.iter().flatten().any(|v| !v.is_finite()) {
        return None;
    }
    let m = Matrix3::from_fn(|i, j| 0.5 * (cov[i][j] + cov[j][i]));
    let eig = SymmetricEigen::new(m);

    let mut axes: Vec<EllipsoidAxis> = (0..3)
        .map(|k| {
            let v = eig.eigenvectors.column(k);
            let (mut vx, mut vy, mut vz) = (v[0], v[1], v[2]);
            if vz < 0.0 {
                vx = -vx;
                vy = -vy;
                vz = -vz;
            }
            let azimuth = vx.atan2(vy).to_degrees().rem_euclid(360.0);
            EllipsoidAxis {
                length: (delta_chi2 * eig.eigenvalues[k].max(0.0)).sqrt(),
                azimuth,
                dip: vz.clamp(-1.0, 1.0).asin().to_degrees(),
            }
        })
        .collect();
    axes.sort_by(|a, b| a.length.total_cmp(&b.length));
    Some(Ellipsoid {
        axes: [axes[0], axes[1], axes[2]],
    })
}
