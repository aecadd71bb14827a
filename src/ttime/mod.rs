// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Travel-time fields consumed by the location engine.
//!
//! The engine only needs a narrow query contract: a predicted travel time
//! for a phase/station pair at an arbitrary point, with failure expressed as
//! `None`. Two implementations are provided: an analytic homogeneous medium
//! and regular 3D grids of precomputed times.

use serde::{Deserialize, Serialize};

use crate::arrival::{is_s_phase, Station};
use crate::geometry::Vec3;

/// Eikonal fast-sweeping solver for building travel-time grids.
pub mod eikonal;
/// Regular 3D travel-time grids with trilinear interpolation.
pub mod grid;

pub use self::eikonal::SlownessModel;
pub use self::grid::{GridField, TravelTimeGrid};

/// Ray take-off direction at the source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeOffAngle {
    /// Azimuth, degrees clockwise from north.
    pub azimuth: f64,
    /// Dip, degrees from the downward vertical (0 = down, 180 = up).
    pub dip: f64,
}

/// Source of predicted travel times.
pub trait TravelTimeField: Sync {
    /// Travel time (s) of `phase` from `point` to `station`, or `None` if it
    /// cannot be resolved (unknown phase, point outside the field, ...).
    fn travel_time(&self, phase: &str, station: &Station, point: Vec3) -> Option<f64>;

    /// Take-off angle of the ray leaving `point`. Fields that do not carry
    /// ray geometry return `None`.
    fn take_off_angle(&self, _phase: &str, _station: &Station, _point: Vec3) -> Option<TakeOffAngle> {
        None
    }
}

/// Homogeneous medium with straight rays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantVelocity {
    /// P velocity (km/s).
    pub vp: f64,
    /// S velocity (km/s).
    pub vs: f64,
}

impl ConstantVelocity {
    /// Create a homogeneous medium.
    pub fn new(vp: f64, vs: f64) -> Self {
        ConstantVelocity { vp, vs }
    }

    /// Homogeneous medium with `vs = vp / vp_vs`.
    pub fn from_vp_vs(vp: f64, vp_vs: f64) -> Self {
        ConstantVelocity { vp, vs: vp / vp_vs }
    }

    fn velocity(&self, phase: &str) -> f64 {
        if is_s_phase(phase) {
            self.vs
        } else {
            self.vp
        }
    }
}

impl TravelTimeField for ConstantVelocity {
    fn travel_time(&self, phase: &str, station: &Station, point: Vec3) -> Option<f64> {
        let v = self.velocity(phase);
        if !(v > 0.0) {
            return None;
        }
        Some(point.dist(&station.position) / v)
    }

    fn take_off_angle(&self, _phase: &str, station: &Station, point: Vec3) -> Option<TakeOffAngle> {
        let ray = station.position - point;
        let len = ray.norm();
        if len == 0.0 {
            return None;
        }
        Some(TakeOffAngle {
            azimuth: point.azimuth_to(&station.position),
            dip: (ray.z / len).clamp(-1.0, 1.0).acos().to_degrees(),
        })
    }
}

/// Surface model used to skip candidate points in the air.
pub trait Topography: Sync {
    /// True if `point` lies above the free surface.
    fn is_above_surface(&self, point: Vec3) -> bool;
}

/// No topography: every point is below the surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTopography;

impl Topography for NoTopography {
    fn is_above_surface(&self, _point: Vec3) -> bool {
        false
    }
}

/// Flat free surface at depth `surface_z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatSurface {
    /// Depth of the surface (km, z positive down).
    pub surface_z: f64,
}

impl Topography for FlatSurface {
    fn is_above_surface(&self, point: Vec3) -> bool {
        point.z < self.surface_z
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn station() -> Station {
        Station::new("STA", Vec3::new(3.0, 4.0, 0.0))
    }

    #[test]
    fn constant_velocity_times() {
        let field = ConstantVelocity::new(5.0, 2.5);
        let p = Vec3::new(0.0, 0.0, 0.0);
        assert_relative_eq!(field.travel_time("P", &station(), p).unwrap(), 1.0);
        assert_relative_eq!(field.travel_time("S", &station(), p).unwrap(), 2.0);
        assert_relative_eq!(field.travel_time("Pn", &station(), p).unwrap(), 1.0);
    }

    #[test]
    fn take_off_angles_follow_ray() {
        let field = ConstantVelocity::new(6.0, 3.5);
        let sta = Station::new("A", Vec3::new(0.0, 0.0, 0.0));
        let up = field.take_off_angle("P", &sta, Vec3::new(0.0, 0.0, 10.0)).unwrap();
        assert_relative_eq!(up.dip, 180.0, epsilon = 1e-9);

        let sta = Station::new("B", Vec3::new(10.0, 0.0, 5.0));
        let horiz = field.take_off_angle("P", &sta, Vec3::new(0.0, 0.0, 5.0)).unwrap();
        assert_relative_eq!(horiz.dip, 90.0, epsilon = 1e-9);
        assert_relative_eq!(horiz.azimuth, 90.0, epsilon = 1e-9);
    }

    #[test]
    fn topography_models() {
        assert!(!NoTopography.is_above_surface(Vec3::new(0.0, 0.0, -5.0)));
        let flat = FlatSurface { surface_z: 0.0 };
        assert!(flat.is_above_surface(Vec3::new(0.0, 0.0, -0.5)));
        assert!(!flat.is_above_surface(Vec3::new(0.0, 0.0, 0.0)));
    }
}
