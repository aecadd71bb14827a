// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use crate::arrival::{is_s_phase, Station};
use crate::error::{LocateError, Result};
use crate::geometry::Vec3;
use crate::ttime::TravelTimeField;

/// Travel times from one station on a regular 3D grid with uniform spacing.
#[derive(Debug, Clone, PartialEq)]
pub struct TravelTimeGrid {
    origin: Vec3,
    spacing: f64,
    shape: [usize; 3],
    times: Vec<f64>,
}

impl TravelTimeGrid {
    /// Wrap precomputed times (row-major, last axis fastest).
    ///
    /// # Errors
    /// Returns an error on a bad spacing or shape, or if the number of
    /// values does not match the shape.
    pub fn new(origin: Vec3, spacing: f64, shape: [usize; 3], times: Vec<f64>) -> Result<Self> {
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(LocateError::InvalidGridSpacing(spacing));
        }
        for (axis, &size) in shape.iter().enumerate() {
            if size < 2 {
                return Err(LocateError::InvalidGridShape { axis, size });
            }
        }
        if times.len() != shape.iter().product::<usize>() {
            return Err(LocateError::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![times.len()],
            });
        }
        Ok(TravelTimeGrid {
            origin,
            spacing,
            shape,
            times,
        })
    }

    /// Grid shape.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// Raw values, row-major.
    pub fn values(&self) -> &[f64] {
        &self.times
    }

    /// Value at node `idx`.
    pub fn get(&self, idx: [usize; 3]) -> f64 {
        self.times[(idx[0] * self.shape[1] + idx[1]) * self.shape[2] + idx[2]]
    }

    /// Trilinear interpolation at `p`. `None` outside the grid or when any
    /// of the surrounding nodes is not finite.
    pub fn interpolate(&self, p: Vec3) -> Option<f64> {
        let mut base = [0usize; 3];
        let mut frac = [0.0f64; 3];
        for axis in 0..3 {
            let t = (p[axis] - self.origin[axis]) / self.spacing;
            let last = (self.shape[axis] - 1) as f64;
            if !(t >= 0.0 && t <= last) {
                return None;
            }
            // keep the upper corner inside the grid on the far face
            let i = (t.floor() as usize).min(self.shape[axis] - 2);
            base[axis] = i;
            frac[axis] = t - i as f64;
        }

        let mut value = 0.0;
        for corner in 0..8 {
            let mut idx = base;
            let mut w = 1.0;
            for axis in 0..3 {
                if corner & (1 << axis) != 0 {
                    idx[axis] += 1;
                    w *= frac[axis];
                } else {
                    w *= 1.0 - frac[axis];
                }
            }
            if w == 0.0 {
                continue;
            }
            let v = self.get(idx);
            if !v.is_finite() {
                return None;
            }
            value += w * v;
        }
        Some(value)
    }
}

/// Travel-time grids keyed by station label and phase.
///
/// Lookup tries the exact phase label first and then the phase family
/// (`P` or `S`), so a `Pg` pick can use a `P` grid.
#[derive(Debug, Clone, Default)]
pub struct GridField {
    grids: HashMap<(String, String), TravelTimeGrid>,
}

impl GridField {
    /// Create an empty field.
    pub fn new() -> Self {
        GridField::default()
    }

    /// Register the grid for `station` and `phase`.
    pub fn insert(&mut self, station: &str, phase: &str, grid: TravelTimeGrid) {
        self.grids
            .insert((station.to_string(), phase.to_string()), grid);
    }

    /// Add a grid (builder method).
    pub fn with_grid(mut self, station: &str, phase: &str, grid: TravelTimeGrid) -> Self {
        self.insert(station, phase, grid);
        self
    }

    /// Number of registered grids.
    pub fn len(&self) -> usize {
        self.grids.len()
    }

    /// True if no grid is registered.
    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    fn lookup(&self, phase: &str, station: &str) -> Option<&TravelTimeGrid> {
        let key = (station.to_string(), phase.to_string());
        if let Some(g) = self.grids.get(&key) {
            return Some(g);
        }
        let family = if is_s_phase(phase) { "S" } else { "P" };
        self.grids.get(&(station.to_string(), family.to_string()))
    }
}

impl TravelTimeField for GridField {
    fn travel_time(&self, phase: &str, station: &Station, point: Vec3) -> Option<f64> {
        self.lookup(phase, &station.label)?.interpolate(point)
    }
}
