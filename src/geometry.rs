// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::ops::{Add, Index, IndexMut, Mul, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{LocateError, Result};

/// A point or displacement in the working Cartesian frame (km, z positive down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// East coordinate.
    pub x: f64,
    /// North coordinate.
    pub y: f64,
    /// Depth coordinate.
    pub z: f64,
}

impl Vec3 {
    /// Create a new vector.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    /// Vector with all components equal to `v`.
    pub const fn splat(v: f64) -> Self {
        Vec3 { x: v, y: v, z: v }
    }

    /// Euclidean length.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// 3D distance to `other`.
    pub fn dist(&self, other: &Vec3) -> f64 {
        (*self - *other).norm()
    }

    /// Horizontal (x, y) distance to `other`.
    pub fn dist_horizontal(&self, other: &Vec3) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Azimuth from `self` to `other` in degrees clockwise from north, in [0, 360).
    pub fn azimuth_to(&self, other: &Vec3) -> f64 {
        let az = (other.x - self.x).atan2(other.y - self.y).to_degrees();
        if az < 0.0 {
            az + 360.0
        } else {
            az
        }
    }

    /// Product of the three components (a volume when `self` is a box size).
    pub fn product(&self) -> f64 {
        self.x * self.y * self.z
    }

    /// Largest component.
    pub fn max_component(&self) -> f64 {
        self.x.max(self.y).max(self.z)
    }

    /// Components as an array.
    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(a: [f64; 3]) -> Self {
        Vec3::new(a[0], a[1], a[2])
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Index<usize> for Vec3 {
    type Output = f64;
    fn index(&self, axis: usize) -> &f64 {
        match axis {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Vec3 axis {} out of range", axis),
        }
    }
}

impl IndexMut<usize> for Vec3 {
    fn index_mut(&mut self, axis: usize) -> &mut f64 {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            _ => panic!("Vec3 axis {} out of range", axis),
        }
    }
}

/// Regular 3D search grid: `num` nodes per axis starting at `origin`,
/// separated by `spacing`.
///
/// The grid also defines the search domain for the Metropolis walk and the
/// octree: the closed box from `origin` to [`SearchGrid::max_corner`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchGrid {
    /// Position of node (0, 0, 0).
    pub origin: Vec3,
    /// Node spacing along each axis.
    pub spacing: Vec3,
    /// Number of nodes along each axis.
    pub num: [usize; 3],
}

impl SearchGrid {
    /// Create a new search grid.
    ///
    /// # Errors
    /// Returns an error if any spacing is not positive and finite or any axis
    /// has fewer than 2 nodes.
    pub fn new(origin: Vec3, spacing: Vec3, num: [usize; 3]) -> Result<Self> {
        let grid = SearchGrid {
            origin,
            spacing,
            num,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Check spacing and node counts.
    pub fn validate(&self) -> Result<()> {
        for axis in 0..3 {
            let h = self.spacing[axis];
            if !h.is_finite() || h <= 0.0 {
                return Err(LocateError::InvalidGridSpacing(h));
            }
            if self.num[axis] < 2 {
                return Err(LocateError::InvalidGridShape {
                    axis,
                    size: self.num[axis],
                });
            }
        }
        Ok(())
    }

    /// Total number of grid nodes.
    pub fn num_nodes(&self) -> usize {
        self.num.iter().product()
    }

    /// Position of node `idx`.
    pub fn node(&self, idx: [usize; 3]) -> Vec3 {
        Vec3::new(
            self.origin.x + idx[0] as f64 * self.spacing.x,
            self.origin.y + idx[1] as f64 * self.spacing.y,
            self.origin.z + idx[2] as f64 * self.spacing.z,
        )
    }

    /// Convert a flat (row-major, z fastest) index to a 3D index.
    pub fn flat_to_nd(&self, flat: usize) -> [usize; 3] {
        let nyz = self.num[1] * self.num[2];
        [flat / nyz, (flat % nyz) / self.num[2], flat % self.num[2]]
    }

    /// Convert a 3D index to a flat (row-major, z fastest) index.
    pub fn nd_to_flat(&self, idx: [usize; 3]) -> usize {
        (idx[0] * self.num[1] + idx[1]) * self.num[2] + idx[2]
    }

    /// Side lengths of the domain.
    pub fn extent(&self) -> Vec3 {
        Vec3::new(
            (self.num[0] - 1) as f64 * self.spacing.x,
            (self.num[1] - 1) as f64 * self.spacing.y,
            (self.num[2] - 1) as f64 * self.spacing.z,
        )
    }

    /// Far corner of the domain.
    pub fn max_corner(&self) -> Vec3 {
        self.origin + self.extent()
    }

    /// Domain center.
    pub fn center(&self) -> Vec3 {
        self.origin + self.extent() * 0.5
    }

    /// True if `p` lies inside the closed domain box.
    pub fn contains(&self, p: Vec3) -> bool {
        let max = self.max_corner();
        (0..3).all(|a| p[a] >= self.origin[a] && p[a] <= max[a])
    }

    /// Clamp `p` into the domain. Returns the clamped point and whether any
    /// component was changed.
    pub fn clip(&self, p: Vec3) -> (Vec3, bool) {
        let max = self.max_corner();
        let mut out = p;
        let mut clipped = false;
        for a in 0..3 {
            if out[a] < self.origin[a] {
                out[a] = self.origin[a];
                clipped = true;
            } else if out[a] > max[a] {
                out[a] = max[a];
                clipped = true;
            }
        }
        (out, clipped)
    }

    /// True if `p` is within `tolerance[axis]` of any face of the domain.
    pub fn is_on_boundary(&self, p: Vec3, tolerance: Vec3) -> bool {
        let max = self.max_corner();
        (0..3).any(|a| p[a] - self.origin[a] <= tolerance[a] || max[a] - p[a] <= tolerance[a])
    }
}
