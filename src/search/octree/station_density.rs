// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::arrival::Station;
use crate::config::StationDensityParams;
use crate::geometry::Vec3;
use crate::weights::mean_inter_station_distance;

/// Priority bonus for octree nodes near stations, so the tree resolves the
/// PDF where the network is dense.
#[derive(Debug, Clone)]
pub struct StationDensity {
    positions: Vec<Vec3>,
    mean_distance: f64,
    params: StationDensityParams,
}

impl StationDensity {
    /// `None` with fewer than two distinct station positions.
    pub fn new(stations: &[Station], params: StationDensityParams) -> Option<Self> {
        let mean_distance = mean_inter_station_distance(stations).filter(|d| *d > 0.0)?;
        Some(StationDensity {
            positions: stations.iter().map(|s| s.position).collect(),
            mean_distance,
            params,
        })
    }

    /// Weight of a node at `level` with the given cell. Below `max_level`
    /// the node inherits half of its parent's weight.
    pub fn weight(&self, center: Vec3, size: Vec3, level: usize, parent_weight: f64) -> f64 {
        if level > self.params.max_level {
            return 0.5 * parent_weight;
        }
        let d = self
            .positions
            .iter()
            .map(|s| s.dist(&center))
            .fold(f64::INFINITY, f64::min);
        if d <= 0.5 * size.norm() {
            return self.params.force_weight;
        }
        (-(d / self.mean_distance).ln()).clamp(-self.params.max_weight, self.params.force_weight)
    }
}
