// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// A recording site in the working Cartesian frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Station code.
    pub label: String,
    /// Position (km). `z` is depth, negative above the datum.
    pub position: Vec3,
}

impl Station {
    /// Create a new station.
    pub fn new(label: impl Into<String>, position: Vec3) -> Self {
        Station {
            label: label.into(),
            position,
        }
    }
}

/// One observed phase pick, as supplied by the observation reader.
///
/// The observed time is a single seconds scalar relative to an arbitrary
/// event epoch. Everything derived from a location (weights, predicted
/// times, residuals) lives in the per-run state, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    /// Recording station.
    pub station: Station,
    /// Optional instrument/component code, used to decide whether two picks
    /// share a clock.
    #[serde(default)]
    pub instrument: Option<String>,
    /// Phase label (e.g. `P`, `S`, `Pn`).
    pub phase: String,
    /// Observed arrival time (s).
    pub obs_time: f64,
    /// A priori pick error, one standard deviation (s).
    pub error: f64,
    /// Excluded from scoring; still finalized.
    #[serde(default)]
    pub ignore: bool,
    /// False when the station clock is not tied to absolute time. Such picks
    /// only enter same-station differential times.
    #[serde(default = "default_true")]
    pub abs_timing: bool,
    /// Index of a co-located arrival whose travel time this one reuses,
    /// scaled by the Vp/Vs ratio.
    #[serde(default)]
    pub companion: Option<usize>,
    /// Station-distribution weight precomputed from station geometry.
    #[serde(default = "default_one")]
    pub station_weight: f64,
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

impl Arrival {
    /// Create an arrival with absolute timing and unit station weight.
    pub fn new(station: Station, phase: impl Into<String>, obs_time: f64, error: f64) -> Self {
        Arrival {
            station,
            instrument: None,
            phase: phase.into(),
            obs_time,
            error,
            ignore: false,
            abs_timing: true,
            companion: None,
            station_weight: 1.0,
        }
    }

    /// Mark the arrival as ignored (builder method).
    pub fn ignored(mut self) -> Self {
        self.ignore = true;
        self
    }

    /// Mark the arrival as lacking absolute timing (builder method).
    pub fn without_abs_timing(mut self) -> Self {
        self.abs_timing = false;
        self
    }

    /// Reuse the travel time of arrival `index` (builder method).
    pub fn with_companion(mut self, index: usize) -> Self {
        self.companion = Some(index);
        self
    }

    /// True for S-type phases (first letter `S`, case-insensitive).
    pub fn is_s_phase(&self) -> bool {
        is_s_phase(&self.phase)
    }

    /// True if the two picks were recorded on the same station and
    /// instrument, so their relative time does not depend on clock accuracy.
    pub fn shares_clock_with(&self, other: &Arrival) -> bool {
        self.station.label == other.station.label && self.instrument == other.instrument
    }
}

/// True for S-type phase labels.
pub fn is_s_phase(phase: &str) -> bool {
    phase
        .chars()
        .next()
        .map(|c| c.eq_ignore_ascii_case(&'S'))
        .unwrap_or(false)
}

/// Distinct stations of the non-ignored arrivals, in first-seen order.
pub fn distinct_stations(arrivals: &[Arrival]) -> Vec<Station> {
    let mut stations: Vec<Station> = Vec::new();
    for arr in arrivals.iter().filter(|a| !a.ignore) {
        if !stations.iter().any(|s| s.label == arr.station.label) {
            stations.push(arr.station.clone());
        }
    }
    stations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sta(label: &str, x: f64) -> Station {
        Station::new(label, Vec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn s_phase_detection() {
        assert!(is_s_phase("S"));
        assert!(is_s_phase("sS"));
        assert!(is_s_phase("Sg"));
        assert!(!is_s_phase("P"));
        assert!(!is_s_phase(""));
    }

    #[test]
    fn shared_clock_requires_same_instrument() {
        let a = Arrival::new(sta("A", 0.0), "P", 1.0, 0.1);
        let mut b = Arrival::new(sta("A", 0.0), "S", 2.0, 0.1);
        assert!(a.shares_clock_with(&b));
        b.instrument = Some("HHZ".to_string());
        assert!(!a.shares_clock_with(&b));
        let c = Arrival::new(sta("B", 1.0), "P", 1.0, 0.1);
        assert!(!a.shares_clock_with(&c));
    }

    #[test]
    fn distinct_stations_skips_ignored_and_duplicates() {
        let arrivals = vec![
            Arrival::new(sta("A", 0.0), "P", 1.0, 0.1),
            Arrival::new(sta("A", 0.0), "S", 2.0, 0.1),
            Arrival::new(sta("B", 1.0), "P", 1.0, 0.1).ignored(),
            Arrival::new(sta("C", 2.0), "P", 1.0, 0.1),
        ];
        let labels: Vec<String> = distinct_stations(&arrivals)
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec!["A".to_string(), "C".to_string()]);
    }

    #[test]
    fn serde_defaults() {
        let json = r#"{"station":{"label":"X","position":{"x":1.0,"y":2.0,"z":0.0}},
                      "phase":"P","obs_time":3.5,"error":0.05}"#;
        let a: Arrival = serde_json::from_str(json).unwrap();
        assert!(a.abs_timing);
        assert!(!a.ignore);
        assert_eq!(a.station_weight, 1.0);
        assert_eq!(a.companion, None);
    }
}
