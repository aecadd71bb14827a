// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use thiserror::Error;

/// Errors that abort the location of an event, or the setup of its inputs.
///
/// Per-sample problems (a candidate point whose travel times cannot be
/// resolved) are never reported through this type; searches count them and
/// carry on.
#[derive(Debug, Error)]
pub enum LocateError {
    /// Not enough usable arrivals to attempt a location.
    #[error("too few arrivals for location: {got} usable, at least {min} required")]
    TooFewArrivals {
        /// Number of usable (non-ignored) arrivals.
        got: usize,
        /// Configured minimum.
        min: usize,
    },
    /// The data covariance matrix could not be inverted.
    #[error("weight matrix inversion failed: {reason}")]
    SingularWeightMatrix {
        /// What went wrong during the inversion.
        reason: String,
    },
    /// The Metropolis walk could not accept a sample within the retry ceiling.
    #[error(
        "metropolis retry ceiling exceeded: {tries} consecutive rejections after {accepted} accepted samples"
    )]
    MetropolisRetriesExceeded {
        /// Consecutive rejected proposals.
        tries: usize,
        /// Samples accepted before giving up.
        accepted: usize,
    },
    /// After the learning phase the best likelihood is below the configured floor.
    #[error("maximum likelihood {best:e} after learning is below minimum {floor:e}")]
    LikelihoodBelowFloor {
        /// Best likelihood found (linear scale).
        best: f64,
        /// Configured minimum (linear scale).
        floor: f64,
    },
    /// Every candidate point of the search failed to resolve travel times.
    #[error("no valid samples: all {evaluated} evaluated points were rejected")]
    NoValidSamples {
        /// Number of points that were tried.
        evaluated: usize,
    },
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Grid shape is invalid (dimension too small).
    #[error("invalid grid shape: axis {axis} has size {size} (must be >= 2)")]
    InvalidGridShape {
        /// The axis index.
        axis: usize,
        /// The size provided.
        size: usize,
    },
    /// Grid spacing is not positive and finite.
    #[error("invalid grid spacing: {0} (must be positive and finite)")]
    InvalidGridSpacing(f64),
    /// Slowness value is not positive and finite.
    #[error("invalid slowness at index {index}: {value} (must be positive and finite)")]
    InvalidSlowness {
        /// The flat index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// Velocity value is not positive and finite.
    #[error("invalid velocity at index {index}: {value} (must be positive and finite)")]
    InvalidVelocity {
        /// The flat index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// Point source lies outside the travel-time grid.
    #[error("invalid source at {coord:?}: {reason}")]
    InvalidSource {
        /// The source coordinates.
        coord: [f64; 3],
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// Array shape does not match expected shape.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Unsupported data type in file.
    #[error("unsupported dtype: {0}")]
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    #[error("unsupported file format: {0}")]
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    #[error("MAT variable '{expected}' not found; available variables: {available:?}")]
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Other error with a descriptive message.
    #[error("{0}")]
    Other(String),
}

impl LocateError {
    /// Distinct negative status code for each abort cause.
    ///
    /// Hosts that report a numeric location status can use these directly;
    /// a successful (or rejected) location is status `0`.
    pub fn status_code(&self) -> i32 {
        match self {
            LocateError::TooFewArrivals { .. } => -1,
            LocateError::SingularWeightMatrix { .. } => -2,
            LocateError::MetropolisRetriesExceeded { .. } => -3,
            LocateError::LikelihoodBelowFloor { .. } => -4,
            LocateError::NoValidSamples { .. } => -5,
            LocateError::InvalidConfig(_) => -6,
            LocateError::InvalidGridShape { .. }
            | LocateError::InvalidGridSpacing(_)
            | LocateError::InvalidSlowness { .. }
            | LocateError::InvalidVelocity { .. }
            | LocateError::InvalidSource { .. }
            | LocateError::ShapeMismatch { .. } => -7,
            LocateError::UnsupportedDtype(_)
            | LocateError::UnsupportedFileFormat(_)
            | LocateError::MatVariableNotFound { .. }
            | LocateError::Io(_) => -8,
            LocateError::Other(_) => -9,
        }
    }
}

/// Convenience type alias for Results with LocateError.
pub type Result<T> = std::result::Result<T, LocateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_too_few_arrivals() {
        let e = LocateError::TooFewArrivals { got: 2, min: 4 };
        assert_eq!(
            e.to_string(),
            "too few arrivals for location: 2 usable, at least 4 required"
        );
    }

    #[test]
    fn display_invalid_grid_shape() {
        let e = LocateError::InvalidGridShape { axis: 0, size: 1 };
        assert_eq!(
            e.to_string(),
            "invalid grid shape: axis 0 has size 1 (must be >= 2)"
        );
    }

    #[test]
    fn display_retry_ceiling() {
        let e = LocateError::MetropolisRetriesExceeded {
            tries: 1000,
            accepted: 12,
        };
        assert!(e.to_string().contains("1000 consecutive rejections"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e: LocateError = io_err.into();
        assert!(matches!(e, LocateError::Io(_)));
        assert!(e.to_string().contains("test"));
    }

    #[test]
    fn status_codes_are_negative_and_distinct_per_cause() {
        let errors = [
            LocateError::TooFewArrivals { got: 0, min: 1 },
            LocateError::SingularWeightMatrix {
                reason: "x".to_string(),
            },
            LocateError::MetropolisRetriesExceeded {
                tries: 1,
                accepted: 0,
            },
            LocateError::LikelihoodBelowFloor {
                best: 0.0,
                floor: 1.0,
            },
            LocateError::NoValidSamples { evaluated: 1 },
            LocateError::InvalidConfig("x".to_string()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.status_code()).collect();
        assert!(codes.iter().all(|&c| c < 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
