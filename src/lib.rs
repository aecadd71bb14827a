// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Probabilistic, non-linear earthquake hypocenter location.
//!
//! Given phase arrival times at a set of stations and a source of predicted
//! travel times, this library searches a 3D domain for the posterior
//! probability density of the hypocenter and its origin time. Three search
//! strategies are provided: an exhaustive grid search, a Metropolis random
//! walk and an adaptive octree. Points are scored by one of several
//! likelihood functions, from the classical Gaussian L2 misfit to the
//! outlier-robust equal differential time (EDT) and origin-time stacking
//! methods.
//!
//! The usual entry point is [`locate`], which takes the arrivals, a
//! [`TravelTimeField`], a [`Topography`] and a [`LocateConfig`].

#![warn(missing_docs)]

/// Stations and phase arrivals.
pub mod arrival;
/// Location configuration and validation.
pub mod config;
/// Error types for the library.
pub mod error;
/// Coordinates and the search grid.
pub mod geometry;
/// File I/O for travel-time grids, velocity models and location products.
pub mod io;
/// Event location orchestration and finalization.
pub mod locate;
/// Likelihood functions.
pub mod misfit;
/// Grid, Metropolis and octree searches.
pub mod search;
/// Moments, running variance and the confidence ellipsoid.
pub mod stats;
/// Travel-time sources.
pub mod ttime;
/// Data covariance and arrival weights.
pub mod weights;

pub use crate::arrival::{Arrival, Station};
pub use crate::config::{LocMethod, LocateConfig, MethodConfig, OtWeighting, SearchConfig};
pub use crate::error::{LocateError, Result};
pub use crate::geometry::{SearchGrid, Vec3};
pub use crate::locate::{locate, Hypocenter, LocStatus, Location};
pub use crate::ttime::{ConstantVelocity, Topography, TravelTimeField};
