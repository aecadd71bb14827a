// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::Path;

use ndarray::{Array2, Array3, ArrayD, IxDyn, ShapeBuilder};

use crate::error::{LocateError, Result};
use crate::geometry::Vec3;
use crate::search::ScatterSample;
use crate::ttime::eikonal::velocity_to_slowness;
use crate::ttime::{SlownessModel, TravelTimeGrid};

/// Supported file formats for grid I/O.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    /// NumPy .npy format.
    Npy,
    /// MATLAB .mat format (Level 5).
    Mat,
}

/// Infer file format from extension.
pub fn infer_format(path: &Path) -> Result<FileFormat> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("npy") => Ok(FileFormat::Npy),
        Some("mat") => Ok(FileFormat::Mat),
        Some(ext) => Err(LocateError::UnsupportedFileFormat(ext.to_string())),
        None => Err(LocateError::UnsupportedFileFormat(
            "(no extension)".to_string(),
        )),
    }
}

/// Load a row-major f64 array from a .npy file (f32 is promoted).
pub fn load_npy_values(path: &Path, expected_shape: &[usize]) -> Result<Vec<f64>> {
    let arr: ArrayD<f64> = match ndarray_npy::read_npy(path) {
        Ok(a) => a,
        Err(_) => {
            let arr32: ArrayD<f32> = ndarray_npy::read_npy(path)
                .map_err(|e| LocateError::UnsupportedDtype(format!("{}", e)))?;
            arr32.mapv(f64::from)
        }
    };

    let got_shape = arr.shape().to_vec();
    if got_shape != expected_shape {
        return Err(LocateError::ShapeMismatch {
            expected: expected_shape.to_vec(),
            got: got_shape,
        });
    }
    // Fortran-order files must be relaid before taking the raw buffer.
    Ok(arr.as_standard_layout().to_owned().into_raw_vec())
}

/// Load a named numeric variable from a .mat file as a row-major array.
///
/// MAT data is column-major; the stored shape may be either the expected
/// shape or its reverse.
pub fn load_mat_values(path: &Path, variable: &str, expected_shape: &[usize]) -> Result<Vec<f64>> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);
    let mat = matfile::MatFile::parse(&mut reader)
        .map_err(|e| LocateError::Other(format!("MAT parse error: {}", e)))?;

    let array = mat
        .find_by_name(variable)
        .ok_or_else(|| LocateError::MatVariableNotFound {
            expected: variable.to_string(),
            available: mat.arrays().iter().map(|a| a.name().to_string()).collect(),
        })?;

    let data: Vec<f64> = match array.data() {
        matfile::NumericData::Double { real, .. } => real.clone(),
        matfile::NumericData::Single { real, .. } => real.iter().map(|&v| f64::from(v)).collect(),
        _ => {
            return Err(LocateError::UnsupportedDtype(format!(
                "MAT variable '{}' is not f64 or f32",
                variable
            )))
        }
    };

    let mat_shape = array.size().to_vec();
    let reversed: Vec<usize> = expected_shape.iter().rev().copied().collect();
    let same = mat_shape == expected_shape;
    if (!same && mat_shape != reversed) || data.len() != expected_shape.iter().product::<usize>() {
        return Err(LocateError::ShapeMismatch {
            expected: expected_shape.to_vec(),
            got: mat_shape,
        });
    }

    let arr = ArrayD::from_shape_vec(IxDyn(&mat_shape).f(), data)
        .map_err(|e| LocateError::Other(format!("shape error: {}", e)))?;
    let arr = if same {
        arr
    } else {
        let perm: Vec<usize> = (0..expected_shape.len()).rev().collect();
        arr.permuted_axes(IxDyn(&perm))
    };
    Ok(arr.as_standard_layout().to_owned().into_raw_vec())
}

/// Load a field from .npy or .mat; `variable` names the MAT variable.
pub fn load_values(path: &Path, variable: &str, expected_shape: &[usize]) -> Result<Vec<f64>> {
    match infer_format(path)? {
        FileFormat::Npy => load_npy_values(path, expected_shape),
        FileFormat::Mat => load_mat_values(path, variable, expected_shape),
    }
}

/// Load a precomputed travel-time grid (MAT variable `traveltime`).
pub fn load_travel_time_grid(
    path: &Path,
    origin: Vec3,
    spacing: f64,
    shape: [usize; 3],
) -> Result<TravelTimeGrid> {
    let values = load_values(path, "traveltime", &shape)?;
    TravelTimeGrid::new(origin, spacing, shape, values)
}

/// Load a velocity model (MAT variable `velocity`) as slowness.
pub fn load_velocity_model(
    path: &Path,
    origin: Vec3,
    spacing: f64,
    shape: [usize; 3],
) -> Result<SlownessModel> {
    let velocity = load_values(path, "velocity", &shape)?;
    SlownessModel::new(origin, shape, spacing, velocity_to_slowness(&velocity)?)
}

/// Save a travel-time grid to a .npy file.
pub fn save_travel_time_npy(grid: &TravelTimeGrid, path: &Path) -> Result<()> {
    let arr = Array3::from_shape_vec(grid.shape(), grid.values().to_vec())
        .map_err(|e| LocateError::Other(format!("shape error: {}", e)))?;
    write_npy(path, &arr)
}

/// Save scatter samples as an `N x 4` array of `x, y, z, ln_prob` rows.
pub fn save_scatter_npy(samples: &[ScatterSample], path: &Path) -> Result<()> {
    let mut arr = Array2::<f64>::zeros((samples.len(), 4));
    for (mut row, s) in arr.outer_iter_mut().zip(samples) {
        row[0] = s.position.x;
        row[1] = s.position.y;
        row[2] = s.position.z;
        row[3] = s.ln_prob;
    }
    write_npy(path, &arr)
}

/// Save a grid-search log-probability volume.
pub fn save_pdf_grid_npy(values: &Array3<f64>, path: &Path) -> Result<()> {
    write_npy(path, values)
}

fn write_npy<A>(path: &Path, arr: &A) -> Result<()>
where
    A: ndarray_npy::WriteNpyExt,
{
    ndarray_npy::write_npy(path, arr).map_err(|e| LocateError::Other(format!("npy write error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("hypoloc_{}_{}", std::process::id(), name))
    }

    #[test]
    fn travel_time_npy_roundtrip() {
        let values: Vec<f64> = (0..24).map(|v| v as f64 * 0.25).collect();
        let grid = TravelTimeGrid::new(Vec3::default(), 1.0, [2, 3, 4], values.clone()).unwrap();
        let path = tmp("tt.npy");
        save_travel_time_npy(&grid, &path).unwrap();
        let loaded = load_travel_time_grid(&path, Vec3::default(), 1.0, [2, 3, 4]).unwrap();
        assert_eq!(loaded.values(), values.as_slice());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn npy_shape_mismatch() {
        let grid = TravelTimeGrid::new(Vec3::default(), 1.0, [2, 2, 2], vec![1.0; 8]).unwrap();
        let path = tmp("mismatch.npy");
        save_travel_time_npy(&grid, &path).unwrap();
        let r = load_npy_values(&path, &[2, 2, 3]);
        assert!(matches!(r, Err(LocateError::ShapeMismatch { .. })));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn scatter_rows() {
        let samples = vec![
            ScatterSample {
                position: Vec3::new(1.0, 2.0, 3.0),
                ln_prob: -0.5,
            },
            ScatterSample {
                position: Vec3::new(4.0, 5.0, 6.0),
                ln_prob: -1.5,
            },
        ];
        let path = tmp("scatter.npy");
        save_scatter_npy(&samples, &path).unwrap();
        let loaded = load_npy_values(&path, &[2, 4]).unwrap();
        assert_eq!(loaded, vec![1.0, 2.0, 3.0, -0.5, 4.0, 5.0, 6.0, -1.5]);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn pdf_grid_keeps_shape() {
        let pdf = Array3::from_shape_fn((2, 3, 2), |(i, j, k)| -((i * 6 + j * 2 + k) as f64));
        let path = tmp("pdf.npy");
        save_pdf_grid_npy(&pdf, &path).unwrap();
        let loaded = load_npy_values(&path, &[2, 3, 2]).unwrap();
        assert_eq!(loaded, pdf.iter().copied().collect::<Vec<_>>());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unsupported_format() {
        assert!(matches!(
            infer_format(Path::new("model.xyz")),
            Err(LocateError::UnsupportedFileFormat(_))
        ));
        assert!(matches!(
            infer_format(Path::new("model")),
            Err(LocateError::UnsupportedFileFormat(_))
        ));
    }

    #[test]
    fn missing_mat_file_is_io_error() {
        let r = load_mat_values(Path::new("/nonexistent/hypoloc.mat"), "velocity", &[2, 2, 2]);
        assert!(matches!(r, Err(LocateError::Io(_))));
    }
}
