//! ROI utilities: flattening masked volumes to per-voxel vectors and back.
//!
//! Purpose
//! -------
//! Fitting operates on flat regions of interest: a 3-D brain mask selects
//! voxels, and every per-voxel quantity (signal series, parameter maps,
//! gradient deviations) is carried as one row per selected voxel. These
//! helpers convert between spatial volumes and that flat layout.
//!
//! Conventions
//! -----------
//! - Voxel order is column-major (Fortran order): linear index
//!   `x + nx·y + nx·ny·z`, i.e. `x` varies fastest. Every flattened
//!   quantity in the crate uses this order, so maps from different sources
//!   always line up row for row.
//! - Restored volumes are zero outside the mask.
use crate::fitting::errors::{FittingError, FittingResult};
use ndarray::{Array1, Array2, Array3, Array4};

/// Coordinates of the masked voxels, in column-major order.
pub fn mask_voxel_indices(mask: &Array3<bool>) -> Vec<(usize, usize, usize)> {
    let (nx, ny, nz) = mask.dim();
    let mut indices = Vec::new();
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if mask[(x, y, z)] {
                    indices.push((x, y, z));
                }
            }
        }
    }
    indices
}

fn check_spatial_shape(
    expected: (usize, usize, usize), actual: (usize, usize, usize),
) -> FittingResult<()> {
    if expected != actual {
        return Err(FittingError::VolumeShapeMismatch { expected, actual });
    }
    Ok(())
}

/// Flatten a scalar volume to one value per masked voxel.
///
/// ## Errors
/// - `VolumeShapeMismatch` when `volume` and `mask` disagree spatially.
pub fn create_roi(volume: &Array3<f64>, mask: &Array3<bool>) -> FittingResult<Array1<f64>> {
    check_spatial_shape(mask.dim(), volume.dim())?;
    Ok(mask_voxel_indices(mask).into_iter().map(|idx| volume[idx]).collect())
}

/// Flatten a 4-D volume `(x, y, z, k)` to a matrix with one row of `k`
/// values per masked voxel. Used for signal series and gradient-deviation
/// volumes.
///
/// ## Errors
/// - `VolumeShapeMismatch` when the spatial dimensions disagree with the
///   mask.
pub fn create_roi_series(
    volume: &Array4<f64>, mask: &Array3<bool>,
) -> FittingResult<Array2<f64>> {
    let (vx, vy, vz, k) = volume.dim();
    check_spatial_shape(mask.dim(), (vx, vy, vz))?;
    let indices = mask_voxel_indices(mask);
    let mut roi = Array2::zeros((indices.len(), k));
    for (row, (x, y, z)) in indices.into_iter().enumerate() {
        for j in 0..k {
            roi[(row, j)] = volume[(x, y, z, j)];
        }
    }
    Ok(roi)
}

/// Restore a flat per-voxel vector to a volume, zero outside the mask.
///
/// ## Errors
/// - `RoiLengthMismatch` when `values` does not have one entry per masked
///   voxel.
pub fn restore_volume(values: &Array1<f64>, mask: &Array3<bool>) -> FittingResult<Array3<f64>> {
    let indices = mask_voxel_indices(mask);
    if values.len() != indices.len() {
        return Err(FittingError::RoiLengthMismatch {
            expected: indices.len(),
            actual: values.len(),
        });
    }
    let mut volume = Array3::zeros(mask.dim());
    for (row, idx) in indices.into_iter().enumerate() {
        volume[idx] = values[row];
    }
    Ok(volume)
}
