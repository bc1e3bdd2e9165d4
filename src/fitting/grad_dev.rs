//! Gradient nonlinearity corrections.
//!
//! Scanner gradient coils deviate from their nominal field; the HCP
//! WU-Minn convention ships a per-voxel deviation tensor `dev` (9 values,
//! column-major) such that the effective gradient is `(I + dev) · g`.
//! Applying the correction rescales the b-value by the squared norm of the
//! effective gradient and re-normalizes the direction.
//!
//! Deviations can be supplied as a full 4-D volume (x, y, z, 9) or already
//! flattened to one row of 9 values per ROI voxel; the composite model
//! flattens volumes against its mask on attachment.
use crate::fitting::errors::{FittingError, FittingResult};
use nalgebra::{Matrix3, Vector3};
use ndarray::{Array2, Array4, ArrayView1};

/// Per-voxel gradient deviations, before attachment to a model.
#[derive(Debug, Clone, PartialEq)]
pub enum GradientDeviations {
    /// Full volume, shape `(x, y, z, 9)`; flattened against the mask on
    /// attachment.
    Volume(Array4<f64>),
    /// Already flattened, shape `(roi voxels, 9)`.
    PerVoxel(Array2<f64>),
}

/// Correct one measurement for one voxel.
///
/// `dev` holds the 9 deviation components in column-major order. Returns
/// the corrected unit direction and b-value. Voxels where the effective
/// gradient collapses (zero or non-finite norm) are left uncorrected, so a
/// degenerate deviation map never poisons the fit.
///
/// ## Errors
/// - `GradDevShapeMismatch` when `dev` does not carry 9 components.
pub fn apply_gradient_deviation(
    dev: ArrayView1<f64>, g: &Vector3<f64>, b: f64,
) -> FittingResult<(Vector3<f64>, f64)> {
    if dev.len() != 9 {
        return Err(FittingError::GradDevShapeMismatch {
            expected: (1, 9),
            actual: (1, dev.len()),
        });
    }
    // Column-major: dev[c * 3 + r] is row r, column c.
    let deviation = Matrix3::new(
        dev[0], dev[3], dev[6],
        dev[1], dev[4], dev[7],
        dev[2], dev[5], dev[8],
    );
    let effective = (Matrix3::identity() + deviation) * g;
    let norm = effective.norm();
    if !norm.is_normal() {
        return Ok((*g, b));
    }
    Ok((effective / norm, b * norm * norm))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    #[test]
    // Purpose
    // -------
    // A zero deviation is the identity correction.
    fn zero_deviation_is_identity() {
        // Arrange
        let g = Vector3::new(0.0, 0.0, 1.0);

        // Act
        let (corrected_g, corrected_b) =
            apply_gradient_deviation(Array1::<f64>::zeros(9).view(), &g, 1.0e9).unwrap();

        // Assert
        assert_relative_eq!((corrected_g - g).norm(), 0.0);
        assert_relative_eq!(corrected_b, 1.0e9);
    }

    #[test]
    // Purpose
    // -------
    // A uniform 10% gain scales the b-value by 1.21 and keeps the
    // direction; an asymmetric deviation tilts the direction but keeps it
    // unit length.
    fn gain_rescales_b_and_preserves_unit_direction() {
        // Arrange: dev = 0.1 * I in column-major layout.
        let gain = array![0.1, 0.0, 0.0, 0.0, 0.1, 0.0, 0.0, 0.0, 0.1];
        let g = Vector3::new(0.0, 0.0, 1.0);

        // Act
        let (corrected_g, corrected_b) =
            apply_gradient_deviation(gain.view(), &g, 1.0e9).unwrap();

        // Assert
        assert_relative_eq!((corrected_g - g).norm(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(corrected_b, 1.21e9, max_relative = 1e-12);

        // Arrange a shear: column-major entry at row 0, column 2.
        let mut shear = Array1::<f64>::zeros(9);
        shear[6] = 0.3;

        // Act
        let (tilted, _) = apply_gradient_deviation(shear.view(), &g, 1.0e9).unwrap();

        // Assert
        assert_relative_eq!(tilted.norm(), 1.0, max_relative = 1e-12);
        assert!(tilted.x > 0.0);
    }

    #[test]
    // Purpose
    // -------
    // A deviation that annihilates the gradient leaves the measurement
    // uncorrected instead of producing NaNs.
    fn degenerate_deviation_leaves_measurement_uncorrected() {
        // Arrange: dev = -I, so (I + dev) g = 0.
        let annihilate = array![-1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0];
        let g = Vector3::new(0.0, 0.0, 1.0);

        // Act
        let (corrected_g, corrected_b) =
            apply_gradient_deviation(annihilate.view(), &g, 1.0e9).unwrap();

        // Assert
        assert_eq!(corrected_g, g);
        assert_eq!(corrected_b, 1.0e9);
    }

    #[test]
    // Purpose
    // -------
    // A row of the wrong width is a shape error.
    fn wrong_width_is_reported() {
        let g = Vector3::new(0.0, 0.0, 1.0);
        assert!(matches!(
            apply_gradient_deviation(Array1::<f64>::zeros(6).view(), &g, 1.0e9),
            Err(FittingError::GradDevShapeMismatch { .. })
        ));
    }
}
