//! Model parameters and their perturbation functions.
//!
//! This module provides the **parameter container** [`Parameter`] used by
//! every compartment in the registry, and the **perturbation function**
//! [`Perturbation`] used to generate randomized restarts during
//! meta-optimization.
//!
//! ## What this module defines
//! - [`Parameter`]: a named scalar with a default value, box bounds, a
//!   fixed flag, and a perturbation function.
//! - [`Perturbation`]: how a fitted per-voxel value is re-sampled for a
//!   Monte-Carlo restart. Values are always clamped back into the
//!   parameter's bounds after sampling.
//!
//! ## Conventions
//! - Parameter names here are **bare** (`d`, `theta`, `w`); the qualified
//!   form `"<instance>.<parameter>"` is produced by the owning compartment.
//! - Bounds are inclusive and must satisfy `lower < upper` with both
//!   endpoints finite; defaults must be finite (constructors validate).
//! - A `fixed` parameter never enters the optimizer's free-parameter
//!   vector; its default (or a configured fix) is used directly.
//!
//! ## Invariants validated by constructors
//! - `default`, `lower_bound`, `upper_bound` finite
//! - `lower_bound < upper_bound`
//! - perturbation standard deviations finite and > 0
use crate::composition::{
    core::validation::{validate_bounds, validate_finite_value},
    errors::{CompositionError, CompositionResult},
};
use ndarray::Array1;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Perturbation function attached to a [`Parameter`].
///
/// Used by the composite model's `perturbate` hook to re-sample fitted
/// per-voxel values before a randomized restart. The sampled value is
/// always clamped to the parameter's `[lower_bound, upper_bound]` interval
/// so a restart never starts outside the feasible box.
#[derive(Debug, Clone, PartialEq)]
pub enum Perturbation {
    /// Leave the value untouched.
    None,

    /// Add zero-mean Gaussian noise with the given standard deviation,
    /// then clamp to the parameter bounds.
    TruncatedGaussian { std: f64 },
}

impl Perturbation {
    /// Re-sample `values` in place according to this perturbation function.
    ///
    /// ## Arguments
    /// - `values`: per-voxel values of one optimized parameter map.
    /// - `lower`, `upper`: the owning parameter's bounds, used for clamping.
    /// - `rng`: source of randomness supplied by the caller, so restarts
    ///   are reproducible under a seeded generator.
    ///
    /// ## Notes
    /// - [`Perturbation::None`] is a no-op.
    /// - The Gaussian standard deviation is validated at construction time
    ///   ([`Parameter::with_perturbation`]); a pathological value that
    ///   nevertheless slips through leaves `values` unchanged rather than
    ///   panicking.
    pub fn apply<R: Rng + ?Sized>(
        &self, values: &mut Array1<f64>, lower: f64, upper: f64, rng: &mut R,
    ) {
        match self {
            Perturbation::None => {}
            Perturbation::TruncatedGaussian { std } => {
                let Ok(noise) = Normal::new(0.0, *std) else {
                    return;
                };
                values.iter_mut().for_each(|v| {
                    *v = (*v + noise.sample(rng)).clamp(lower, upper);
                });
            }
        }
    }
}

/// A named scalar parameter of a compartment.
///
/// Invariants are validated at construction; see the module docs. Cloned
/// freely: compartments copy their parameter lists when instantiated under
/// an alias, so `Stick0.d` and `Stick1.d` are fully independent.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Bare parameter name, e.g. `d` or `theta`.
    pub name: String,
    /// Default (initial) value used when no init or fix overrides it.
    pub default: f64,
    /// Inclusive lower bound.
    pub lower_bound: f64,
    /// Inclusive upper bound.
    pub upper_bound: f64,
    /// Fixed parameters never enter the free-parameter vector.
    pub fixed: bool,
    /// Perturbation function for randomized restarts.
    pub perturbation: Perturbation,
}

impl Parameter {
    /// Create a free parameter with validated default and bounds.
    ///
    /// Validates:
    /// - `default`, `lower_bound`, `upper_bound` finite
    /// - `lower_bound < upper_bound`
    ///
    /// The perturbation function defaults to [`Perturbation::None`]; use
    /// [`Parameter::with_perturbation`] to attach one.
    pub fn new(
        name: &str, default: f64, lower_bound: f64, upper_bound: f64,
    ) -> CompositionResult<Parameter> {
        validate_finite_value(name, default)?;
        validate_bounds(name, lower_bound, upper_bound)?;
        Ok(Parameter {
            name: name.to_string(),
            default,
            lower_bound,
            upper_bound,
            fixed: false,
            perturbation: Perturbation::None,
        })
    }

    /// Create a parameter that is fixed at its default value.
    ///
    /// Fixed parameters are still part of the compartment's parameter list
    /// (so they can be referenced by dependencies and configuration fixes)
    /// but are excluded from the optimizer's free-parameter vector.
    pub fn fixed(
        name: &str, default: f64, lower_bound: f64, upper_bound: f64,
    ) -> CompositionResult<Parameter> {
        let mut param = Parameter::new(name, default, lower_bound, upper_bound)?;
        param.fixed = true;
        Ok(param)
    }

    /// Attach a truncated-Gaussian perturbation with the given standard
    /// deviation (must be finite and > 0).
    pub fn with_perturbation(mut self, std: f64) -> CompositionResult<Parameter> {
        if !std.is_finite() || std <= 0.0 {
            return Err(CompositionError::InvalidPerturbation { name: self.name.clone(), std });
        }
        self.perturbation = Perturbation::TruncatedGaussian { std };
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::errors::CompositionError;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    // Purpose
    // -------
    // `Parameter::new` accepts a finite default inside finite, ordered
    // bounds and starts out free with no perturbation.
    fn new_with_valid_default_and_bounds_returns_free_parameter() {
        // Arrange & Act
        let param = Parameter::new("d", 1.7e-9, 0.0, 1e-8).unwrap();

        // Assert
        assert!(!param.fixed);
        assert_eq!(param.perturbation, Perturbation::None);
        assert_eq!(param.default, 1.7e-9);
    }

    #[test]
    // Purpose
    // -------
    // `Parameter::new` rejects inverted bounds with `InvalidBounds`.
    fn new_with_inverted_bounds_returns_invalid_bounds() {
        // Arrange & Act
        let result = Parameter::new("d", 0.5, 1.0, 0.0);

        // Assert
        match result {
            Err(CompositionError::InvalidBounds { name, lower, upper }) => {
                assert_eq!(name, "d");
                assert_eq!(lower, 1.0);
                assert_eq!(upper, 0.0);
            }
            other => panic!("expected InvalidBounds error, got: {other:?}"),
        }
    }

    #[test]
    // Purpose
    // -------
    // `Parameter::new` rejects a non-finite default with `NonFiniteValue`.
    fn new_with_non_finite_default_returns_non_finite_value() {
        // Arrange & Act
        let result = Parameter::new("d", f64::NAN, 0.0, 1.0);

        // Assert
        assert!(matches!(result, Err(CompositionError::NonFiniteValue { .. })));
    }

    #[test]
    // Purpose
    // -------
    // A truncated-Gaussian perturbation moves values but never outside the
    // parameter bounds, and `Perturbation::None` leaves values untouched.
    //
    // Given
    // -----
    // - A `w`-style parameter bounded to [0, 1].
    // - A seeded RNG for determinism.
    //
    // Expect
    // ------
    // - All perturbed values stay within [0, 1].
    // - The `None` perturbation is bit-identical.
    fn truncated_gaussian_perturbation_respects_bounds() {
        // Arrange
        let param = Parameter::new("w", 0.5, 0.0, 1.0).unwrap().with_perturbation(0.2).unwrap();
        let mut values = array![0.0_f64, 0.5, 1.0];
        let untouched = values.clone();
        let mut rng = StdRng::seed_from_u64(42);

        // Act
        param.perturbation.apply(&mut values, param.lower_bound, param.upper_bound, &mut rng);

        // Assert
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));

        // Act (None)
        let mut copy = untouched.clone();
        Perturbation::None.apply(&mut copy, 0.0, 1.0, &mut rng);

        // Assert
        assert_eq!(copy, untouched);
    }

    #[test]
    // Purpose
    // -------
    // `with_perturbation` rejects non-positive standard deviations.
    fn with_perturbation_rejects_non_positive_std() {
        // Arrange
        let param = Parameter::new("w", 0.5, 0.0, 1.0).unwrap();

        // Act
        let result = param.with_perturbation(0.0);

        // Assert
        assert!(matches!(result, Err(CompositionError::InvalidPerturbation { .. })));
    }
}
