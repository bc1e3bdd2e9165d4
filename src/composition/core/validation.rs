//! Composition validation helpers — reusable checks for values, bounds, and
//! parameter references.
//!
//! Purpose
//! -------
//! Centralize the small validation routines used across the composition
//! stack so constructors and the dependency resolver can fail fast with
//! structured errors. These helpers enforce finiteness of configured
//! values, ordering of box bounds, and existence of qualified parameter
//! names against the set collected from a model tree.
//!
//! Conventions
//! -----------
//! - Helpers return [`CompositionResult`] and never panic on invalid
//!   *inputs*; panics are reserved for programming errors elsewhere.
//! - Qualified parameter names follow the `"<instance>.<parameter>"`
//!   convention established in
//!   [`compartments`](super::compartments).
//! - This module contains no I/O and no logging; it only inspects numeric
//!   values and name sets.
use crate::composition::errors::{CompositionError, CompositionResult};
use std::collections::BTreeSet;

/// Validate that a configured value (fix or init) is finite.
///
/// ## Errors
/// - `CompositionError::NonFiniteValue` if `value` is NaN or ±∞; the
///   qualified parameter name is carried for diagnostics.
pub fn validate_finite_value(name: &str, value: f64) -> CompositionResult<()> {
    if !value.is_finite() {
        return Err(CompositionError::NonFiniteValue { name: name.to_string(), value });
    }
    Ok(())
}

/// Validate box bounds: both endpoints finite and `lower < upper`.
///
/// ## Errors
/// - `CompositionError::InvalidBounds` with the offending endpoints.
pub fn validate_bounds(name: &str, lower: f64, upper: f64) -> CompositionResult<()> {
    if !lower.is_finite() || !upper.is_finite() || lower >= upper {
        return Err(CompositionError::InvalidBounds { name: name.to_string(), lower, upper });
    }
    Ok(())
}

/// Validate that a qualified parameter name exists in the model tree.
///
/// `known` is the set of qualified names collected from the tree leaves.
///
/// ## Errors
/// - `CompositionError::UnknownParameter` if `name` is absent. Declaring a
///   fix, init, bound, or dependency on a parameter that does not exist is
///   a structural error and fails before any optimizer involvement.
pub fn validate_known_parameter(known: &BTreeSet<String>, name: &str) -> CompositionResult<()> {
    if !known.contains(name) {
        return Err(CompositionError::UnknownParameter { name: name.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // `validate_finite_value` accepts finite values and rejects NaN/±∞.
    fn validate_finite_value_accepts_finite_rejects_non_finite() {
        assert!(validate_finite_value("Ball.d", 3.0e-9).is_ok());
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                validate_finite_value("Ball.d", bad),
                Err(CompositionError::NonFiniteValue { .. })
            ));
        }
    }

    #[test]
    // Purpose
    // -------
    // `validate_bounds` requires finite, strictly ordered endpoints.
    fn validate_bounds_requires_ordered_finite_endpoints() {
        assert!(validate_bounds("w", 0.0, 1.0).is_ok());
        assert!(matches!(
            validate_bounds("w", 1.0, 1.0),
            Err(CompositionError::InvalidBounds { .. })
        ));
        assert!(matches!(
            validate_bounds("w", 0.0, f64::INFINITY),
            Err(CompositionError::InvalidBounds { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // `validate_known_parameter` distinguishes present from absent names.
    fn validate_known_parameter_checks_membership() {
        // Arrange
        let known: BTreeSet<String> =
            ["Ball.d".to_string(), "w_ball.w".to_string()].into_iter().collect();

        // Act & Assert
        assert!(validate_known_parameter(&known, "Ball.d").is_ok());
        match validate_known_parameter(&known, "Stick.d") {
            Err(CompositionError::UnknownParameter { name }) => assert_eq!(name, "Stick.d"),
            other => panic!("expected UnknownParameter error, got: {other:?}"),
        }
    }
}
