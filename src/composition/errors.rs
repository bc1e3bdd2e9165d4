//! Errors for model composition (expression parsing, registry resolution,
//! and parameter dependency analysis).
//!
//! This module defines a syntax error type, [`ExprError`], raised while
//! tokenizing/parsing a compositional model expression, and a structural
//! error type, [`CompositionError`], raised while resolving compartment
//! references and parameter dependencies. Both implement `Display`/`Error`
//! and, when the `python-bindings` feature is enabled, convert to `PyErr`.
//!
//! ## Conventions
//! - Parameter names are **qualified** as `"<instance>.<parameter>"`
//!   (e.g. `Ball.d`, `Stick0.d`, `w_ic.w`).
//! - Structural errors fail fast at model-build time, before any optimizer
//!   is involved; there is no partial recovery from an unknown name or a
//!   dependency cycle.
//! - Character positions in [`ExprError`] are 0-based byte offsets into the
//!   expression string.

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, PyErr};

/// Result alias for expression tokenizing/parsing paths.
pub type ExprResult<T> = Result<T, ExprError>;

/// Crate-wide result alias for composition operations that may produce
/// [`CompositionError`].
pub type CompositionResult<T> = Result<T, CompositionError>;

/// Syntax errors raised while parsing a compositional model expression.
///
/// Covers tokenizer failures (unexpected characters) and parser failures
/// (misplaced operators, unbalanced parentheses, trailing garbage). The
/// expression grammar itself is documented in
/// [`core::expression`](crate::composition::core::expression).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// The expression contains no operands at all.
    Empty,

    /// A character that is not part of the grammar was encountered.
    UnexpectedCharacter { position: usize, character: char },

    /// A token appeared where the grammar does not allow it.
    UnexpectedToken { position: usize, found: String },

    /// The expression ended while an operand or closing parenthesis was
    /// still expected.
    UnexpectedEnd,

    /// A closing parenthesis without a matching opening one.
    UnbalancedParenthesis { position: usize },

    /// Input remained after a complete expression was parsed.
    TrailingInput { position: usize, found: String },
}

impl std::error::Error for ExprError {}

impl std::fmt::Display for ExprError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExprError::Empty => {
                write!(f, "Model expression is empty.")
            }
            ExprError::UnexpectedCharacter { position, character } => {
                write!(f, "Unexpected character {character:?} at position {position}.")
            }
            ExprError::UnexpectedToken { position, found } => {
                write!(f, "Unexpected token {found:?} at position {position}.")
            }
            ExprError::UnexpectedEnd => {
                write!(f, "Model expression ended unexpectedly.")
            }
            ExprError::UnbalancedParenthesis { position } => {
                write!(f, "Unbalanced parenthesis at position {position}.")
            }
            ExprError::TrailingInput { position, found } => {
                write!(f, "Trailing input {found:?} at position {position} after a complete expression.")
            }
        }
    }
}

/// Unified error type for model composition.
///
/// Covers unresolved registry references, malformed parameter settings, and
/// dependency-graph failures detected by the resolver. Syntax errors from
/// the expression parser are wrapped via [`CompositionError::Syntax`].
#[derive(Debug, Clone, PartialEq)]
pub enum CompositionError {
    // ---- Registry resolution ----
    /// A model expression or configuration references a compartment name
    /// that is not present in the compartment registry.
    UnknownCompartment { name: String },

    /// A configuration table references a composite-model name that is not
    /// present in the model registry.
    UnknownModel { name: String },

    // ---- Parameter settings ----
    /// A fix, init, bound, or dependency references a qualified parameter
    /// name that does not exist in the model tree.
    UnknownParameter { name: String },

    /// A fix or init value is NaN or infinite.
    NonFiniteValue { name: String, value: f64 },

    /// Parameter bounds with `lower >= upper` or non-finite endpoints.
    InvalidBounds { name: String, lower: f64, upper: f64 },

    /// A perturbation standard deviation that is NaN, infinite, or <= 0.
    InvalidPerturbation { name: String, std: f64 },

    // ---- Dependency analysis ----
    /// Two dependencies were declared for the same target parameter.
    DuplicateDependency { target: String },

    /// The dependency graph contains a cycle; no evaluation order exists.
    /// `members` lists the qualified parameter names participating in the
    /// cycle, in sorted order.
    CircularDependency { members: Vec<String> },

    // ---- Expression syntax ----
    /// The model expression failed to parse.
    Syntax(ExprError),
}

impl std::error::Error for CompositionError {}

impl std::fmt::Display for CompositionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // ---- Registry resolution ----
            CompositionError::UnknownCompartment { name } => {
                write!(f, "Unknown compartment {name:?}; not present in the compartment registry.")
            }
            CompositionError::UnknownModel { name } => {
                write!(f, "Unknown composite model {name:?}; not present in the model registry.")
            }
            // ---- Parameter settings ----
            CompositionError::UnknownParameter { name } => {
                write!(f, "Unknown parameter {name:?}; not present in the model tree.")
            }
            CompositionError::NonFiniteValue { name, value } => {
                write!(f, "Value for parameter {name:?} must be finite; got: {value}")
            }
            CompositionError::InvalidBounds { name, lower, upper } => {
                write!(
                    f,
                    "Bounds for parameter {name:?} must be finite with lower < upper; got: [{lower}, {upper}]"
                )
            }
            CompositionError::InvalidPerturbation { name, std } => {
                write!(
                    f,
                    "Perturbation std for parameter {name:?} must be finite and > 0; got: {std}"
                )
            }
            // ---- Dependency analysis ----
            CompositionError::DuplicateDependency { target } => {
                write!(f, "More than one dependency declared for target parameter {target:?}.")
            }
            CompositionError::CircularDependency { members } => {
                write!(f, "Circular parameter dependency involving: {}", members.join(", "))
            }
            // ---- Expression syntax ----
            CompositionError::Syntax(err) => {
                write!(f, "Invalid model expression: {err}")
            }
        }
    }
}

impl From<ExprError> for CompositionError {
    fn from(err: ExprError) -> CompositionError {
        CompositionError::Syntax(err)
    }
}

/// Convert a [`CompositionError`] into a Python `ValueError` with the error
/// message. Used at the Rust↔Python boundary to surface build-time errors.
#[cfg(feature = "python-bindings")]
impl From<CompositionError> for PyErr {
    fn from(err: CompositionError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // `ExprError` wraps into `CompositionError::Syntax` via `From` and keeps
    // its message visible through `Display`.
    fn expr_error_wraps_into_composition_error() {
        // Arrange
        let err = ExprError::UnbalancedParenthesis { position: 7 };

        // Act
        let wrapped = CompositionError::from(err.clone());

        // Assert
        assert_eq!(wrapped, CompositionError::Syntax(err));
        assert!(wrapped.to_string().contains("position 7"));
    }

    #[test]
    // Purpose
    // -------
    // `CircularDependency` lists every cycle member in its message so a user
    // can see the full offending group at once.
    fn circular_dependency_display_lists_all_members() {
        // Arrange
        let err = CompositionError::CircularDependency {
            members: vec!["A.x".to_string(), "B.y".to_string()],
        };

        // Act
        let msg = err.to_string();

        // Assert
        assert!(msg.contains("A.x"));
        assert!(msg.contains("B.y"));
    }
}
