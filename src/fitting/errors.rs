//! Errors for the fitting layer: problem data wiring, materialization,
//! signal evaluation, and optimization.
//!
//! Build-time composition errors and protocol construction errors convert
//! into [`FittingError`] via `From`, so fitting entry points expose a
//! single error surface. Advisory protocol problems become an error only
//! at the moment a fit is actually attempted against an insufficient
//! protocol.
use crate::{
    composition::errors::CompositionError,
    protocol::{errors::ProtocolError, problems::ProtocolProblem},
};

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, PyErr};

/// Result alias for fitting operations.
pub type FittingResult<T> = Result<T, FittingError>;

/// Unified error type for the fitting layer.
#[derive(Debug, Clone, PartialEq)]
pub enum FittingError {
    // ---- Problem data wiring ----
    /// An operation that needs problem data was called before any was set.
    NoProblemData,

    /// Signal matrix shape inconsistent with the mask or protocol.
    SignalShapeMismatch { expected_voxels: usize, expected_measurements: usize, actual: (usize, usize) },

    /// Gradient-deviation rows do not match the ROI voxel count, or a row
    /// does not carry 9 tensor components.
    GradDevShapeMismatch { expected: (usize, usize), actual: (usize, usize) },

    /// A volume passed for ROI extraction or restoration has a different
    /// spatial shape than the mask.
    VolumeShapeMismatch { expected: (usize, usize, usize), actual: (usize, usize, usize) },

    /// A flat ROI vector whose length differs from the mask's voxel count.
    RoiLengthMismatch { expected: usize, actual: usize },

    // ---- Materialization and modifiers ----
    /// A required per-voxel map is absent from a results dictionary.
    MissingResultMap { name: String },

    /// Two maps in one results dictionary disagree on voxel count.
    ResultLengthMismatch { name: String, expected: usize, actual: usize },

    // ---- Signal evaluation ----
    /// A compartment needs a protocol column the table does not carry.
    /// Normally prevented by the protocol check before fitting.
    MissingProtocolColumn { name: String },

    // ---- Evaluation model ----
    /// A noise standard deviation that is not finite and positive.
    InvalidSigma { value: f64 },

    // ---- Optimization ----
    /// The protocol check failed at fit time; all collected problems are
    /// carried.
    InsufficientProtocol { problems: Vec<ProtocolProblem> },

    /// The optimizer reported a failure.
    OptimizationFailed { status: String },

    // ---- Wrapped lower layers ----
    /// Structural model-composition failure.
    Composition(CompositionError),

    /// Protocol construction failure.
    Protocol(ProtocolError),
}

impl std::error::Error for FittingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FittingError::Composition(err) => Some(err),
            FittingError::Protocol(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for FittingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FittingError::NoProblemData => {
                write!(f, "No problem data set; attach mask, signal, and protocol first.")
            }
            FittingError::SignalShapeMismatch { expected_voxels, expected_measurements, actual } => {
                write!(
                    f,
                    "Signal matrix is {actual:?}; expected ({expected_voxels} ROI voxels, {expected_measurements} measurements)."
                )
            }
            FittingError::GradDevShapeMismatch { expected, actual } => {
                write!(
                    f,
                    "Gradient deviations are {actual:?}; expected {expected:?} (ROI voxels x 9 components)."
                )
            }
            FittingError::VolumeShapeMismatch { expected, actual } => {
                write!(f, "Volume shape {actual:?} does not match the mask shape {expected:?}.")
            }
            FittingError::RoiLengthMismatch { expected, actual } => {
                write!(f, "ROI vector has {actual} entries; the mask selects {expected} voxels.")
            }
            FittingError::MissingResultMap { name } => {
                write!(f, "Results dictionary is missing the map {name:?}.")
            }
            FittingError::ResultLengthMismatch { name, expected, actual } => {
                write!(
                    f,
                    "Map {name:?} has {actual} voxels; expected {expected} to match the dictionary."
                )
            }
            FittingError::MissingProtocolColumn { name } => {
                write!(f, "Protocol column {name:?} is required for signal evaluation but absent.")
            }
            FittingError::InvalidSigma { value } => {
                write!(f, "Noise standard deviation must be finite and > 0; got: {value}")
            }
            FittingError::InsufficientProtocol { problems } => {
                write!(f, "Protocol insufficient for this model: ")?;
                for (i, problem) in problems.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{problem}")?;
                }
                Ok(())
            }
            FittingError::OptimizationFailed { status } => {
                write!(f, "Optimization failed: {status}")
            }
            FittingError::Composition(err) => write!(f, "{err}"),
            FittingError::Protocol(err) => write!(f, "{err}"),
        }
    }
}

impl From<CompositionError> for FittingError {
    fn from(err: CompositionError) -> FittingError {
        FittingError::Composition(err)
    }
}

impl From<ProtocolError> for FittingError {
    fn from(err: ProtocolError) -> FittingError {
        FittingError::Protocol(err)
    }
}

/// Convert a [`FittingError`] into a Python `ValueError` with the error
/// message.
#[cfg(feature = "python-bindings")]
impl From<FittingError> for PyErr {
    fn from(err: FittingError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // `InsufficientProtocol` joins all collected problems in one message.
    fn insufficient_protocol_lists_every_problem() {
        // Arrange
        let err = FittingError::InsufficientProtocol {
            problems: vec![
                ProtocolProblem::MissingColumns { names: vec!["G".to_string()] },
                ProtocolProblem::InsufficientShells { required: 2, actual: 1 },
            ],
        };

        // Act
        let msg = err.to_string();

        // Assert
        assert!(msg.contains("Missing columns: G"));
        assert!(msg.contains("shells is 2"));
    }

    #[test]
    // Purpose
    // -------
    // Lower-layer errors wrap via `From` and surface through `source`.
    fn lower_layer_errors_wrap() {
        // Arrange
        let composition = CompositionError::UnknownModel { name: "X".to_string() };

        // Act
        let wrapped = FittingError::from(composition.clone());

        // Assert
        assert_eq!(wrapped, FittingError::Composition(composition));
        assert!(std::error::Error::source(&wrapped).is_some());
    }
}
