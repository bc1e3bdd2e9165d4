//! Errors for acquisition-protocol construction and lookup.
//!
//! Construction failures are structural: mismatched column lengths,
//! duplicate names, or non-finite entries. Once a [`Protocol`]
//! (see [`table`](super::table)) is built, reads never fail — missing
//! columns are reported as advisory problems by the model-level protocol
//! check, not as errors here.

#[cfg(feature = "python-bindings")]
use pyo3::{exceptions::PyValueError, PyErr};

/// Result alias for protocol construction.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Structural failures while assembling an acquisition protocol table.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// A protocol with no columns or zero rows.
    EmptyTable,

    /// The same column name was added twice.
    DuplicateColumn { name: String },

    /// A column whose length differs from the established table length.
    ColumnLengthMismatch { name: String, expected: usize, actual: usize },

    /// A column entry that is NaN or infinite.
    NonFiniteEntry { name: String, row: usize },
}

impl std::error::Error for ProtocolError {}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::EmptyTable => {
                write!(f, "Protocol table has no columns or no rows.")
            }
            ProtocolError::DuplicateColumn { name } => {
                write!(f, "Protocol column {name:?} was added more than once.")
            }
            ProtocolError::ColumnLengthMismatch { name, expected, actual } => {
                write!(
                    f,
                    "Protocol column {name:?} has {actual} rows; expected {expected} to match the table."
                )
            }
            ProtocolError::NonFiniteEntry { name, row } => {
                write!(f, "Protocol column {name:?} has a non-finite entry at row {row}.")
            }
        }
    }
}

/// Convert a [`ProtocolError`] into a Python `ValueError` with the error
/// message.
#[cfg(feature = "python-bindings")]
impl From<ProtocolError> for PyErr {
    fn from(err: ProtocolError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}
