//! The acquisition protocol table: named per-measurement columns.
//!
//! Purpose
//! -------
//! Hold the acquisition settings of a diffusion-weighted measurement
//! series as named columns over a shared row count: scalar columns such as
//! the b-value `b` or the pulse timings `G`, `Delta`, `delta`, and
//! 3-vector columns such as the gradient direction `g`. Models declare
//! which columns they need; the protocol answers `has_column` queries and
//! counts distinct b-value shells.
//!
//! Key behaviors
//! -------------
//! - Built through [`ProtocolBuilder`], which rejects duplicate names,
//!   length mismatches, and non-finite entries at insertion time; a built
//!   [`Protocol`] is immutable and internally consistent.
//! - Shell counting rounds b-values to the nearest [`SHELL_RESOLUTION`]
//!   (10 s/mm²) before deduplication, so acquisition jitter within a shell
//!   does not inflate the count; unweighted (b≈0) rows never count as a
//!   shell.
//! - Without a `b` column [`Protocol::nmr_shells`] returns `None` and the
//!   model-level shell check is skipped — the missing column itself is
//!   already reported separately.
//!
//! Conventions
//! -----------
//! - b-values are in s/m² (SI); 1 s/mm² = 1e6 s/m².
//! - Column names are case-sensitive; the standard names are `g`, `b`,
//!   `G`, `Delta`, `delta`.
use crate::protocol::errors::{ProtocolError, ProtocolResult};
use nalgebra::Vector3;
use ndarray::Array1;
use std::collections::BTreeMap;

/// Width of one b-value shell: b-values are rounded to the nearest
/// multiple of this before shells are counted. 1e7 s/m² = 10 s/mm².
pub const SHELL_RESOLUTION: f64 = 1e7;

/// An immutable acquisition protocol table.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    length: usize,
    scalars: BTreeMap<String, Array1<f64>>,
    vectors: BTreeMap<String, Vec<Vector3<f64>>>,
}

impl Protocol {
    /// Number of measurements (rows).
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether a scalar or vector column with this name exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.scalars.contains_key(name) || self.vectors.contains_key(name)
    }

    /// Scalar column by name.
    pub fn scalar(&self, name: &str) -> Option<&Array1<f64>> {
        self.scalars.get(name)
    }

    /// Vector column by name.
    pub fn vector(&self, name: &str) -> Option<&[Vector3<f64>]> {
        self.vectors.get(name).map(Vec::as_slice)
    }

    /// All column names, sorted.
    pub fn column_names(&self) -> Vec<&str> {
        self.scalars.keys().chain(self.vectors.keys()).map(String::as_str).collect()
    }

    /// Distinct b-value shells after rounding to [`SHELL_RESOLUTION`],
    /// excluding unweighted rows. `None` when the protocol has no `b`
    /// column, in which case the shell demand cannot be assessed.
    pub fn nmr_shells(&self) -> Option<usize> {
        Some(self.shell_b_values()?.len())
    }

    /// The rounded, distinct, ascending non-zero shell b-values.
    pub fn shell_b_values(&self) -> Option<Vec<f64>> {
        let b = self.scalars.get("b")?;
        let mut rounded: Vec<i64> = b
            .iter()
            .map(|v| (v / SHELL_RESOLUTION).round() as i64)
            .filter(|&v| v != 0)
            .collect();
        rounded.sort_unstable();
        rounded.dedup();
        Some(rounded.into_iter().map(|v| v as f64 * SHELL_RESOLUTION).collect())
    }
}

/// Incremental builder for [`Protocol`].
///
/// The first column added establishes the table length; every later column
/// must match it. Entries are checked for finiteness on insertion.
#[derive(Debug, Clone, Default)]
pub struct ProtocolBuilder {
    length: Option<usize>,
    scalars: BTreeMap<String, Array1<f64>>,
    vectors: BTreeMap<String, Vec<Vector3<f64>>>,
}

impl ProtocolBuilder {
    pub fn new() -> ProtocolBuilder {
        ProtocolBuilder::default()
    }

    fn check_length(&mut self, name: &str, actual: usize) -> ProtocolResult<()> {
        match self.length {
            Some(expected) if expected != actual => Err(ProtocolError::ColumnLengthMismatch {
                name: name.to_string(),
                expected,
                actual,
            }),
            Some(_) => Ok(()),
            None => {
                self.length = Some(actual);
                Ok(())
            }
        }
    }

    fn check_name(&self, name: &str) -> ProtocolResult<()> {
        if self.scalars.contains_key(name) || self.vectors.contains_key(name) {
            return Err(ProtocolError::DuplicateColumn { name: name.to_string() });
        }
        Ok(())
    }

    /// Add a scalar column.
    ///
    /// ## Errors
    /// - `DuplicateColumn`, `ColumnLengthMismatch`, or `NonFiniteEntry`.
    pub fn scalar_column(
        mut self, name: &str, values: Array1<f64>,
    ) -> ProtocolResult<ProtocolBuilder> {
        self.check_name(name)?;
        self.check_length(name, values.len())?;
        if let Some(row) = values.iter().position(|v| !v.is_finite()) {
            return Err(ProtocolError::NonFiniteEntry { name: name.to_string(), row });
        }
        self.scalars.insert(name.to_string(), values);
        Ok(self)
    }

    /// Add a 3-vector column (e.g. the gradient direction `g`).
    ///
    /// ## Errors
    /// - `DuplicateColumn`, `ColumnLengthMismatch`, or `NonFiniteEntry`.
    pub fn vector_column(
        mut self, name: &str, values: Vec<Vector3<f64>>,
    ) -> ProtocolResult<ProtocolBuilder> {
        self.check_name(name)?;
        self.check_length(name, values.len())?;
        if let Some(row) = values.iter().position(|v| !(v.x.is_finite() && v.y.is_finite() && v.z.is_finite())) {
            return Err(ProtocolError::NonFiniteEntry { name: name.to_string(), row });
        }
        self.vectors.insert(name.to_string(), values);
        Ok(self)
    }

    /// Finalize the table.
    ///
    /// ## Errors
    /// - `EmptyTable` when no column was added or the columns have zero
    ///   rows.
    pub fn build(self) -> ProtocolResult<Protocol> {
        match self.length {
            Some(length) if length > 0 => Ok(Protocol {
                length,
                scalars: self.scalars,
                vectors: self.vectors,
            }),
            _ => Err(ProtocolError::EmptyTable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn unit_z(n: usize) -> Vec<Vector3<f64>> {
        vec![Vector3::new(0.0, 0.0, 1.0); n]
    }

    #[test]
    // Purpose
    // -------
    // A well-formed table answers length and column queries, and both
    // scalar and vector columns count towards `has_column`.
    fn builder_produces_consistent_table() {
        // Arrange & Act
        let protocol = ProtocolBuilder::new()
            .scalar_column("b", array![0.0, 1e9, 1e9, 2e9]).unwrap()
            .vector_column("g", unit_z(4)).unwrap()
            .build()
            .unwrap();

        // Assert
        assert_eq!(protocol.len(), 4);
        assert!(protocol.has_column("b"));
        assert!(protocol.has_column("g"));
        assert!(!protocol.has_column("Delta"));
        assert_eq!(protocol.column_names(), vec!["b", "g"]);
    }

    #[test]
    // Purpose
    // -------
    // Shell counting rounds within 10 s/mm², never counts b≈0, and
    // reports `None` without a b column.
    //
    // Given
    // -----
    // - b-values 0, 0.995e9, 1.002e9 (same shell after rounding), 2e9.
    //
    // Expect
    // ------
    // - Two shells at 1e9 and 2e9.
    fn shell_counting_rounds_and_skips_unweighted() {
        // Arrange
        let protocol = ProtocolBuilder::new()
            .scalar_column("b", array![0.0, 0.995e9, 1.002e9, 2e9]).unwrap()
            .build()
            .unwrap();

        // Act & Assert
        assert_eq!(protocol.nmr_shells(), Some(2));
        let shells = protocol.shell_b_values().unwrap();
        assert_eq!(shells.len(), 2);
        assert!((shells[0] - 1.0e9).abs() < SHELL_RESOLUTION);
        assert!((shells[1] - 2.0e9).abs() < SHELL_RESOLUTION);

        // Arrange a b-less protocol.
        let no_b = ProtocolBuilder::new()
            .vector_column("g", unit_z(3)).unwrap()
            .build()
            .unwrap();

        // Assert
        assert_eq!(no_b.nmr_shells(), None);
    }

    #[test]
    // Purpose
    // -------
    // The builder rejects duplicates, length mismatches, non-finite
    // entries, and empty tables.
    fn builder_rejects_malformed_input() {
        assert!(matches!(
            ProtocolBuilder::new()
                .scalar_column("b", array![1e9]).unwrap()
                .scalar_column("b", array![1e9]),
            Err(ProtocolError::DuplicateColumn { .. })
        ));
        assert!(matches!(
            ProtocolBuilder::new()
                .scalar_column("b", array![1e9, 2e9]).unwrap()
                .vector_column("g", unit_z(3)),
            Err(ProtocolError::ColumnLengthMismatch { .. })
        ));
        assert!(matches!(
            ProtocolBuilder::new().scalar_column("b", array![f64::NAN]),
            Err(ProtocolError::NonFiniteEntry { row: 0, .. })
        ));
        assert!(matches!(
            ProtocolBuilder::new().build(),
            Err(ProtocolError::EmptyTable)
        ));
    }
}
