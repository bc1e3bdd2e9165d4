//! rust_dmri — compositional diffusion-MRI models with Python bindings.
//!
//! Purpose
//! -------
//! Serve as the crate root for Rust callers and as the PyO3 bridge that
//! exposes the model-composition and protocol-validation surface to Python
//! via the `_rust_dmri` extension module. Composite diffusion models are
//! assembled from compartment primitives through string expressions,
//! resolved into free/fixed/dependent parameterizations, checked against
//! acquisition protocols, and driven by external optimizers.
//!
//! Key behaviors
//! -------------
//! - Re-export the core Rust modules (`composition`, `protocol`, `fitting`,
//!   `registry`, `utils`) as the public crate surface.
//! - Define `#[pyclass]` wrappers and the `#[pymodule]` initializer for the
//!   `_rust_dmri` Python extension.
//! - Create and register the `models` Python submodule under `rust_dmri`
//!   so that dot-notation imports work as expected.
//!
//! Invariants & assumptions
//! ------------------------
//! - All numerical work is implemented in the inner Rust modules; this file
//!   performs only FFI glue, input validation, and error mapping.
//! - When `python-bindings` is enabled, the Python-visible types mirror the
//!   invariants of their Rust counterparts (`CompositeModel`, `Protocol`).
//!
//! Conventions
//! -----------
//! - Python-exposed classes live under `_rust_dmri.models` and are
//!   typically wrapped by thin pure-Python facades in the top-level
//!   `rust_dmri` package.
//! - Errors from core Rust code are propagated as rich error types
//!   internally and converted to `PyErr` values at the PyO3 boundary.
//!
//! Downstream usage
//! ----------------
//! - Native Rust code should depend directly on the inner modules and can
//!   ignore the PyO3 items guarded by the `python-bindings` feature.
//! - The Python packaging layer imports the `_rust_dmri` module defined
//!   here and wraps its classes in user-facing Python APIs.
//!
//! Testing notes
//! -------------
//! - Core behavior is covered by unit tests in the inner modules and by the
//!   integration suite under `tests/`; binding smoke tests live on the
//!   Python side.

pub mod composition;
pub mod fitting;
pub mod protocol;
pub mod registry;
pub mod utils;

#[cfg(feature = "python-bindings")]
use ndarray::Array1;

#[cfg(feature = "python-bindings")]
use nalgebra::Vector3;

#[cfg(feature = "python-bindings")]
use pyo3::prelude::*;

#[cfg(feature = "python-bindings")]
use crate::{
    fitting::composite::{CompositeModel, ResultsMap},
    protocol::table::{Protocol, ProtocolBuilder},
    registry::models::{build_model, model_registry},
};

/// DMRIProtocol — Python-facing acquisition protocol table.
///
/// Purpose
/// -------
/// Hold an immutable protocol assembled from scalar and 3-vector columns
/// and expose the queries the Python layer needs: length, column names,
/// and the rounded shell count.
///
/// Parameters
/// ----------
/// Constructed from Python via `DMRIProtocol(scalars, vectors=None)`:
/// - `scalars`: list of `(name, values)` pairs, one `f64` per measurement.
/// - `vectors`: optional list of `(name, values)` pairs with one
///   `(x, y, z)` triple per measurement.
///
/// Notes
/// -----
/// - Column validation (duplicates, lengths, finiteness) happens at
///   construction and raises `ValueError`.
/// - Rust callers should use [`Protocol`] directly.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_dmri.models")]
pub struct DMRIProtocol {
    pub inner: Protocol,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl DMRIProtocol {
    #[new]
    #[pyo3(signature = (scalars, vectors=None))]
    pub fn new(
        scalars: Vec<(String, Vec<f64>)>,
        vectors: Option<Vec<(String, Vec<(f64, f64, f64)>)>>,
    ) -> PyResult<Self> {
        let mut builder = ProtocolBuilder::new();
        for (name, values) in scalars {
            builder = builder.scalar_column(&name, Array1::from_vec(values))?;
        }
        for (name, values) in vectors.unwrap_or_default() {
            let column = values.into_iter().map(|(x, y, z)| Vector3::new(x, y, z)).collect();
            builder = builder.vector_column(&name, column)?;
        }
        Ok(DMRIProtocol { inner: builder.build()? })
    }

    /// Number of measurements.
    #[getter]
    pub fn length(&self) -> usize {
        self.inner.len()
    }

    #[getter]
    pub fn column_names(&self) -> Vec<String> {
        self.inner.column_names().into_iter().map(str::to_string).collect()
    }

    /// Distinct b-value shells, or `None` without a b column.
    #[getter]
    pub fn nmr_shells(&self) -> Option<usize> {
        self.inner.nmr_shells()
    }
}

/// DMRIModel — Python-facing composite model built from the registry.
///
/// Purpose
/// -------
/// Expose a built [`CompositeModel`] to Python for introspection and
/// protocol validation: the parameter partition, acquisition demands, and
/// the collected protocol problems for a given [`DMRIProtocol`].
///
/// Parameters
/// ----------
/// Constructed from Python via `DMRIModel(name)` with a registry name such
/// as `"BallStick_r1"` or `"NODDI"`; unknown names raise `ValueError`.
///
/// Notes
/// -----
/// - Fitting itself is driven from the Rust side; this wrapper covers the
///   build-and-validate workflow used by pipeline front-ends.
#[cfg(feature = "python-bindings")]
#[pyclass(module = "rust_dmri.models")]
pub struct DMRIModel {
    pub inner: CompositeModel,
}

#[cfg(feature = "python-bindings")]
#[pymethods]
impl DMRIModel {
    #[new]
    pub fn new(name: &str) -> PyResult<Self> {
        Ok(DMRIModel { inner: build_model(name)? })
    }

    #[getter]
    pub fn name(&self) -> String {
        self.inner.name().to_string()
    }

    #[getter]
    pub fn description(&self) -> String {
        self.inner.description().to_string()
    }

    /// Free-parameter names in optimizer-vector order.
    #[getter]
    pub fn free_parameter_names(&self) -> Vec<String> {
        self.inner.free_parameter_names().into_iter().map(str::to_string).collect()
    }

    /// Fixed parameters as `(name, value)` pairs, including folded
    /// dependencies.
    #[getter]
    pub fn fixed_parameters(&self) -> Vec<(String, f64)> {
        self.inner.parameters().fixes.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    #[getter]
    pub fn required_protocol_columns(&self) -> Vec<String> {
        self.inner.required_protocol_columns().into_iter().map(str::to_string).collect()
    }

    #[getter]
    pub fn required_nmr_shells(&self) -> usize {
        self.inner.required_nmr_shells()
    }

    /// Expand optimized free-parameter maps into the completed results:
    /// fixes broadcast, dependencies evaluated, derived maps appended.
    /// Maps are exchanged as `(name, per-voxel values)` pairs.
    pub fn complete_results(
        &self, optimized: Vec<(String, Vec<f64>)>,
    ) -> PyResult<Vec<(String, Vec<f64>)>> {
        let maps: ResultsMap = optimized
            .into_iter()
            .map(|(name, values)| (name, Array1::from_vec(values)))
            .collect();
        let completed = self.inner.complete_results(&maps)?;
        Ok(completed.into_iter().map(|(name, map)| (name, map.to_vec())).collect())
    }

    /// Human-readable protocol problems, empty when sufficient.
    pub fn protocol_problems(&self, protocol: &DMRIProtocol) -> Vec<String> {
        self.inner
            .get_protocol_problems(&protocol.inner)
            .into_iter()
            .map(|p| p.to_string())
            .collect()
    }

    pub fn is_protocol_sufficient(&self, protocol: &DMRIProtocol) -> bool {
        self.inner.is_protocol_sufficient(&protocol.inner)
    }
}

/// Registered composite-model names, sorted.
#[cfg(feature = "python-bindings")]
#[pyfunction]
pub fn available_models() -> Vec<String> {
    model_registry().names().into_iter().map(str::to_string).collect()
}

/// _rust_dmri — PyO3 module initializer for the Python extension.
///
/// Creates the `models` submodule, attaches it to the parent module, and
/// registers it in `sys.modules` so it is importable via dotted paths.
/// Invoked automatically by Python when importing the compiled extension.
#[cfg(feature = "python-bindings")]
#[pymodule]
fn _rust_dmri<'py>(_py: Python<'py>, m: &Bound<'py, PyModule>) -> PyResult<()> {
    let models_mod = PyModule::new(_py, "models")?;
    models(_py, m, &models_mod)?;

    // Manually add the submodule into sys.modules to allow dot notation.
    _py.import("sys")?
        .getattr("modules")?
        .set_item("rust_dmri.models", models_mod)?;
    Ok(())
}

#[cfg(feature = "python-bindings")]
fn models<'py>(
    _py: Python, rust_dmri: &Bound<'py, PyModule>, m: &Bound<'py, PyModule>,
) -> PyResult<()> {
    m.add_class::<DMRIModel>()?;
    m.add_class::<DMRIProtocol>()?;
    m.add_function(wrap_pyfunction!(available_models, m)?)?;
    rust_dmri.add_submodule(m)?;
    Ok(())
}
