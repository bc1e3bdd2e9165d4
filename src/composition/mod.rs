//! composition — model composition: expressions, compartments, parameters,
//! dependencies, and their errors.
//!
//! Purpose
//! -------
//! Provide the structural half of the crate: everything needed to go from
//! a compositional model expression plus declarative parameter settings to
//! a fully resolved parameterization, before any data or optimizer is
//! involved. The fitting stack ([`fitting`](crate::fitting)) consumes the
//! types defined here.
//!
//! Key behaviors
//! -------------
//! - Bundle the structural core in [`core`]: parameters, compartments, the
//!   expression parser, and the dependency resolver.
//! - Centralize composition-specific error types in [`errors`]
//!   ([`ExprError`], [`CompositionError`] and their result aliases) so all
//!   build-time failures share one surface.
//! - Re-export the everyday types directly and via [`prelude`].
//!
//! Invariants & assumptions
//! ------------------------
//! - Composition is deterministic: the same expression and settings always
//!   produce the same tree, the same free-vector order, and the same
//!   dependency evaluation order.
//! - All structural validation happens here, at build time; the fitting
//!   layer may assume resolved models are internally consistent.
//!
//! Conventions
//! -----------
//! - Qualified parameter names are `"<instance>.<parameter>"`.
//! - No I/O and no logging; failures are `CompositionResult` values and,
//!   at the Python boundary, `ValueError`s.
//!
//! Downstream usage
//! ----------------
//! - Most callers go through the registry
//!   ([`build_model`](crate::registry::build_model)) rather than composing
//!   by hand; direct composition is useful for custom models and tests.
//!
//! Testing notes
//! -------------
//! - Submodule unit tests cover the full build-time error surface; the
//!   integration suite exercises composition end-to-end through the
//!   registry and fitting layers.

pub mod core;
pub mod errors;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::core::{
    Compartment, CompartmentKind, DependencyRule, FreeParameter, ModelTree, Parameter,
    ParameterDependency, ParameterSettings, Perturbation, ResolvedParameters, TreeOp,
    parse_expression, resolve_parameters,
};

pub use self::errors::{CompositionError, CompositionResult, ExprError, ExprResult};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::core::prelude::*;
    pub use super::errors::{CompositionError, CompositionResult, ExprError, ExprResult};
}
