//! fitting — composite models, data wiring, signal evaluation, and
//! post-processing.
//!
//! Purpose
//! -------
//! Provide the runtime half of the crate: take a resolved model definition
//! from [`composition`](crate::composition) / [`registry`](crate::registry),
//! attach observed data and acquisition settings, and expose the surface an
//! external optimizer drives — forward signal evaluation, per-voxel
//! likelihoods, protocol checking, materialization, smoothing,
//! perturbation, and derived-map computation.
//!
//! Key behaviors
//! -------------
//! - [`composite`] defines [`CompositeModel`] and [`ProblemData`], the
//!   central fitting objects, plus the [`ResultsMap`] dictionary type.
//! - [`signal`] implements the per-compartment signal equations and tree
//!   evaluation; [`evaluation`] the Gaussian likelihood and the
//!   magnitude-noise floor; [`grad_dev`] the HCP-style gradient
//!   nonlinearity correction; [`modifiers`] the derived parameter maps.
//! - [`optimizer`] declares the [`ModelOptimizer`] and [`Smoother`] seams
//!   and the [`fit_model`] entry point; no minimizer ships with the crate.
//! - [`errors`] unifies the layer's failures as [`FittingError`], wrapping
//!   composition and protocol errors.
//!
//! Invariants & assumptions
//! ------------------------
//! - All per-voxel quantities share the crate's column-major ROI voxel
//!   order (see [`utils`](crate::utils)); shapes are validated when data
//!   is attached, so evaluation code may index without re-checking.
//! - Signal evaluation is deterministic; the only randomness lives in
//!   [`CompositeModel::perturbate`], under a caller-supplied generator.
//!
//! Conventions
//! -----------
//! - SI units throughout; signals are non-negative; likelihoods are
//!   natural-log.
//! - No I/O and no logging; callers orchestrate volume loading and
//!   progress reporting.
//!
//! Downstream usage
//! ----------------
//! - Typical flow: `build_model(name)` → `set_problem_data` → optional
//!   `set_gradient_deviations` / noise models → `fit_model(&model, &opt)`
//!   → write out the returned maps. Meta-optimization loops interleave
//!   `smooth` and `perturbate` between passes.
//!
//! Testing notes
//! -------------
//! - Unit tests per submodule cover the signal equations, likelihood
//!   closed forms, gradient-deviation algebra, and modifier expressions;
//!   the integration suite drives a full fit with a mock optimizer.

pub mod composite;
pub mod errors;
pub mod evaluation;
pub mod grad_dev;
pub mod modifiers;
pub mod optimizer;
pub mod signal;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::composite::{CompositeModel, ProblemData, ResultsMap};
pub use self::errors::{FittingError, FittingResult};
pub use self::evaluation::{EvaluationModel, SignalNoiseModel};
pub use self::grad_dev::{apply_gradient_deviation, GradientDeviations};
pub use self::modifiers::{apply_modifiers, ModifierExpr, PostOptimizationModifier};
pub use self::optimizer::{fit_model, ModelOptimizer, Smoother};
pub use self::signal::{
    compartment_signal, evaluate_tree, evaluate_voxel, measurements, spherical_direction,
    Measurement,
};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::composite::{CompositeModel, ProblemData, ResultsMap};
    pub use super::errors::{FittingError, FittingResult};
    pub use super::evaluation::{EvaluationModel, SignalNoiseModel};
    pub use super::grad_dev::GradientDeviations;
    pub use super::modifiers::{ModifierExpr, PostOptimizationModifier};
    pub use super::optimizer::{fit_model, ModelOptimizer, Smoother};
}
