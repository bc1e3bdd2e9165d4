//! Optimizer and smoother seams, and the top-level fit entry point.
//!
//! The crate computes forward signals and likelihoods but does not ship a
//! minimizer: optimization backends implement [`ModelOptimizer`] against
//! the composite model's evaluation surface, and spatial filters used
//! during meta-optimization implement [`Smoother`]. [`fit_model`] wires
//! the pieces together: protocol check, optimization, result completion.
use crate::fitting::{
    composite::{CompositeModel, ResultsMap},
    errors::{FittingError, FittingResult},
};
use ndarray::Array3;
use std::collections::BTreeMap;

/// An optimization backend producing per-voxel free-parameter maps.
///
/// Implementations read the model's free-parameter vector definition
/// (names, inits, bounds) and its evaluation surface
/// (`evaluate_signal` / `voxel_log_likelihoods`), and return one map per
/// free parameter, each with one entry per ROI voxel.
pub trait ModelOptimizer {
    fn optimize(&self, model: &CompositeModel) -> FittingResult<ResultsMap>;
}

/// A spatial filter applied to parameter volumes between optimization
/// passes. Receives the selected maps restored to volume form plus the
/// mask; returns the filtered volumes under the same names.
pub trait Smoother {
    fn filter(
        &self, volumes: BTreeMap<String, Array3<f64>>, mask: &Array3<bool>,
    ) -> BTreeMap<String, Array3<f64>>;
}

/// Fit a model end to end: verify the attached protocol satisfies the
/// model's demands, run the optimizer, and complete the results with
/// fixed maps, dependent maps, and derived maps.
///
/// ## Errors
/// - `NoProblemData` when the model carries no data.
/// - `InsufficientProtocol` carrying every collected problem when the
///   protocol check fails.
/// - Any optimizer or completion error.
pub fn fit_model(
    model: &CompositeModel, optimizer: &dyn ModelOptimizer,
) -> FittingResult<ResultsMap> {
    let data = model.problem_data().ok_or(FittingError::NoProblemData)?;
    let problems = model.get_protocol_problems(data.protocol());
    if !problems.is_empty() {
        return Err(FittingError::InsufficientProtocol { problems });
    }
    let optimized = optimizer.optimize(model)?;
    model.complete_results(&optimized)
}
