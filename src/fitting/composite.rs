//! The composite model: a resolved model tree wired to data, noise models,
//! and post-processing.
//!
//! Purpose
//! -------
//! [`CompositeModel`] is the central object of the fitting layer. It owns
//! the parsed tree and resolved parameterization of one model definition,
//! optionally carries problem data (mask, signal, protocol) and per-voxel
//! gradient deviations, and provides every operation an external optimizer
//! or pipeline needs: protocol checking, forward signal evaluation,
//! per-voxel likelihoods, materialization of full parameter sets,
//! smoothing, perturbation for randomized restarts, and result completion
//! with derived maps.
//!
//! Key behaviors
//! -------------
//! - Construction from a [`ModelConfig`] parses the expression and
//!   resolves all parameter settings; every structural failure surfaces
//!   here, before data is attached.
//! - Results dictionaries ([`ResultsMap`]) map qualified parameter names
//!   to flat per-voxel arrays in the crate's column-major voxel order.
//! - Gradient deviations are applied per voxel during signal evaluation,
//!   and only when the model actually reads both the direction and the
//!   b-value.
//!
//! Conventions
//! -----------
//! - The signal matrix is `(ROI voxels, measurements)` and must agree with
//!   the mask and the protocol at attachment time.
//! - No I/O and no logging; volume loading and map writing live with the
//!   caller.
use crate::{
    composition::{
        core::{
            dependencies::{resolve_parameters, ResolvedParameters},
            expression::{parse_expression, ModelTree},
        },
        errors::CompositionResult,
    },
    fitting::{
        errors::{FittingError, FittingResult},
        evaluation::{EvaluationModel, SignalNoiseModel},
        grad_dev::{apply_gradient_deviation, GradientDeviations},
        modifiers::{apply_modifiers, PostOptimizationModifier},
        optimizer::Smoother,
        signal::{evaluate_voxel, measurements, Measurement},
    },
    protocol::{problems::ProtocolProblem, table::Protocol},
    registry::{compartments::CompartmentRegistry, models::ModelConfig},
    utils::{create_roi, create_roi_series, restore_volume},
};
use ndarray::{Array1, Array2, Array3, Array4};
use rand::Rng;
use std::collections::BTreeMap;

/// Per-voxel result maps, keyed by qualified parameter or map name.
pub type ResultsMap = BTreeMap<String, Array1<f64>>;

/// The observation side of a fit: mask, flattened signal, and protocol.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemData {
    mask: Array3<bool>,
    signal: Array2<f64>,
    protocol: Protocol,
}

impl ProblemData {
    /// Wrap a pre-flattened signal matrix `(ROI voxels, measurements)`.
    ///
    /// ## Errors
    /// - `SignalShapeMismatch` when the matrix disagrees with the mask's
    ///   voxel count or the protocol's row count.
    pub fn new(
        mask: Array3<bool>, signal: Array2<f64>, protocol: Protocol,
    ) -> FittingResult<ProblemData> {
        let voxels = mask.iter().filter(|&&m| m).count();
        if signal.dim() != (voxels, protocol.len()) {
            return Err(FittingError::SignalShapeMismatch {
                expected_voxels: voxels,
                expected_measurements: protocol.len(),
                actual: signal.dim(),
            });
        }
        Ok(ProblemData { mask, signal, protocol })
    }

    /// Flatten a 4-D signal volume `(x, y, z, measurements)` against the
    /// mask and wrap it.
    pub fn from_volume(
        volume: &Array4<f64>, mask: Array3<bool>, protocol: Protocol,
    ) -> FittingResult<ProblemData> {
        let signal = create_roi_series(volume, &mask)?;
        ProblemData::new(mask, signal, protocol)
    }

    pub fn mask(&self) -> &Array3<bool> {
        &self.mask
    }

    pub fn signal(&self) -> &Array2<f64> {
        &self.signal
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Number of ROI voxels (signal rows).
    pub fn voxel_count(&self) -> usize {
        self.signal.nrows()
    }
}

/// A composed diffusion model ready for fitting.
#[derive(Debug, Clone)]
pub struct CompositeModel {
    name: String,
    description: String,
    tree: ModelTree,
    parameters: ResolvedParameters,
    evaluation_model: EvaluationModel,
    signal_noise_model: SignalNoiseModel,
    modifiers: Vec<PostOptimizationModifier>,
    required_nmr_shells: usize,
    smooth_white_list: Option<Vec<String>>,
    smooth_black_list: Option<Vec<String>>,
    problem_data: Option<ProblemData>,
    gradient_deviations: Option<Array2<f64>>,
}

impl CompositeModel {
    /// Build a model from a declarative config against a compartment
    /// catalog. All structural validation happens here.
    pub fn from_config(
        config: &ModelConfig, compartments: &CompartmentRegistry,
    ) -> CompositionResult<CompositeModel> {
        let tree = parse_expression(&config.expression, compartments)?;
        let parameters = resolve_parameters(&tree, &config.settings)?;
        Ok(CompositeModel {
            name: config.name.clone(),
            description: config.description.clone(),
            tree,
            parameters,
            evaluation_model: EvaluationModel::Gaussian { sigma: 1.0 },
            signal_noise_model: SignalNoiseModel::None,
            modifiers: config.modifiers.clone(),
            required_nmr_shells: config.required_nmr_shells,
            smooth_white_list: None,
            smooth_black_list: None,
            problem_data: None,
            gradient_deviations: None,
        })
    }

    // ---- Accessors ---------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The parsed model tree this model computes.
    pub fn model_tree(&self) -> &ModelTree {
        &self.tree
    }

    /// The free/fixed/dependent parameter partition.
    pub fn parameters(&self) -> &ResolvedParameters {
        &self.parameters
    }

    /// Qualified names of the optimizer-facing free parameters, in vector
    /// order.
    pub fn free_parameter_names(&self) -> Vec<&str> {
        self.parameters.free_names()
    }

    pub fn evaluation_model(&self) -> &EvaluationModel {
        &self.evaluation_model
    }

    pub fn problem_data(&self) -> Option<&ProblemData> {
        self.problem_data.as_ref()
    }

    pub fn required_nmr_shells(&self) -> usize {
        self.required_nmr_shells
    }

    // ---- Configuration -----------------------------------------------------

    pub fn set_evaluation_model(&mut self, model: EvaluationModel) {
        self.evaluation_model = model;
    }

    pub fn set_signal_noise_model(&mut self, model: SignalNoiseModel) {
        self.signal_noise_model = model;
    }

    /// Set the smoothing white/black lists. A set white list wins: only
    /// listed maps are smoothed and the black list is ignored. With only a
    /// black list set, everything but its entries is smoothed.
    pub fn set_smooth_lists(
        &mut self, white_list: Option<Vec<String>>, black_list: Option<Vec<String>>,
    ) {
        self.smooth_white_list = white_list;
        self.smooth_black_list = black_list;
    }

    /// Attach problem data.
    ///
    /// ## Errors
    /// - `GradDevShapeMismatch` when gradient deviations are already
    ///   attached and disagree with the new voxel count.
    pub fn set_problem_data(&mut self, data: ProblemData) -> FittingResult<()> {
        if let Some(dev) = &self.gradient_deviations {
            if dev.nrows() != data.voxel_count() {
                return Err(FittingError::GradDevShapeMismatch {
                    expected: (data.voxel_count(), 9),
                    actual: dev.dim(),
                });
            }
        }
        self.problem_data = Some(data);
        Ok(())
    }

    /// Attach gradient deviations; a 4-D volume is flattened against the
    /// problem-data mask. Requires problem data.
    ///
    /// ## Errors
    /// - `NoProblemData` without attached problem data.
    /// - `GradDevShapeMismatch` when the flat matrix is not
    ///   `(ROI voxels, 9)`.
    pub fn set_gradient_deviations(&mut self, dev: GradientDeviations) -> FittingResult<()> {
        let data = self.problem_data.as_ref().ok_or(FittingError::NoProblemData)?;
        let flat = match dev {
            GradientDeviations::Volume(volume) => create_roi_series(&volume, &data.mask)?,
            GradientDeviations::PerVoxel(flat) => flat,
        };
        if flat.dim() != (data.voxel_count(), 9) {
            return Err(FittingError::GradDevShapeMismatch {
                expected: (data.voxel_count(), 9),
                actual: flat.dim(),
            });
        }
        self.gradient_deviations = Some(flat);
        Ok(())
    }

    // ---- Protocol checking -------------------------------------------------

    /// Protocol columns required by this model: the union over all tree
    /// leaves, in first-occurrence order.
    pub fn required_protocol_columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        for leaf in self.tree.leaves() {
            for column in leaf.protocol_columns() {
                if !columns.contains(column) {
                    columns.push(*column);
                }
            }
        }
        columns
    }

    /// Check a protocol against this model's demands, collecting every
    /// applicable problem: missing columns first, then the shell count.
    /// The shell check is skipped when the protocol has no b column — the
    /// missing column is already reported on its own.
    pub fn get_protocol_problems(&self, protocol: &Protocol) -> Vec<ProtocolProblem> {
        let mut problems = Vec::new();
        let missing: Vec<String> = self
            .required_protocol_columns()
            .into_iter()
            .filter(|name| !protocol.has_column(name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            problems.push(ProtocolProblem::MissingColumns { names: missing });
        }
        if let Some(shells) = protocol.nmr_shells() {
            if shells < self.required_nmr_shells {
                problems.push(ProtocolProblem::InsufficientShells {
                    required: self.required_nmr_shells,
                    actual: shells,
                });
            }
        }
        problems
    }

    /// Whether the protocol satisfies every demand of this model.
    pub fn is_protocol_sufficient(&self, protocol: &Protocol) -> bool {
        self.get_protocol_problems(protocol).is_empty()
    }

    // ---- Materialization and evaluation ------------------------------------

    fn checked_voxel_count(&self, optimized: &ResultsMap) -> FittingResult<usize> {
        let mut expected = None;
        for free in &self.parameters.free {
            let map = optimized.get(&free.name).ok_or_else(|| {
                FittingError::MissingResultMap { name: free.name.clone() }
            })?;
            match expected {
                None => expected = Some(map.len()),
                Some(n) if n != map.len() => {
                    return Err(FittingError::ResultLengthMismatch {
                        name: free.name.clone(),
                        expected: n,
                        actual: map.len(),
                    });
                }
                Some(_) => {}
            }
        }
        // A model with no free parameters is degenerate but still defined;
        // fall back to the attached data's voxel count.
        match expected {
            Some(n) => Ok(n),
            None => Ok(self.problem_data.as_ref().map_or(0, ProblemData::voxel_count)),
        }
    }

    /// Expand optimized free-parameter maps into the full per-voxel
    /// parameter set: fixes are broadcast and dependencies evaluated in
    /// topological order.
    ///
    /// ## Errors
    /// - `MissingResultMap` / `ResultLengthMismatch` on malformed input.
    pub fn materialize_parameters(&self, optimized: &ResultsMap) -> FittingResult<ResultsMap> {
        let n = self.checked_voxel_count(optimized)?;
        let mut full = ResultsMap::new();
        for free in &self.parameters.free {
            // Presence was checked above.
            if let Some(map) = optimized.get(&free.name) {
                full.insert(free.name.clone(), map.clone());
            }
        }
        for (name, value) in &self.parameters.fixes {
            full.insert(name.clone(), Array1::from_elem(n, *value));
        }
        for dependency in &self.parameters.dependencies {
            let map = dependency.rule.evaluate(&full, n)?;
            full.insert(dependency.target.clone(), map);
        }
        Ok(full)
    }

    /// Measurement series for one voxel, with gradient deviations applied
    /// when present and when the model reads both `g` and `b`.
    fn voxel_measurements(&self, base: &[Measurement], voxel: usize) -> FittingResult<Vec<Measurement>> {
        let Some(dev) = &self.gradient_deviations else {
            return Ok(base.to_vec());
        };
        let required = self.required_protocol_columns();
        if !(required.contains(&"g") && required.contains(&"b")) {
            return Ok(base.to_vec());
        }
        let row = dev.row(voxel);
        base.iter()
            .map(|m| {
                let (g, b) = match (m.g, m.b) {
                    (Some(g), Some(b)) => apply_gradient_deviation(row, &g, b)?,
                    _ => return Ok(m.clone()),
                };
                Ok(Measurement { g: Some(g), b: Some(b), ..m.clone() })
            })
            .collect()
    }

    /// Forward-evaluate the model over the attached data: one predicted
    /// signal row per ROI voxel, with the signal noise model applied.
    ///
    /// `optimized` holds the free-parameter maps; fixes and dependencies
    /// are materialized internally.
    ///
    /// ## Errors
    /// - `NoProblemData` without attached problem data, plus all
    ///   materialization and evaluation errors.
    pub fn evaluate_signal(&self, optimized: &ResultsMap) -> FittingResult<Array2<f64>> {
        let data = self.problem_data.as_ref().ok_or(FittingError::NoProblemData)?;
        let full = self.materialize_parameters(optimized)?;
        let base = measurements(&data.protocol);
        let n = data.voxel_count();
        let mut predicted = Array2::zeros((n, data.protocol.len()));
        let mut values = BTreeMap::new();
        for voxel in 0..n {
            values.clear();
            for (name, map) in &full {
                values.insert(name.clone(), map[voxel]);
            }
            let series = self.voxel_measurements(&base, voxel)?;
            let mut row = evaluate_voxel(&self.tree, &values, &series)?;
            self.signal_noise_model.apply(&mut row);
            predicted.row_mut(voxel).assign(&row);
        }
        Ok(predicted)
    }

    /// Per-voxel log-likelihood of the attached observations under the
    /// given free-parameter maps.
    pub fn voxel_log_likelihoods(&self, optimized: &ResultsMap) -> FittingResult<Array1<f64>> {
        let data = self.problem_data.as_ref().ok_or(FittingError::NoProblemData)?;
        let predicted = self.evaluate_signal(optimized)?;
        let mut out = Array1::zeros(data.voxel_count());
        for voxel in 0..data.voxel_count() {
            out[voxel] = self.evaluation_model.log_likelihood(
                &predicted.row(voxel).to_owned(),
                &data.signal.row(voxel).to_owned(),
            )?;
        }
        Ok(out)
    }

    // ---- Post-processing ---------------------------------------------------

    /// Materialize the full parameter set and append the derived maps.
    /// This is what turns an optimizer's output into the final results
    /// dictionary.
    pub fn complete_results(&self, optimized: &ResultsMap) -> FittingResult<ResultsMap> {
        let mut results = self.materialize_parameters(optimized)?;
        apply_modifiers(&self.modifiers, &mut results)?;
        Ok(results)
    }

    /// Names of the free-parameter maps selected for smoothing under the
    /// current white/black lists.
    fn smoothable_names(&self) -> Vec<String> {
        let free: Vec<String> =
            self.parameters.free.iter().map(|p| p.name.clone()).collect();
        if let Some(white) = &self.smooth_white_list {
            free.into_iter().filter(|name| white.contains(name)).collect()
        } else if let Some(black) = &self.smooth_black_list {
            free.into_iter().filter(|name| !black.contains(name)).collect()
        } else {
            free
        }
    }

    /// Spatially smooth the selected maps between optimization passes.
    /// Maps outside the selection pass through untouched.
    ///
    /// ## Errors
    /// - `NoProblemData` without attached problem data, plus ROI shape
    ///   errors when a map disagrees with the mask.
    pub fn smooth(&self, results: &ResultsMap, smoother: &dyn Smoother) -> FittingResult<ResultsMap> {
        let data = self.problem_data.as_ref().ok_or(FittingError::NoProblemData)?;
        let selected = self.smoothable_names();
        if selected.is_empty() {
            return Ok(results.clone());
        }
        let mut volumes = BTreeMap::new();
        for name in &selected {
            let map = results.get(name).ok_or_else(|| FittingError::MissingResultMap {
                name: name.clone(),
            })?;
            volumes.insert(name.clone(), restore_volume(map, &data.mask)?);
        }
        let filtered = smoother.filter(volumes, &data.mask);
        let mut smoothed = results.clone();
        for (name, volume) in filtered {
            smoothed.insert(name.clone(), create_roi(&volume, &data.mask)?);
        }
        Ok(smoothed)
    }

    /// Re-sample the free-parameter maps with their perturbation functions
    /// before a randomized restart. Maps absent from `results` are
    /// skipped.
    pub fn perturbate<R: Rng + ?Sized>(&self, results: &mut ResultsMap, rng: &mut R) {
        for free in &self.parameters.free {
            if let Some(map) = results.get_mut(&free.name) {
                free.perturbation.apply(map, free.lower_bound, free.upper_bound, rng);
            }
        }
    }
}
