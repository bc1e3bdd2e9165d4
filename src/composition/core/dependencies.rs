//! Parameter dependencies and the free-parameter resolver.
//!
//! Purpose
//! -------
//! Turn a parsed model tree plus user-level parameter settings (fixes,
//! inits, bound overrides, declared dependencies) into a
//! [`ResolvedParameters`] partition: the ordered free-parameter vector the
//! optimizer sees, the scalar fixes, and the remaining dependencies in a
//! valid evaluation order.
//!
//! Key behaviors
//! -------------
//! - Every setting is validated against the qualified parameter names of
//!   the tree before anything else happens; unknown names, non-finite
//!   values, and inverted bounds fail fast.
//! - When the tree contains `Weight` compartments, the resolver installs
//!   the sum-to-one constraint: the first weight in tree order becomes a
//!   dependency target computed as `1 − Σ(other weights)`, so only the
//!   remaining weights stay free.
//! - Dependencies are ordered topologically (Kahn's algorithm); a cycle is
//!   reported with the sorted names of the parameters on it, excluding
//!   dependencies that merely read a cycle member. A dependency whose
//!   inputs are all scalar at resolve time is folded into the fixes map
//!   immediately.
//!
//! Invariants & assumptions
//! ------------------------
//! - At most one dependency per target parameter.
//! - A dependency target never appears in the free-parameter vector; it
//!   also shadows any fix declared for the same name.
//! - Free parameters keep the left-to-right tree traversal order, which is
//!   what makes optimizer vectors and result maps line up deterministically
//!   across runs.
//!
//! Conventions
//! -----------
//! - All names are qualified (`"<instance>.<parameter>"`).
//! - This module contains no I/O and no logging.
use crate::composition::{
    core::{
        expression::ModelTree,
        parameters::Perturbation,
        validation::{validate_bounds, validate_finite_value, validate_known_parameter},
    },
    errors::{CompositionError, CompositionResult},
};
use ndarray::Array1;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// How a dependent parameter's value is computed from other parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyRule {
    /// Sum-to-one reference weight: `1 − Σ(others)`. With no others the
    /// target is the constant 1.
    WeightSumToOne { others: Vec<String> },

    /// Copy another parameter's value verbatim.
    SimpleAssignment { source: String },

    /// Tortuosity constraint on a perpendicular diffusivity:
    /// `d · w_ec / (w_ec + w_ic)`, with the volume-fraction ratio replaced
    /// by `0.01` wherever it is not a normal number (degenerate voxels
    /// where both weights vanish).
    Tortuosity { d: String, w_ec: String, w_ic: String },
}

impl DependencyRule {
    /// Qualified names of the parameters this rule reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            DependencyRule::WeightSumToOne { others } => {
                others.iter().map(String::as_str).collect()
            }
            DependencyRule::SimpleAssignment { source } => vec![source.as_str()],
            DependencyRule::Tortuosity { d, w_ec, w_ic } => {
                vec![d.as_str(), w_ec.as_str(), w_ic.as_str()]
            }
        }
    }

    /// Evaluate this rule over per-voxel value maps.
    ///
    /// ## Arguments
    /// - `values`: qualified name → per-voxel values. Must contain every
    ///   input of this rule, all of the same length `n`.
    /// - `n`: number of voxels, used to size constant outputs.
    ///
    /// ## Errors
    /// - `CompositionError::UnknownParameter` if an input map is missing.
    pub fn evaluate(
        &self, values: &BTreeMap<String, Array1<f64>>, n: usize,
    ) -> CompositionResult<Array1<f64>> {
        let lookup = |name: &str| -> CompositionResult<&Array1<f64>> {
            values.get(name).ok_or_else(|| CompositionError::UnknownParameter {
                name: name.to_string(),
            })
        };
        match self {
            DependencyRule::WeightSumToOne { others } => {
                let mut out = Array1::from_elem(n, 1.0);
                for other in others {
                    out -= lookup(other)?;
                }
                Ok(out)
            }
            DependencyRule::SimpleAssignment { source } => Ok(lookup(source)?.clone()),
            DependencyRule::Tortuosity { d, w_ec, w_ic } => {
                let d = lookup(d)?;
                let w_ec = lookup(w_ec)?;
                let w_ic = lookup(w_ic)?;
                let mut out = Array1::zeros(n);
                for i in 0..n {
                    let mut ratio = w_ec[i] / (w_ec[i] + w_ic[i]);
                    if !ratio.is_normal() {
                        ratio = 0.01;
                    }
                    out[i] = d[i] * ratio;
                }
                Ok(out)
            }
        }
    }
}

/// A declared dependency: `target` is computed by `rule` instead of being
/// optimized.
///
/// `fixed` marks dependencies whose value is structural (e.g. a tortuosity
/// constraint) rather than a reparameterization; both kinds are excluded
/// from the free vector and evaluated during materialization, but only
/// dependencies whose inputs are all scalar at resolve time collapse into
/// the fixes map.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDependency {
    pub target: String,
    pub rule: DependencyRule,
    pub fixed: bool,
}

impl ParameterDependency {
    pub fn new(target: &str, rule: DependencyRule) -> ParameterDependency {
        ParameterDependency { target: target.to_string(), rule, fixed: false }
    }

    pub fn fixed(target: &str, rule: DependencyRule) -> ParameterDependency {
        ParameterDependency { target: target.to_string(), rule, fixed: true }
    }
}

/// User-level parameter settings attached to a composite-model definition.
///
/// All maps are keyed by qualified parameter name. Empty settings are valid
/// and leave every tree parameter free at its declared default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSettings {
    /// Scalar fixes: the parameter is excluded from optimization and takes
    /// this value everywhere.
    pub fixes: BTreeMap<String, f64>,
    /// Initial-value overrides for free parameters.
    pub inits: BTreeMap<String, f64>,
    /// Lower-bound overrides.
    pub lower_bounds: BTreeMap<String, f64>,
    /// Upper-bound overrides.
    pub upper_bounds: BTreeMap<String, f64>,
    /// Declared dependencies, in declaration order.
    pub dependencies: Vec<ParameterDependency>,
}

/// One entry of the optimizer-facing free-parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FreeParameter {
    /// Qualified name.
    pub name: String,
    /// Initial value (declared default or init override).
    pub init: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    /// Perturbation function for randomized restarts.
    pub perturbation: Perturbation,
}

/// Output of [`resolve_parameters`]: the partition of every tree parameter
/// into free, fixed, and dependent.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameters {
    /// Free parameters in tree traversal order.
    pub free: Vec<FreeParameter>,
    /// Scalar fixes, including folded dependencies.
    pub fixes: BTreeMap<String, f64>,
    /// Remaining dependencies in a valid (topological) evaluation order.
    pub dependencies: Vec<ParameterDependency>,
}

impl ResolvedParameters {
    /// Names of the free parameters, in optimizer-vector order.
    pub fn free_names(&self) -> Vec<&str> {
        self.free.iter().map(|p| p.name.as_str()).collect()
    }
}

/// Resolve a model tree plus settings into a free/fixed/dependent
/// partition.
///
/// Resolution proceeds in five steps:
/// 1. Collect every qualified parameter from the tree leaves, in traversal
///    order, and validate all settings against that name set.
/// 2. Install the default sum-to-one dependency on the first weight in
///    tree order, unless a declared dependency already targets it.
/// 3. Order the dependencies topologically; report cycles.
/// 4. Fold dependencies whose inputs are all scalar into the fixes map.
/// 5. Emit the free vector: every parameter that is neither fixed (by
///    declaration, by per-instance override, or by a fixed flag on the
///    compartment parameter) nor a dependency target, with bound and init
///    overrides applied.
///
/// ## Errors
/// - `UnknownParameter` for any setting referencing a name absent from the
///   tree.
/// - `NonFiniteValue` / `InvalidBounds` for malformed fixes, inits, or
///   bound overrides.
/// - `DuplicateDependency` when two dependencies share a target.
/// - `CircularDependency` when no evaluation order exists.
pub fn resolve_parameters(
    tree: &ModelTree, settings: &ParameterSettings,
) -> CompositionResult<ResolvedParameters> {
    let leaves = tree.leaves();

    // Step 1: collect names in traversal order and validate settings.
    let mut ordered_names = Vec::new();
    let mut known = BTreeSet::new();
    for leaf in &leaves {
        for name in leaf.qualified_names() {
            known.insert(name.clone());
            ordered_names.push(name);
        }
    }
    for (name, value) in settings.fixes.iter().chain(settings.inits.iter()) {
        validate_known_parameter(&known, name)?;
        validate_finite_value(name, *value)?;
    }
    for name in settings.lower_bounds.keys().chain(settings.upper_bounds.keys()) {
        validate_known_parameter(&known, name)?;
    }
    for dependency in &settings.dependencies {
        validate_known_parameter(&known, &dependency.target)?;
        for input in dependency.rule.inputs() {
            validate_known_parameter(&known, input)?;
        }
    }

    // Step 2: declared dependencies plus the default sum-to-one constraint
    // on the first weight in tree order.
    let mut dependencies = settings.dependencies.clone();
    let weight_names: Vec<String> = leaves
        .iter()
        .filter(|c| c.is_weight())
        .map(|c| c.qualified_name("w"))
        .collect();
    if let Some((reference, others)) = weight_names.split_first() {
        if !dependencies.iter().any(|d| &d.target == reference) {
            dependencies.push(ParameterDependency::new(
                reference,
                DependencyRule::WeightSumToOne { others: others.to_vec() },
            ));
        }
    }
    let mut targets = BTreeSet::new();
    for dependency in &dependencies {
        if !targets.insert(dependency.target.clone()) {
            return Err(CompositionError::DuplicateDependency {
                target: dependency.target.clone(),
            });
        }
    }

    // Step 3: topological order over the target→target edges.
    let dependencies = topological_order(dependencies, &targets)?;

    // Fixes: compartment-level fixed parameters and per-instance overrides
    // first, then user fixes on top. Dependency targets shadow fixes.
    let mut fixes = BTreeMap::new();
    for leaf in &leaves {
        for param in leaf.parameters() {
            if param.fixed {
                fixes.insert(leaf.qualified_name(&param.name), param.default);
            }
            if let Some(value) = leaf.fixed_value(&param.name) {
                fixes.insert(leaf.qualified_name(&param.name), value);
            }
        }
    }
    for (name, value) in &settings.fixes {
        fixes.insert(name.clone(), *value);
    }
    for target in &targets {
        fixes.remove(target);
    }

    // Step 4: fold dependencies whose inputs are all scalar by now. Folding
    // in topological order lets folded targets feed later folds.
    let mut remaining = Vec::new();
    for dependency in dependencies {
        let scalar_inputs: Option<BTreeMap<String, Array1<f64>>> = dependency
            .rule
            .inputs()
            .iter()
            .map(|input| {
                fixes.get(*input).map(|v| (input.to_string(), Array1::from_elem(1, *v)))
            })
            .collect();
        match scalar_inputs {
            Some(inputs) => {
                let value = dependency.rule.evaluate(&inputs, 1)?;
                fixes.insert(dependency.target.clone(), value[0]);
            }
            None => remaining.push(dependency),
        }
    }

    // Step 5: the free vector, in traversal order, with overrides applied.
    let mut free = Vec::new();
    let mut seen = BTreeSet::new();
    for leaf in &leaves {
        for param in leaf.parameters() {
            let name = leaf.qualified_name(&param.name);
            if fixes.contains_key(&name)
                || remaining.iter().any(|d| d.target == name)
                || !seen.insert(name.clone())
            {
                continue;
            }
            let lower = settings.lower_bounds.get(&name).copied().unwrap_or(param.lower_bound);
            let upper = settings.upper_bounds.get(&name).copied().unwrap_or(param.upper_bound);
            validate_bounds(&name, lower, upper)?;
            let init = settings.inits.get(&name).copied().unwrap_or(param.default);
            free.push(FreeParameter {
                name,
                init,
                lower_bound: lower,
                upper_bound: upper,
                perturbation: param.perturbation.clone(),
            });
        }
    }

    Ok(ResolvedParameters { free, fixes, dependencies: remaining })
}

/// Kahn's algorithm over the dependency graph restricted to edges between
/// dependency targets; free and fixed inputs impose no ordering.
fn topological_order(
    dependencies: Vec<ParameterDependency>, targets: &BTreeSet<String>,
) -> CompositionResult<Vec<ParameterDependency>> {
    let index_of: BTreeMap<&str, usize> = dependencies
        .iter()
        .enumerate()
        .map(|(i, d)| (d.target.as_str(), i))
        .collect();
    let n = dependencies.len();
    let mut indegree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, dependency) in dependencies.iter().enumerate() {
        for input in dependency.rule.inputs() {
            if targets.contains(input) {
                if let Some(&j) = index_of.get(input) {
                    dependents[j].push(i);
                    indegree[i] += 1;
                }
            }
        }
    }
    let mut queue: VecDeque<usize> =
        (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &j in &dependents[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                queue.push_back(j);
            }
        }
    }
    if order.len() < n {
        // The leftover set also contains acyclic nodes downstream of the
        // cycle; strip nodes with no outgoing edge inside the set until
        // only cycle members remain.
        let mut leftover: BTreeSet<usize> =
            (0..n).filter(|&i| indegree[i] > 0).collect();
        loop {
            let strippable: Vec<usize> = leftover
                .iter()
                .copied()
                .filter(|&i| dependents[i].iter().all(|j| !leftover.contains(j)))
                .collect();
            if strippable.is_empty() {
                break;
            }
            for i in strippable {
                leftover.remove(&i);
            }
        }
        let mut members: Vec<String> =
            leftover.into_iter().map(|i| dependencies[i].target.clone()).collect();
        members.sort();
        return Err(CompositionError::CircularDependency { members });
    }
    let mut slots: Vec<Option<ParameterDependency>> =
        dependencies.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}
