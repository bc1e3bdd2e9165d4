//! core — compartments, parameters, expression trees, and the dependency
//! resolver.
//!
//! Purpose
//! -------
//! Collect the structural building blocks of composite diffusion-MRI
//! models: parameter containers with bounds and perturbation functions,
//! compartment primitives, the compositional-expression parser producing
//! model trees, and the resolver that partitions every tree parameter into
//! free, fixed, and dependent. Higher layers (the model registry and the
//! fitting stack) build exclusively on these primitives.
//!
//! Key behaviors
//! -------------
//! - Define validated scalar parameters ([`Parameter`], [`Perturbation`])
//!   and compartment instances ([`Compartment`], [`CompartmentKind`]) with
//!   per-instance namespaces and protocol-column declarations.
//! - Parse compositional expressions into [`ModelTree`]s
//!   ([`parse_expression`]): `*` binds tighter than `+`, aliases create
//!   independent instances, same-operator chains flatten.
//! - Resolve parameter settings against a tree ([`resolve_parameters`]):
//!   install the sum-to-one constraint over the tree's weights, order
//!   dependencies topologically, fold scalar dependencies into fixes, and
//!   emit the free vector in traversal order.
//!
//! Invariants & assumptions
//! ------------------------
//! - Parameters constructed here satisfy finite defaults and `lower <
//!   upper` bounds; violations never survive a constructor.
//! - Qualified names are `"<instance>.<parameter>"` and unique per tree;
//!   instance aliases create disjoint namespaces.
//! - Internal tree nodes carry ≥ 2 children; leaves appear left-to-right
//!   in expression order, which fixes the free-vector ordering and the
//!   sum-to-one reference weight.
//! - At most one dependency per target; the dependency graph is acyclic or
//!   resolution fails with the full cycle member list.
//!
//! Conventions
//! -----------
//! - Diffusivities in m²/s, b-values in s/m², angles in radians.
//! - No I/O and no logging anywhere in this module; everything operates on
//!   in-memory values and reports failures as
//!   [`CompositionResult`](crate::composition::errors::CompositionResult).
//!
//! Downstream usage
//! ----------------
//! - The model registry parses its expression strings through
//!   [`parse_expression`] and resolves its settings through
//!   [`resolve_parameters`] when building a composite model.
//! - The fitting layer consumes [`ResolvedParameters`] to size optimizer
//!   vectors and to materialize full per-voxel parameter sets.
//!
//! Testing notes
//! -------------
//! - Unit tests per submodule cover constructor validation, alias
//!   namespace independence, operator precedence and flattening, the
//!   sum-to-one partition, dependency ordering, folding, and cycle
//!   reporting.

pub mod compartments;
pub mod dependencies;
pub mod expression;
pub mod parameters;
pub mod validation;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::compartments::{Compartment, CompartmentKind};
pub use self::dependencies::{
    DependencyRule, FreeParameter, ParameterDependency, ParameterSettings, ResolvedParameters,
    resolve_parameters,
};
pub use self::expression::{ModelTree, TreeOp, parse_expression};
pub use self::parameters::{Parameter, Perturbation};
pub use self::validation::{validate_bounds, validate_finite_value, validate_known_parameter};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::compartments::{Compartment, CompartmentKind};
    pub use super::dependencies::{
        DependencyRule, FreeParameter, ParameterDependency, ParameterSettings, ResolvedParameters,
        resolve_parameters,
    };
    pub use super::expression::{ModelTree, TreeOp, parse_expression};
    pub use super::parameters::{Parameter, Perturbation};
}
