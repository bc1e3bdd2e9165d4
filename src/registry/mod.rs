//! registry — named catalogs of compartments and composite models.
//!
//! Purpose
//! -------
//! Provide the two lookup tables that make models addressable by name: the
//! compartment catalog used by the expression parser
//! ([`CompartmentRegistry`]) and the composite-model table
//! ([`ModelRegistry`]) holding declarative [`ModelConfig`] entries. The
//! [`build_model`] convenience function ties both together.
//!
//! Key behaviors
//! -------------
//! - `CompartmentRegistry::builtin()` registers the standard primitives;
//!   `ModelRegistry::builtin()` registers the standard composite models
//!   including their ex-vivo [`ConfigPatch`] variants.
//! - Process-wide immutable instances are available through
//!   [`compartment_registry`] and [`model_registry`]; both initialize
//!   lazily and never change afterwards.
//!
//! Conventions
//! -----------
//! - Lookup is case-sensitive. Variant models are value-level patches of a
//!   base config, never an inheritance chain.
//! - Registries perform no I/O and no logging.
//!
//! Downstream usage
//! ----------------
//! - `build_model("BallStick_r1")` is the main entry point for standard
//!   models; the returned
//!   [`CompositeModel`](crate::fitting::composite::CompositeModel) is then
//!   wired to data and an optimizer by the fitting layer.
//!
//! Testing notes
//! -------------
//! - Unit tests cover catalog completeness, alias loading, patch
//!   independence, and unknown-name errors; integration tests build every
//!   builtin model by name.

pub mod compartments;
pub mod models;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::compartments::{CompartmentRegistry, compartment_registry};
pub use self::models::{ConfigPatch, ModelConfig, ModelRegistry, build_model, model_registry};

// ---- Optional convenience prelude for downstream crates -------------------

pub mod prelude {
    pub use super::compartments::{CompartmentRegistry, compartment_registry};
    pub use super::models::{ConfigPatch, ModelConfig, ModelRegistry, build_model, model_registry};
}
