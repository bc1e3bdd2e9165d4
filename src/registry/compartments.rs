//! The compartment registry: name → compartment primitive resolution.
//!
//! Purpose
//! -------
//! Map the registry names used in model expressions (`Ball`, `Stick`,
//! `NODDI_IC`, ...) to [`CompartmentKind`] constructors, and instantiate
//! [`Compartment`]s on demand, optionally under an alias. The expression
//! parser resolves every operand through this catalog.
//!
//! Conventions
//! -----------
//! - The built-in catalog is immutable and process-wide; access it through
//!   [`compartment_registry`]. A mutable registry can still be built
//!   locally for tests via [`CompartmentRegistry::builtin`].
//! - Lookup is case-sensitive, matching the expression grammar.
use crate::composition::{
    core::compartments::{Compartment, CompartmentKind},
    errors::{CompositionError, CompositionResult},
};
use std::{collections::BTreeMap, sync::OnceLock};

/// Catalog of compartment primitives addressable from model expressions.
#[derive(Debug, Clone)]
pub struct CompartmentRegistry {
    kinds: BTreeMap<String, CompartmentKind>,
}

impl CompartmentRegistry {
    /// The built-in catalog: `S0`, `Weight`, `Ball`, `Stick`, `Tensor`,
    /// `NODDI_IC`, `NODDI_EC`.
    pub fn builtin() -> CompartmentRegistry {
        let kinds = [
            CompartmentKind::S0,
            CompartmentKind::Weight,
            CompartmentKind::Ball,
            CompartmentKind::Stick,
            CompartmentKind::Tensor,
            CompartmentKind::NoddiIc,
            CompartmentKind::NoddiEc,
        ];
        CompartmentRegistry {
            kinds: kinds.iter().map(|k| (k.name().to_string(), *k)).collect(),
        }
    }

    /// Whether `name` resolves to a registered compartment.
    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.kinds.keys().map(String::as_str).collect()
    }

    /// Instantiate a compartment under its default instance name.
    ///
    /// ## Errors
    /// - `CompositionError::UnknownCompartment` if `name` is not registered.
    pub fn load(&self, name: &str) -> CompositionResult<Compartment> {
        self.load_as(name, None)
    }

    /// Instantiate a compartment, optionally under an alias.
    ///
    /// With `alias = Some("Stick0")` the returned instance namespaces its
    /// parameters as `Stick0.<param>`; with `None` the kind name is used.
    ///
    /// ## Errors
    /// - `CompositionError::UnknownCompartment` if `name` is not registered.
    pub fn load_as(&self, name: &str, alias: Option<&str>) -> CompositionResult<Compartment> {
        let kind = self.kinds.get(name).ok_or_else(|| CompositionError::UnknownCompartment {
            name: name.to_string(),
        })?;
        Compartment::with_instance(*kind, alias.unwrap_or(name))
    }
}

/// Process-wide built-in compartment catalog.
pub fn compartment_registry() -> &'static CompartmentRegistry {
    static REGISTRY: OnceLock<CompartmentRegistry> = OnceLock::new();
    REGISTRY.get_or_init(CompartmentRegistry::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // The builtin catalog resolves every standard primitive, honors
    // aliases, and rejects unknown names.
    fn builtin_catalog_resolves_and_aliases() {
        // Arrange
        let registry = CompartmentRegistry::builtin();

        // Act & Assert
        for name in ["S0", "Weight", "Ball", "Stick", "Tensor", "NODDI_IC", "NODDI_EC"] {
            assert!(registry.contains(name), "missing builtin: {name}");
            assert_eq!(registry.load(name).unwrap().instance(), name);
        }
        let aliased = registry.load_as("Stick", Some("Stick0")).unwrap();
        assert_eq!(aliased.instance(), "Stick0");
        assert_eq!(aliased.kind(), CompartmentKind::Stick);
        assert!(matches!(
            registry.load("Blob"),
            Err(CompositionError::UnknownCompartment { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // The process-wide accessor returns the same catalog on every call.
    fn global_registry_is_stable() {
        let a = compartment_registry();
        let b = compartment_registry();
        assert_eq!(a.names(), b.names());
    }
}
