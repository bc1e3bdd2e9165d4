//! The composite-model registry: named, value-level model definitions.
//!
//! Purpose
//! -------
//! Hold [`ModelConfig`] entries — expression string plus parameter settings,
//! post-optimization modifiers, and protocol demands — for every standard
//! composite model, and build [`CompositeModel`]s from them by name.
//! Variants such as the ex-vivo models are expressed as [`ConfigPatch`]es
//! applied to a base definition rather than through any inheritance
//! mechanism: a patch produces a new, independent `ModelConfig` value.
//!
//! Key behaviors
//! -------------
//! - `builtin()` registers the standard set: `S0`, `BallStick_r1..r3` (and
//!   their `-ExVivo` patches), `Tensor` (+ `Tensor-ExVivo`), and `NODDI`.
//! - A config is declarative only; all validation (expression syntax,
//!   parameter names, dependency cycles) happens when the model is built.
//!
//! Conventions
//! -----------
//! - Model names are case-sensitive; ex-vivo variants use a `-ExVivo`
//!   suffix.
//! - Access the process-wide table through [`model_registry`] or the
//!   [`build_model`] convenience wrapper.
use crate::{
    composition::{
        core::dependencies::{DependencyRule, ParameterDependency, ParameterSettings},
        errors::{CompositionError, CompositionResult},
    },
    fitting::{
        composite::CompositeModel,
        modifiers::{ModifierExpr, PostOptimizationModifier},
    },
    registry::compartments::compartment_registry,
};
use std::{collections::BTreeMap, sync::OnceLock};

/// Declarative definition of a composite model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Registry name.
    pub name: String,
    /// One-line human description.
    pub description: String,
    /// Compositional model expression.
    pub expression: String,
    /// Fixes, inits, bound overrides, and dependencies.
    pub settings: ParameterSettings,
    /// Post-optimization derived maps, applied in declaration order.
    pub modifiers: Vec<PostOptimizationModifier>,
    /// Minimum number of distinct b-value shells the acquisition protocol
    /// must offer. 1 for single-shell models.
    pub required_nmr_shells: usize,
}

impl ModelConfig {
    pub fn new(name: &str, description: &str, expression: &str) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            description: description.to_string(),
            expression: expression.to_string(),
            settings: ParameterSettings::default(),
            modifiers: Vec::new(),
            required_nmr_shells: 1,
        }
    }

    pub fn fix(mut self, name: &str, value: f64) -> ModelConfig {
        self.settings.fixes.insert(name.to_string(), value);
        self
    }

    pub fn init(mut self, name: &str, value: f64) -> ModelConfig {
        self.settings.inits.insert(name.to_string(), value);
        self
    }

    pub fn dependency(mut self, dependency: ParameterDependency) -> ModelConfig {
        self.settings.dependencies.push(dependency);
        self
    }

    pub fn modifier(mut self, name: &str, expr: ModifierExpr) -> ModelConfig {
        self.modifiers.push(PostOptimizationModifier::new(name, expr));
        self
    }

    pub fn shells(mut self, required: usize) -> ModelConfig {
        self.required_nmr_shells = required;
        self
    }

    /// Produce a new config with this patch applied; the base is untouched.
    pub fn patched(&self, patch: &ConfigPatch) -> ModelConfig {
        let mut config = self.clone();
        config.name = patch.name.clone();
        config.description = patch.description.clone();
        for (name, value) in &patch.fixes {
            config.settings.fixes.insert(name.clone(), *value);
        }
        for (name, value) in &patch.inits {
            config.settings.inits.insert(name.clone(), *value);
        }
        config
    }
}

/// A value-level variant of a base [`ModelConfig`]: new name and
/// description plus fix/init overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigPatch {
    pub name: String,
    pub description: String,
    pub fixes: BTreeMap<String, f64>,
    pub inits: BTreeMap<String, f64>,
}

impl ConfigPatch {
    pub fn new(name: &str, description: &str) -> ConfigPatch {
        ConfigPatch { name: name.to_string(), description: description.to_string(), ..Default::default() }
    }

    pub fn fix(mut self, name: &str, value: f64) -> ConfigPatch {
        self.fixes.insert(name.to_string(), value);
        self
    }

    pub fn init(mut self, name: &str, value: f64) -> ConfigPatch {
        self.inits.insert(name.to_string(), value);
        self
    }
}

/// Table of named composite-model definitions.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    configs: BTreeMap<String, ModelConfig>,
}

impl ModelRegistry {
    /// The standard model set.
    pub fn builtin() -> ModelRegistry {
        let mut registry = ModelRegistry { configs: BTreeMap::new() };

        registry.add(ModelConfig::new("S0", "Models the unweighted signal (aka. b0).", "S0"));

        let ball_stick_r1 = ModelConfig::new(
            "BallStick_r1",
            "The default Ball & Stick model",
            "S0 * ( (Weight(w_ball) * Ball) +
                    (Weight(w_stick) * Stick) )",
        )
        .fix("Ball.d", 3.0e-9)
        .fix("Stick.d", 1.7e-9)
        .modifier("FS", ModifierExpr::OneMinus { source: "w_ball.w".to_string() });
        registry.add_with_patch(
            ball_stick_r1,
            ConfigPatch::new("BallStick_r1-ExVivo", "The Ball & Stick model with ex vivo defaults")
                .fix("Ball.d", 2.0e-9)
                .fix("Stick.d", 0.6e-9),
        );

        let ball_stick_r2 = ModelConfig::new(
            "BallStick_r2",
            "The Ball & 2x Stick model",
            "S0 * ( (Weight(w_ball) * Ball) +
                    (Weight(w_stick0) * Stick(Stick0)) +
                    (Weight(w_stick1) * Stick(Stick1)) )",
        )
        .fix("Ball.d", 3.0e-9)
        .fix("Stick0.d", 1.7e-9)
        .fix("Stick1.d", 1.7e-9)
        .modifier("FS", ModifierExpr::OneMinus { source: "w_ball.w".to_string() });
        registry.add_with_patch(
            ball_stick_r2,
            ConfigPatch::new(
                "BallStick_r2-ExVivo",
                "The Ball & 2x Stick model with ex vivo defaults",
            )
            .fix("Ball.d", 2.0e-9)
            .fix("Stick0.d", 0.6e-9)
            .fix("Stick1.d", 0.6e-9),
        );

        let ball_stick_r3 = ModelConfig::new(
            "BallStick_r3",
            "The Ball & 3x Stick model",
            "S0 * ( (Weight(w_ball) * Ball) +
                    (Weight(w_stick0) * Stick(Stick0)) +
                    (Weight(w_stick1) * Stick(Stick1)) +
                    (Weight(w_stick2) * Stick(Stick2)) )",
        )
        .fix("Ball.d", 3.0e-9)
        .fix("Stick0.d", 1.7e-9)
        .fix("Stick1.d", 1.7e-9)
        .fix("Stick2.d", 1.7e-9)
        .init("w_stick2.w", 0.0)
        .modifier("FS", ModifierExpr::OneMinus { source: "w_ball.w".to_string() });
        registry.add_with_patch(
            ball_stick_r3,
            ConfigPatch::new(
                "BallStick_r3-ExVivo",
                "The Ball & 3x Stick model with ex vivo defaults",
            )
            .fix("Ball.d", 2.0e-9)
            .fix("Stick0.d", 0.6e-9)
            .fix("Stick1.d", 0.6e-9)
            .fix("Stick2.d", 0.6e-9),
        );

        let tensor = ModelConfig::new(
            "Tensor",
            "The standard Tensor model with in vivo defaults.",
            "S0 * Tensor",
        )
        .init("Tensor.d", 1.7e-9)
        .init("Tensor.dperp0", 1.7e-10)
        .init("Tensor.dperp1", 1.7e-10);
        registry.add_with_patch(
            tensor,
            ConfigPatch::new("Tensor-ExVivo", "The standard Tensor model with ex vivo defaults.")
                .init("Tensor.d", 1e-9)
                .init("Tensor.dperp0", 0.6e-10)
                .init("Tensor.dperp1", 0.6e-10),
        );

        registry.add(
            ModelConfig::new(
                "NODDI",
                "The standard NODDI model",
                "S0 * ((Weight(w_csf) * Ball) +
                       (Weight(w_ic) * NODDI_IC) +
                       (Weight(w_ec) * NODDI_EC)
                       )",
            )
            .fix("NODDI_IC.d", 1.7e-9)
            .fix("NODDI_IC.R", 0.0)
            .fix("NODDI_EC.d", 1.7e-9)
            .fix("Ball.d", 3.0e-9)
            .dependency(ParameterDependency::fixed(
                "NODDI_EC.dperp0",
                DependencyRule::Tortuosity {
                    d: "NODDI_EC.d".to_string(),
                    w_ec: "w_ec.w".to_string(),
                    w_ic: "w_ic.w".to_string(),
                },
            ))
            .dependency(ParameterDependency::new(
                "NODDI_EC.kappa",
                DependencyRule::SimpleAssignment { source: "NODDI_IC.kappa".to_string() },
            ))
            .dependency(ParameterDependency::new(
                "NODDI_EC.theta",
                DependencyRule::SimpleAssignment { source: "NODDI_IC.theta".to_string() },
            ))
            .dependency(ParameterDependency::new(
                "NODDI_EC.phi",
                DependencyRule::SimpleAssignment { source: "NODDI_IC.phi".to_string() },
            ))
            .modifier(
                "NDI",
                ModifierExpr::Fraction {
                    numerator: "w_ic.w".to_string(),
                    denominator: vec!["w_ic.w".to_string(), "w_ec.w".to_string()],
                },
            )
            .modifier(
                "ODI",
                ModifierExpr::OrientationDispersion { kappa: "NODDI_IC.kappa".to_string() },
            )
            .shells(2),
        );

        registry
    }

    fn add(&mut self, config: ModelConfig) {
        self.configs.insert(config.name.clone(), config);
    }

    fn add_with_patch(&mut self, base: ModelConfig, patch: ConfigPatch) {
        self.add(base.patched(&patch));
        self.add(base);
    }

    /// Look up a model definition by name.
    ///
    /// ## Errors
    /// - `CompositionError::UnknownModel` if `name` is not registered.
    pub fn get(&self, name: &str) -> CompositionResult<&ModelConfig> {
        self.configs.get(name).ok_or_else(|| CompositionError::UnknownModel {
            name: name.to_string(),
        })
    }

    /// Registered model names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.configs.keys().map(String::as_str).collect()
    }
}

/// Process-wide built-in model table.
pub fn model_registry() -> &'static ModelRegistry {
    static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ModelRegistry::builtin)
}

/// Build a composite model by registry name against the built-in
/// compartment catalog.
pub fn build_model(name: &str) -> CompositionResult<CompositeModel> {
    CompositeModel::from_config(model_registry().get(name)?, compartment_registry())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // The builtin table contains the standard set with ex-vivo variants.
    fn builtin_table_contains_standard_models() {
        // Arrange & Act
        let registry = ModelRegistry::builtin();

        // Assert
        for name in [
            "S0",
            "BallStick_r1",
            "BallStick_r1-ExVivo",
            "BallStick_r2",
            "BallStick_r2-ExVivo",
            "BallStick_r3",
            "BallStick_r3-ExVivo",
            "Tensor",
            "Tensor-ExVivo",
            "NODDI",
        ] {
            assert!(registry.get(name).is_ok(), "missing builtin model: {name}");
        }
        assert!(matches!(
            registry.get("CHARMED_r9"),
            Err(CompositionError::UnknownModel { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // A patch produces an independent value: the ex-vivo variant overrides
    // the fixes while the base keeps its in-vivo values.
    fn patching_leaves_the_base_untouched() {
        // Arrange
        let registry = ModelRegistry::builtin();

        // Act
        let base = registry.get("BallStick_r1").unwrap();
        let patched = registry.get("BallStick_r1-ExVivo").unwrap();

        // Assert
        assert_eq!(base.settings.fixes.get("Ball.d"), Some(&3.0e-9));
        assert_eq!(patched.settings.fixes.get("Ball.d"), Some(&2.0e-9));
        assert_eq!(patched.settings.fixes.get("Stick.d"), Some(&0.6e-9));
        assert_eq!(base.modifiers, patched.modifiers);
    }

    #[test]
    // Purpose
    // -------
    // Aliased compartments keep their parameters apart: building
    // BallStick_r2 produces separate Stick0.d and Stick1.d fixes, and the
    // orientation parameters of both sticks stay free.
    fn aliased_sticks_resolve_independently() {
        // Arrange & Act
        let model = build_model("BallStick_r2").unwrap();
        let parameters = model.parameters();

        // Assert
        assert_eq!(parameters.fixes.get("Stick0.d"), Some(&1.7e-9));
        assert_eq!(parameters.fixes.get("Stick1.d"), Some(&1.7e-9));
        let free = model.free_parameter_names();
        for name in ["Stick0.theta", "Stick0.phi", "Stick1.theta", "Stick1.phi"] {
            assert!(free.contains(&name), "expected free parameter: {name}");
        }
    }

    #[test]
    // Purpose
    // -------
    // NODDI declares its multi-shell demand and the full dependency chain
    // tying the extra-cellular space to the intra-cellular orientation.
    fn noddi_config_shape() {
        // Arrange & Act
        let registry = ModelRegistry::builtin();
        let noddi = registry.get("NODDI").unwrap();

        // Assert
        assert_eq!(noddi.required_nmr_shells, 2);
        assert_eq!(noddi.settings.dependencies.len(), 4);
        assert!(noddi.settings.dependencies[0].fixed);
        assert_eq!(noddi.modifiers.len(), 2);
    }
}
