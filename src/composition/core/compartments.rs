//! Compartments: the named primitives of the diffusion signal equation.
//!
//! Purpose
//! -------
//! Define [`Compartment`] — a named parametric sub-model of the diffusion
//! signal — together with the built-in compartment set used by the standard
//! composite models: `S0`, `Weight`, `Ball`, `Stick`, `Tensor`, `NODDI_IC`,
//! and `NODDI_EC`. Compartments are the leaves of the model expression tree
//! and the namespace under which parameters are addressed.
//!
//! Key behaviors
//! -------------
//! - Carry an ordered parameter list (see
//!   [`Parameter`](super::parameters::Parameter)) plus per-instance
//!   fixed-value overrides.
//! - Support instance aliasing: `Stick(Stick0)` and `Stick(Stick1)` are two
//!   independent clones of the `Stick` primitive whose parameters live in
//!   distinct namespaces (`Stick0.d` vs `Stick1.d`).
//! - Declare which acquisition-protocol columns the compartment needs
//!   (e.g. a diffusion compartment needs `g` and `b`); the protocol
//!   validator unions these over all tree leaves.
//!
//! Invariants & assumptions
//! ------------------------
//! - A compartment is immutable once constructed; fixing a parameter value
//!   clones (`Compartment::fix` takes and returns by value).
//! - Parameter names are unique within a compartment.
//! - `Weight` compartments expose exactly one parameter `w` constrained to
//!   `[0, 1]`; they participate in the sum-to-one invariant group handled
//!   by the dependency resolver.
//!
//! Conventions
//! -----------
//! - The **kind** is the registry name (`Stick`); the **instance** is the
//!   alias under which this use of the kind lives in a tree (`Stick0`,
//!   `w_ball`). With no explicit alias the instance equals the kind.
//! - Qualified parameter names are `"<instance>.<parameter>"`.
//! - Diffusivities are in SI units (m²/s), b-values in s/m², angles in
//!   radians.
use crate::composition::{
    core::parameters::Parameter,
    errors::{CompositionError, CompositionResult},
};
use std::collections::BTreeMap;

/// The built-in compartment kinds.
///
/// The kind determines the parameter list, the required protocol columns,
/// and the signal semantics (evaluated in
/// [`fitting::signal`](crate::fitting::signal)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompartmentKind {
    /// Unweighted (b0) signal amplitude.
    S0,
    /// Mixing fraction, `w ∈ [0, 1]`, sum-to-one group member.
    Weight,
    /// Isotropic free diffusion.
    Ball,
    /// Zero-radius anisotropic diffusion along one orientation.
    Stick,
    /// Full diffusion tensor with three principal diffusivities.
    Tensor,
    /// NODDI intra-cellular: Watson-dispersed sticks.
    NoddiIc,
    /// NODDI extra-cellular: axially symmetric (zeppelin) diffusion.
    NoddiEc,
}

impl CompartmentKind {
    /// Registry name of this kind, as used in model expressions.
    pub fn name(&self) -> &'static str {
        match self {
            CompartmentKind::S0 => "S0",
            CompartmentKind::Weight => "Weight",
            CompartmentKind::Ball => "Ball",
            CompartmentKind::Stick => "Stick",
            CompartmentKind::Tensor => "Tensor",
            CompartmentKind::NoddiIc => "NODDI_IC",
            CompartmentKind::NoddiEc => "NODDI_EC",
        }
    }

    /// Protocol columns this kind requires from the acquisition table.
    ///
    /// `S0` and `Weight` are protocol-independent. `NODDI_IC` additionally
    /// needs the pulse timings used by the restricted-cylinder term.
    pub fn protocol_columns(&self) -> &'static [&'static str] {
        match self {
            CompartmentKind::S0 | CompartmentKind::Weight => &[],
            CompartmentKind::Ball => &["b"],
            CompartmentKind::Stick | CompartmentKind::Tensor | CompartmentKind::NoddiEc => {
                &["g", "b"]
            }
            CompartmentKind::NoddiIc => &["g", "b", "G", "Delta", "delta"],
        }
    }

    /// Construct the ordered parameter list for this kind.
    ///
    /// Defaults and bounds follow the standard in-vivo ranges of the
    /// original model definitions. All constructors here use values that
    /// satisfy the [`Parameter`] invariants, so this never fails for the
    /// built-in kinds.
    fn parameters(&self) -> CompositionResult<Vec<Parameter>> {
        match self {
            CompartmentKind::S0 => Ok(vec![
                Parameter::new("s0", 1e4, 0.0, 1e8)?.with_perturbation(1e2)?,
            ]),
            CompartmentKind::Weight => Ok(vec![
                Parameter::new("w", 0.5, 0.0, 1.0)?.with_perturbation(0.05)?,
            ]),
            CompartmentKind::Ball => Ok(vec![
                Parameter::new("d", 3.0e-9, 1e-11, 1e-8)?.with_perturbation(1e-10)?,
            ]),
            CompartmentKind::Stick => Ok(vec![
                Parameter::new("d", 1.7e-9, 1e-11, 1e-8)?.with_perturbation(1e-10)?,
                Parameter::new("theta", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
                Parameter::new("phi", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
            ]),
            CompartmentKind::Tensor => Ok(vec![
                Parameter::new("d", 1.7e-9, 1e-11, 1e-8)?.with_perturbation(1e-10)?,
                Parameter::new("dperp0", 1.7e-10, 1e-11, 1e-8)?.with_perturbation(1e-10)?,
                Parameter::new("dperp1", 1.7e-10, 1e-11, 1e-8)?.with_perturbation(1e-10)?,
                Parameter::new("theta", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
                Parameter::new("phi", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
                Parameter::new("psi", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
            ]),
            CompartmentKind::NoddiIc => Ok(vec![
                Parameter::new("d", 1.7e-9, 1e-11, 1e-8)?,
                Parameter::new("theta", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
                Parameter::new("phi", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
                Parameter::new("kappa", 1.0, 1e-5, 64.0)?.with_perturbation(0.1)?,
                // Cylinder radius; fixed at zero in the standard NODDI
                // configuration (sticks).
                Parameter::fixed("R", 0.0, 0.0, 2e-5)?,
            ]),
            CompartmentKind::NoddiEc => Ok(vec![
                Parameter::new("d", 1.7e-9, 1e-11, 1e-8)?,
                Parameter::new("dperp0", 1.7e-10, 1e-11, 1e-8)?,
                Parameter::new("theta", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
                Parameter::new("phi", std::f64::consts::FRAC_PI_2, 0.0, std::f64::consts::PI)?,
                Parameter::new("kappa", 1.0, 1e-5, 64.0)?,
            ]),
        }
    }
}

/// A compartment instance: one use of a registry primitive in a model tree.
///
/// Immutable once constructed. `Stick(Stick0)` and `Stick(Stick1)` are two
/// independent instances; fixing `Stick0.d` never affects `Stick1.d`.
#[derive(Debug, Clone, PartialEq)]
pub struct Compartment {
    kind: CompartmentKind,
    instance: String,
    parameters: Vec<Parameter>,
    fixed_values: BTreeMap<String, f64>,
}

impl Compartment {
    /// Instantiate a compartment kind under its default instance name.
    pub fn new(kind: CompartmentKind) -> CompositionResult<Compartment> {
        Compartment::with_instance(kind, kind.name())
    }

    /// Instantiate a compartment kind under an explicit alias.
    ///
    /// The alias becomes the parameter namespace: an instance named
    /// `Stick0` exposes `Stick0.d`, `Stick0.theta`, `Stick0.phi`.
    pub fn with_instance(kind: CompartmentKind, instance: &str) -> CompositionResult<Compartment> {
        Ok(Compartment {
            kind,
            instance: instance.to_string(),
            parameters: kind.parameters()?,
            fixed_values: BTreeMap::new(),
        })
    }

    /// Registry kind of this instance.
    pub fn kind(&self) -> CompartmentKind {
        self.kind
    }

    /// Instance (alias) name; equals the kind name when no alias was given.
    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Whether this compartment is a mixing-fraction `Weight`.
    pub fn is_weight(&self) -> bool {
        self.kind == CompartmentKind::Weight
    }

    /// Ordered parameter list of this instance.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Protocol columns this instance requires.
    pub fn protocol_columns(&self) -> &'static [&'static str] {
        self.kind.protocol_columns()
    }

    /// Look up a parameter by bare name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// Qualified name of a bare parameter: `"<instance>.<parameter>"`.
    pub fn qualified_name(&self, parameter: &str) -> String {
        format!("{}.{}", self.instance, parameter)
    }

    /// Qualified names of all parameters, in declaration order.
    pub fn qualified_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| self.qualified_name(&p.name)).collect()
    }

    /// Fix a parameter of this instance to a value, returning the clone.
    ///
    /// ## Errors
    /// - `UnknownParameter` if `parameter` is not a bare parameter name of
    ///   this compartment.
    /// - `NonFiniteValue` if `value` is NaN or infinite.
    pub fn fix(mut self, parameter: &str, value: f64) -> CompositionResult<Compartment> {
        if self.parameter(parameter).is_none() {
            return Err(CompositionError::UnknownParameter {
                name: self.qualified_name(parameter),
            });
        }
        if !value.is_finite() {
            return Err(CompositionError::NonFiniteValue {
                name: self.qualified_name(parameter),
                value,
            });
        }
        self.fixed_values.insert(parameter.to_string(), value);
        Ok(self)
    }

    /// Fixed-value override for a bare parameter name, if any.
    pub fn fixed_value(&self, parameter: &str) -> Option<f64> {
        self.fixed_values.get(parameter).copied()
    }

    /// All per-instance fixed-value overrides (bare name → value).
    pub fn fixed_values(&self) -> &BTreeMap<String, f64> {
        &self.fixed_values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // Aliased instances of the same kind carry independent parameter
    // namespaces and independent fixes.
    //
    // Given
    // -----
    // - Two `Stick` instances aliased `Stick0` and `Stick1`.
    // - A fix applied only to `Stick0.d`.
    //
    // Expect
    // ------
    // - Qualified names differ per instance.
    // - The fix on `Stick0` does not leak into `Stick1`.
    fn aliased_instances_have_independent_namespaces() {
        // Arrange
        let stick0 = Compartment::with_instance(CompartmentKind::Stick, "Stick0").unwrap();
        let stick1 = Compartment::with_instance(CompartmentKind::Stick, "Stick1").unwrap();

        // Act
        let stick0 = stick0.fix("d", 1.7e-9).unwrap();

        // Assert
        assert_eq!(stick0.qualified_name("d"), "Stick0.d");
        assert_eq!(stick1.qualified_name("d"), "Stick1.d");
        assert_eq!(stick0.fixed_value("d"), Some(1.7e-9));
        assert_eq!(stick1.fixed_value("d"), None);
    }

    #[test]
    // Purpose
    // -------
    // `fix` rejects unknown parameter names and non-finite values.
    fn fix_rejects_unknown_parameter_and_non_finite_value() {
        // Arrange
        let ball = Compartment::new(CompartmentKind::Ball).unwrap();

        // Act & Assert
        assert!(matches!(
            ball.clone().fix("nope", 1.0),
            Err(CompositionError::UnknownParameter { .. })
        ));
        assert!(matches!(
            ball.fix("d", f64::INFINITY),
            Err(CompositionError::NonFiniteValue { .. })
        ));
    }

    #[test]
    // Purpose
    // -------
    // `Weight` exposes exactly one `w` parameter bounded to [0, 1] and is
    // flagged as a weight; no protocol columns are required.
    fn weight_compartment_shape() {
        // Arrange & Act
        let weight = Compartment::with_instance(CompartmentKind::Weight, "w_ball").unwrap();

        // Assert
        assert!(weight.is_weight());
        assert_eq!(weight.parameters().len(), 1);
        let w = weight.parameter("w").unwrap();
        assert_eq!((w.lower_bound, w.upper_bound), (0.0, 1.0));
        assert!(weight.protocol_columns().is_empty());
        assert_eq!(weight.qualified_names(), vec!["w_ball.w".to_string()]);
    }

    #[test]
    // Purpose
    // -------
    // The NODDI_IC cylinder radius is fixed by default, so it never enters
    // the free-parameter vector.
    fn noddi_ic_radius_is_fixed() {
        let ic = Compartment::new(CompartmentKind::NoddiIc).unwrap();
        assert!(ic.parameter("R").unwrap().fixed);
    }
}
