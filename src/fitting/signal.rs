//! The diffusion signal kernel: per-compartment signal equations and
//! bottom-up tree evaluation.
//!
//! Purpose
//! -------
//! Evaluate a composed model tree for one voxel: each leaf compartment
//! maps its parameter values and one acquisition measurement to a scalar
//! signal contribution, and internal nodes combine children by sum or
//! product. This is the forward model an external optimizer evaluates
//! through [`CompositeModel`](super::composite::CompositeModel).
//!
//! Key behaviors
//! -------------
//! - `S0` and `Weight` are protocol-independent scalars; `Ball`, `Stick`,
//!   and `Tensor` are mono-exponential attenuations; the NODDI
//!   compartments average over a Watson orientation distribution with
//!   concentration `kappa`.
//! - The Watson average uses a fixed midpoint quadrature (64 polar × 32
//!   azimuthal abscissae), exploiting the antipodal symmetry of the
//!   distribution.
//! - Missing measurement fields abort with
//!   [`FittingError::MissingProtocolColumn`]; under normal operation the
//!   protocol check has already reported these before a fit starts.
//!
//! Conventions
//! -----------
//! - Gradient directions are unit vectors; b-values in s/m²,
//!   diffusivities in m²/s, so exponents are dimensionless.
//! - Spherical angles follow the physics convention: `theta` polar from
//!   +z, `phi` azimuthal from +x.
use crate::{
    composition::core::{
        compartments::{Compartment, CompartmentKind},
        expression::{ModelTree, TreeOp},
    },
    fitting::errors::{FittingError, FittingResult},
    protocol::table::Protocol,
};
use nalgebra::Vector3;
use ndarray::Array1;
use std::collections::BTreeMap;

/// Number of polar quadrature abscissae for the Watson average.
const WATSON_POLAR_STEPS: usize = 64;
/// Number of azimuthal quadrature abscissae for the Watson average.
const WATSON_AZIMUTH_STEPS: usize = 32;

/// One acquisition measurement, decoded from a protocol row.
///
/// Fields are `None` when the protocol lacks the corresponding column;
/// compartments that need an absent field fail at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    /// Gradient direction, unit length.
    pub g: Option<Vector3<f64>>,
    /// b-value in s/m².
    pub b: Option<f64>,
    /// Gradient amplitude `G` in T/m.
    pub gradient_amplitude: Option<f64>,
    /// Pulse separation `Delta` in s.
    pub pulse_separation: Option<f64>,
    /// Pulse duration `delta` in s.
    pub pulse_duration: Option<f64>,
}

/// Decode a protocol table into per-row measurements.
pub fn measurements(protocol: &Protocol) -> Vec<Measurement> {
    let g = protocol.vector("g");
    let b = protocol.scalar("b");
    let amplitude = protocol.scalar("G");
    let separation = protocol.scalar("Delta");
    let duration = protocol.scalar("delta");
    (0..protocol.len())
        .map(|row| Measurement {
            g: g.map(|col| col[row]),
            b: b.map(|col| col[row]),
            gradient_amplitude: amplitude.map(|col| col[row]),
            pulse_separation: separation.map(|col| col[row]),
            pulse_duration: duration.map(|col| col[row]),
        })
        .collect()
}

/// Unit direction from spherical angles (polar `theta`, azimuth `phi`).
pub fn spherical_direction(theta: f64, phi: f64) -> Vector3<f64> {
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_phi, cos_phi) = phi.sin_cos();
    Vector3::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta)
}

fn require<T: Copy>(field: Option<T>, column: &str) -> FittingResult<T> {
    field.ok_or_else(|| FittingError::MissingProtocolColumn { name: column.to_string() })
}

fn lookup(values: &BTreeMap<String, f64>, name: String) -> FittingResult<f64> {
    values.get(&name).copied().ok_or(FittingError::MissingResultMap { name })
}

/// Midpoint abscissae `t = cos(beta)` over `[0, 1]` with their Watson
/// weights `exp(kappa * t^2)`; the caller normalizes by the weight sum.
fn watson_polar_weights(kappa: f64) -> impl Iterator<Item = (f64, f64)> {
    (0..WATSON_POLAR_STEPS).map(move |i| {
        let t = (i as f64 + 0.5) / WATSON_POLAR_STEPS as f64;
        (t, (kappa * t * t).exp())
    })
}

/// Watson-averaged stick attenuation: `⟨exp(-b d (g·n)²)⟩` over
/// orientations `n` distributed around the mean direction with
/// concentration `kappa`. `cos_gamma` is the cosine of the angle between
/// the gradient and the mean direction.
fn watson_dispersed_stick(b: f64, d: f64, kappa: f64, cos_gamma: f64) -> f64 {
    let sin_gamma = (1.0 - cos_gamma * cos_gamma).max(0.0).sqrt();
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (t, weight) in watson_polar_weights(kappa) {
        let radial = (1.0 - t * t).max(0.0).sqrt();
        let mut azimuth_sum = 0.0;
        for j in 0..WATSON_AZIMUTH_STEPS {
            let alpha = (j as f64 + 0.5) * std::f64::consts::PI / WATSON_AZIMUTH_STEPS as f64;
            let projection = cos_gamma * t + sin_gamma * radial * alpha.cos();
            azimuth_sum += (-b * d * projection * projection).exp();
        }
        total += weight * azimuth_sum / WATSON_AZIMUTH_STEPS as f64;
        weight_sum += weight;
    }
    total / weight_sum
}

/// Watson second moment `⟨(g·n)²⟩` for the dispersed zeppelin. The
/// azimuthal average is analytic (`⟨cos α⟩ = 0`, `⟨cos² α⟩ = ½`), so only
/// the polar quadrature remains.
fn watson_second_moment(kappa: f64, cos_gamma: f64) -> f64 {
    let cos2 = cos_gamma * cos_gamma;
    let sin2 = 1.0 - cos2;
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for (t, weight) in watson_polar_weights(kappa) {
        let t2 = t * t;
        total += weight * (cos2 * t2 + 0.5 * sin2 * (1.0 - t2));
        weight_sum += weight;
    }
    total / weight_sum
}

/// Signal contribution of one compartment for one measurement.
///
/// `values` maps qualified parameter names to this voxel's scalar values
/// and must cover every parameter of `compartment`.
///
/// ## Errors
/// - `MissingResultMap` for an absent parameter value.
/// - `MissingProtocolColumn` for an absent measurement field.
pub fn compartment_signal(
    compartment: &Compartment, values: &BTreeMap<String, f64>, m: &Measurement,
) -> FittingResult<f64> {
    let param = |name: &str| lookup(values, compartment.qualified_name(name));
    match compartment.kind() {
        CompartmentKind::S0 => param("s0"),
        CompartmentKind::Weight => param("w"),
        CompartmentKind::Ball => {
            let b = require(m.b, "b")?;
            Ok((-b * param("d")?).exp())
        }
        CompartmentKind::Stick => {
            let g = require(m.g, "g")?;
            let b = require(m.b, "b")?;
            let direction = spherical_direction(param("theta")?, param("phi")?);
            let projection = g.dot(&direction);
            Ok((-b * param("d")? * projection * projection).exp())
        }
        CompartmentKind::Tensor => {
            let g = require(m.g, "g")?;
            let b = require(m.b, "b")?;
            let (theta, phi, psi) = (param("theta")?, param("phi")?, param("psi")?);
            // Principal frame: e0 from the spherical angles, e1/e2 spanned
            // by the polar/azimuthal tangents rotated by psi around e0.
            let e0 = spherical_direction(theta, phi);
            let (sin_theta, cos_theta) = theta.sin_cos();
            let (sin_phi, cos_phi) = phi.sin_cos();
            let polar_tangent =
                Vector3::new(cos_theta * cos_phi, cos_theta * sin_phi, -sin_theta);
            let azimuth_tangent = Vector3::new(-sin_phi, cos_phi, 0.0);
            let e1 = psi.cos() * polar_tangent + psi.sin() * azimuth_tangent;
            let e2 = e0.cross(&e1);
            let exponent = param("d")? * g.dot(&e0).powi(2)
                + param("dperp0")? * g.dot(&e1).powi(2)
                + param("dperp1")? * g.dot(&e2).powi(2);
            Ok((-b * exponent).exp())
        }
        CompartmentKind::NoddiIc => {
            let g = require(m.g, "g")?;
            let b = require(m.b, "b")?;
            let mean = spherical_direction(param("theta")?, param("phi")?);
            Ok(watson_dispersed_stick(b, param("d")?, param("kappa")?, g.dot(&mean)))
        }
        CompartmentKind::NoddiEc => {
            let g = require(m.g, "g")?;
            let b = require(m.b, "b")?;
            let mean = spherical_direction(param("theta")?, param("phi")?);
            let m2 = watson_second_moment(param("kappa")?, g.dot(&mean));
            let (d, dperp) = (param("d")?, param("dperp0")?);
            Ok((-b * (dperp + (d - dperp) * m2)).exp())
        }
    }
}

/// Evaluate a model tree for one voxel and one measurement.
pub fn evaluate_tree(
    tree: &ModelTree, values: &BTreeMap<String, f64>, m: &Measurement,
) -> FittingResult<f64> {
    match tree {
        ModelTree::Leaf(compartment) => compartment_signal(compartment, values, m),
        ModelTree::Node { op, children } => {
            let mut result = match op {
                TreeOp::Add => 0.0,
                TreeOp::Mul => 1.0,
            };
            for child in children {
                let value = evaluate_tree(child, values, m)?;
                match op {
                    TreeOp::Add => result += value,
                    TreeOp::Mul => result *= value,
                }
            }
            Ok(result)
        }
    }
}

/// Evaluate a model tree for one voxel over a measurement series.
pub fn evaluate_voxel(
    tree: &ModelTree, values: &BTreeMap<String, f64>, series: &[Measurement],
) -> FittingResult<Array1<f64>> {
    let mut signal = Array1::zeros(series.len());
    for (row, m) in series.iter().enumerate() {
        signal[row] = evaluate_tree(tree, values, m)?;
    }
    Ok(signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{composition::core::expression::parse_expression, registry::CompartmentRegistry};
    use approx::assert_relative_eq;

    fn along_z(b: f64) -> Measurement {
        Measurement {
            g: Some(Vector3::new(0.0, 0.0, 1.0)),
            b: Some(b),
            gradient_amplitude: None,
            pulse_separation: None,
            pulse_duration: None,
        }
    }

    #[test]
    // Purpose
    // -------
    // Ball attenuates as exp(-b d) independent of direction; Stick only
    // attenuates along its orientation.
    fn ball_and_stick_follow_their_signal_equations() {
        // Arrange
        let mut values = BTreeMap::new();
        values.insert("Ball.d".to_string(), 3.0e-9);
        values.insert("Stick.d".to_string(), 1.7e-9);
        values.insert("Stick.theta".to_string(), 0.0);
        values.insert("Stick.phi".to_string(), 0.0);
        let ball = Compartment::new(CompartmentKind::Ball).unwrap();
        let stick = Compartment::new(CompartmentKind::Stick).unwrap();
        let b = 1.0e9;

        // Act
        let ball_signal = compartment_signal(&ball, &values, &along_z(b)).unwrap();
        let parallel = compartment_signal(&stick, &values, &along_z(b)).unwrap();
        let perpendicular = compartment_signal(
            &stick,
            &values,
            &Measurement { g: Some(Vector3::new(1.0, 0.0, 0.0)), ..along_z(b) },
        )
        .unwrap();

        // Assert
        assert_relative_eq!(ball_signal, (-b * 3.0e-9_f64).exp(), max_relative = 1e-12);
        assert_relative_eq!(parallel, (-b * 1.7e-9_f64).exp(), max_relative = 1e-12);
        assert_relative_eq!(perpendicular, 1.0, max_relative = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // An axially symmetric Tensor (dperp0 = dperp1) reduces to a zeppelin:
    // rotation by psi around the main axis must not change the signal.
    fn axially_symmetric_tensor_is_psi_invariant() {
        // Arrange
        let tensor = Compartment::new(CompartmentKind::Tensor).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Tensor.d".to_string(), 1.7e-9);
        values.insert("Tensor.dperp0".to_string(), 3.0e-10);
        values.insert("Tensor.dperp1".to_string(), 3.0e-10);
        values.insert("Tensor.theta".to_string(), 0.9);
        values.insert("Tensor.phi".to_string(), 0.4);
        let m = Measurement {
            g: Some(Vector3::new(0.6, 0.64, 0.48).normalize()),
            ..along_z(2.0e9)
        };

        // Act
        values.insert("Tensor.psi".to_string(), 0.0);
        let at_zero = compartment_signal(&tensor, &values, &m).unwrap();
        values.insert("Tensor.psi".to_string(), 1.3);
        let rotated = compartment_signal(&tensor, &values, &m).unwrap();

        // Assert
        assert_relative_eq!(at_zero, rotated, max_relative = 1e-10);
    }

    #[test]
    // Purpose
    // -------
    // The Watson average interpolates between a stick and an isotropic
    // average: very high kappa approaches the undispersed stick, and the
    // signal is bounded by the extreme projections.
    fn watson_dispersion_limits() {
        // Arrange: gradient aligned with the mean direction.
        let b: f64 = 2.0e9;
        let d: f64 = 1.7e-9;
        let stick_parallel: f64 = (-b * d).exp();

        // Act
        let tight = watson_dispersed_stick(b, d, 64.0, 1.0);
        let loose = watson_dispersed_stick(b, d, 1e-5, 1.0);

        // Assert: tight dispersion stays close to the bare stick; loose
        // dispersion spreads orientations away from the gradient, so less
        // of the population attenuates and the average signal rises.
        assert!((tight - stick_parallel).abs() < 0.05);
        assert!(loose > tight);
        assert!(loose < 1.0);

        // Second moment: isotropic limit is 1/3, aligned tight limit → 1.
        assert_relative_eq!(watson_second_moment(1e-5, 0.7), 1.0 / 3.0, epsilon = 0.01);
        assert!(watson_second_moment(64.0, 1.0) > 0.9);
    }

    #[test]
    // Purpose
    // -------
    // Tree evaluation composes leaves with the declared operators: the
    // Ball & Stick signal is s0 * (w_ball * ball + w_stick * stick).
    fn tree_evaluation_composes_compartments() {
        // Arrange
        let registry = CompartmentRegistry::builtin();
        let tree = parse_expression(
            "S0 * ( (Weight(w_ball) * Ball) + (Weight(w_stick) * Stick) )",
            &registry,
        )
        .unwrap();
        let mut values = BTreeMap::new();
        values.insert("S0.s0".to_string(), 1.0e4);
        values.insert("w_ball.w".to_string(), 0.3);
        values.insert("w_stick.w".to_string(), 0.7);
        values.insert("Ball.d".to_string(), 3.0e-9);
        values.insert("Stick.d".to_string(), 1.7e-9);
        values.insert("Stick.theta".to_string(), 0.0);
        values.insert("Stick.phi".to_string(), 0.0);
        let b = 1.0e9;
        let m = along_z(b);

        // Act
        let signal = evaluate_tree(&tree, &values, &m).unwrap();

        // Assert
        let expected =
            1.0e4 * (0.3 * (-b * 3.0e-9_f64).exp() + 0.7 * (-b * 1.7e-9_f64).exp());
        assert_relative_eq!(signal, expected, max_relative = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // A compartment that needs the b column fails with a structured error
    // when the measurement does not carry one.
    fn missing_measurement_field_is_reported() {
        // Arrange
        let ball = Compartment::new(CompartmentKind::Ball).unwrap();
        let mut values = BTreeMap::new();
        values.insert("Ball.d".to_string(), 3.0e-9);
        let m = Measurement {
            g: None,
            b: None,
            gradient_amplitude: None,
            pulse_separation: None,
            pulse_duration: None,
        };

        // Act & Assert
        match compartment_signal(&ball, &values, &m) {
            Err(FittingError::MissingProtocolColumn { name }) => assert_eq!(name, "b"),
            other => panic!("expected MissingProtocolColumn error, got: {other:?}"),
        }
    }
}
