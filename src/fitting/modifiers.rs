//! Post-optimization modifiers: derived maps computed from fitted results.
//!
//! After optimization and materialization every model parameter has a
//! per-voxel map; modifiers derive additional maps from them — e.g. the
//! Ball & Stick `FS` (stick fraction) or the NODDI `NDI`/`ODI` indices.
//! Modifiers are declared on the model config and applied in declaration
//! order, so a later modifier may read a map produced by an earlier one.
use crate::fitting::{
    composite::ResultsMap,
    errors::{FittingError, FittingResult},
};
use ndarray::Array1;

/// Closed set of derived-map expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum ModifierExpr {
    /// Copy an existing map under the modifier's name.
    Map { source: String },

    /// `1 − source`; e.g. the stick fraction `FS = 1 − w_ball.w`.
    OneMinus { source: String },

    /// `numerator / Σ(denominator)` per voxel; e.g. the neurite density
    /// index `NDI = w_ic / (w_ic + w_ec)`.
    Fraction { numerator: String, denominator: Vec<String> },

    /// Orientation dispersion index from a Watson concentration map:
    /// `ODI = (2/π) · atan2(1, κ·10)`.
    OrientationDispersion { kappa: String },
}

impl ModifierExpr {
    /// Names of the maps this expression reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            ModifierExpr::Map { source } | ModifierExpr::OneMinus { source } => {
                vec![source.as_str()]
            }
            ModifierExpr::Fraction { numerator, denominator } => {
                let mut inputs = vec![numerator.as_str()];
                inputs.extend(denominator.iter().map(String::as_str));
                inputs
            }
            ModifierExpr::OrientationDispersion { kappa } => vec![kappa.as_str()],
        }
    }

    /// Evaluate the expression over a results dictionary.
    ///
    /// ## Errors
    /// - `FittingError::MissingResultMap` when an input map is absent.
    pub fn evaluate(&self, results: &ResultsMap) -> FittingResult<Array1<f64>> {
        let lookup = |name: &str| -> FittingResult<&Array1<f64>> {
            results.get(name).ok_or_else(|| FittingError::MissingResultMap {
                name: name.to_string(),
            })
        };
        match self {
            ModifierExpr::Map { source } => Ok(lookup(source)?.clone()),
            ModifierExpr::OneMinus { source } => Ok(lookup(source)?.mapv(|v| 1.0 - v)),
            ModifierExpr::Fraction { numerator, denominator } => {
                let numerator = lookup(numerator)?;
                let mut total = Array1::zeros(numerator.len());
                for name in denominator {
                    total += lookup(name)?;
                }
                Ok(numerator / &total)
            }
            ModifierExpr::OrientationDispersion { kappa } => {
                Ok(lookup(kappa)?
                    .mapv(|k| 2.0 / std::f64::consts::PI * 1.0_f64.atan2(k * 10.0)))
            }
        }
    }
}

/// A named derived map.
#[derive(Debug, Clone, PartialEq)]
pub struct PostOptimizationModifier {
    pub name: String,
    pub expr: ModifierExpr,
}

impl PostOptimizationModifier {
    pub fn new(name: &str, expr: ModifierExpr) -> PostOptimizationModifier {
        PostOptimizationModifier { name: name.to_string(), expr }
    }
}

/// Apply modifiers in declaration order, inserting each derived map into
/// `results` so later modifiers can read it.
pub fn apply_modifiers(
    modifiers: &[PostOptimizationModifier], results: &mut ResultsMap,
) -> FittingResult<()> {
    for modifier in modifiers {
        let map = modifier.expr.evaluate(results)?;
        results.insert(modifier.name.clone(), map);
    }
    Ok(())
}
