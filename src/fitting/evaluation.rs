//! Evaluation and signal-noise models: how predicted signals are compared
//! to observations.
//!
//! The evaluation model scores a predicted measurement series against the
//! observed one (here: an additive Gaussian noise likelihood); the signal
//! noise model transforms the noise-free prediction before scoring (here:
//! an offset floor matching magnitude data). Both are value types attached
//! to a [`CompositeModel`](super::composite::CompositeModel) and consumed
//! by external optimizers.
use crate::fitting::errors::{FittingError, FittingResult};
use ndarray::Array1;
use statrs::distribution::{Continuous, Normal};

/// Likelihood model scoring predictions against observations.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationModel {
    /// Additive zero-mean Gaussian noise with standard deviation `sigma`.
    Gaussian { sigma: f64 },
}

impl EvaluationModel {
    /// Gaussian evaluation model with validated `sigma`.
    ///
    /// ## Errors
    /// - `FittingError::InvalidSigma` when `sigma` is not finite and > 0.
    pub fn gaussian(sigma: f64) -> FittingResult<EvaluationModel> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(FittingError::InvalidSigma { value: sigma });
        }
        Ok(EvaluationModel::Gaussian { sigma })
    }

    /// Log-likelihood of one voxel's observations under the prediction.
    ///
    /// Sums the per-measurement residual log-density. Lengths must match;
    /// the caller (the composite model) guarantees this.
    pub fn log_likelihood(
        &self, predicted: &Array1<f64>, observed: &Array1<f64>,
    ) -> FittingResult<f64> {
        match self {
            EvaluationModel::Gaussian { sigma } => {
                let noise = Normal::new(0.0, *sigma)
                    .map_err(|_| FittingError::InvalidSigma { value: *sigma })?;
                Ok(predicted
                    .iter()
                    .zip(observed.iter())
                    .map(|(p, o)| noise.ln_pdf(o - p))
                    .sum())
            }
        }
    }
}

/// Transformation of the noise-free signal before likelihood evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalNoiseModel {
    /// Pass the prediction through unchanged.
    None,

    /// Magnitude-data noise floor: `sqrt(S² + eta²)`.
    JohnsonNoise { eta: f64 },
}

impl SignalNoiseModel {
    /// Apply the transformation in place.
    pub fn apply(&self, signal: &mut Array1<f64>) {
        match self {
            SignalNoiseModel::None => {}
            SignalNoiseModel::JohnsonNoise { eta } => {
                signal.iter_mut().for_each(|s| *s = (*s * *s + eta * eta).sqrt());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    // Purpose
    // -------
    // A perfect prediction scores higher than a biased one, and the
    // Gaussian log-likelihood matches the closed form.
    fn gaussian_log_likelihood_prefers_better_fits() {
        // Arrange
        let model = EvaluationModel::gaussian(10.0).unwrap();
        let observed = array![100.0, 90.0, 80.0];

        // Act
        let exact = model.log_likelihood(&observed.clone(), &observed).unwrap();
        let biased = model.log_likelihood(&array![110.0, 100.0, 90.0], &observed).unwrap();

        // Assert
        assert!(exact > biased);
        let sigma: f64 = 10.0;
        let per_obs = -0.5 * (2.0 * std::f64::consts::PI * sigma * sigma).ln();
        assert_relative_eq!(exact, 3.0 * per_obs, max_relative = 1e-12);
    }

    #[test]
    // Purpose
    // -------
    // `gaussian` rejects non-positive sigma.
    fn gaussian_rejects_invalid_sigma() {
        for bad in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                EvaluationModel::gaussian(bad),
                Err(FittingError::InvalidSigma { .. })
            ));
        }
    }

    #[test]
    // Purpose
    // -------
    // The Johnson noise floor lifts small signals towards eta and leaves
    // large signals nearly untouched.
    fn johnson_noise_floor() {
        // Arrange
        let noise = SignalNoiseModel::JohnsonNoise { eta: 5.0 };
        let mut signal = array![0.0, 1000.0];

        // Act
        noise.apply(&mut signal);

        // Assert
        assert_relative_eq!(signal[0], 5.0);
        assert_relative_eq!(signal[1], (1000.0_f64 * 1000.0 + 25.0).sqrt());

        // None is the identity.
        let mut untouched = array![1.0, 2.0];
        SignalNoiseModel::None.apply(&mut untouched);
        assert_eq!(untouched, array![1.0, 2.0]);
    }
}
