use crate::errors::{MatchError, MatchResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Largest magnitude of the logit before the sigmoid; beyond it the f64
/// sigmoid would round to exactly 0 or 1.
pub const SATURATION_LIMIT: f64 = 30.0;

/// Learned weights and bias of the linear match model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl ModelParameters {
    pub fn new(weights: Vec<f64>, bias: f64) -> Self {
        Self { weights, bias }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.len()
    }

    pub fn is_finite(&self) -> bool {
        self.bias.is_finite() && self.weights.iter().all(|w| w.is_finite())
    }
}

/// Logistic function on an already-clamped logit.
pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Linear model with logistic scoring
///
/// Parameters are fixed at construction; scoring only reads them, so one
/// instance can be shared across threads.
#[derive(Debug)]
pub struct MatchModel {
    params: ModelParameters,
    saturations: AtomicU64,
}

impl MatchModel {
    pub fn new(params: ModelParameters) -> MatchResult<Self> {
        if params.weights.is_empty() {
            return Err(MatchError::checkpoint("model has no weights"));
        }
        if !params.is_finite() {
            return Err(MatchError::checkpoint("model parameters contain non-finite values"));
        }
        Ok(Self {
            params,
            saturations: AtomicU64::new(0),
        })
    }

    pub fn input_dim(&self) -> usize {
        self.params.input_dim()
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.params
    }

    /// Number of scoring calls whose logit had to be clamped.
    pub fn saturation_events(&self) -> u64 {
        self.saturations.load(Ordering::Relaxed)
    }

    /// Raw logit `w · x + b`.
    pub fn logit(&self, features: &[f64]) -> MatchResult<f64> {
        if features.len() != self.params.weights.len() {
            return Err(MatchError::DimensionMismatch {
                expected: self.params.weights.len(),
                actual: features.len(),
            });
        }
        if let Some(pos) = features.iter().position(|x| !x.is_finite()) {
            return Err(MatchError::validation(
                "features",
                format!("feature {pos} is not finite"),
            ));
        }

        let z = self.params.bias
            + features
                .iter()
                .zip(self.params.weights.iter())
                .map(|(x, w)| x * w)
                .sum::<f64>();

        if z.is_nan() {
            return Err(MatchError::validation(
                "features",
                "feature vector produced a NaN logit",
            ));
        }
        Ok(z)
    }

    /// Match probability in the open interval (0, 1).
    pub fn score(&self, features: &[f64]) -> MatchResult<f64> {
        let z = self.logit(features)?;

        let clamped = z.clamp(-SATURATION_LIMIT, SATURATION_LIMIT);
        if clamped != z {
            self.saturations.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                logit = z,
                limit = SATURATION_LIMIT,
                "sigmoid saturated, input is likely out of distribution"
            );
        }

        Ok(sigmoid(clamped))
    }
}
