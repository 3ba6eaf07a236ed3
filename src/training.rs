//! Full-batch training loop for the match model.
//!
//! The trainer moves through `Initialized → Training { epoch } → Completed`
//! exactly once: [`Trainer::run`] consumes it. Parameters live in candle
//! `Var`s during the run and come back as plain [`ModelParameters`].

use crate::checkpoint::TrainingSummary;
use crate::config_loader::TrainingConfig;
use crate::dataset::Dataset;
use crate::errors::{MatchError, MatchResult};
use crate::feature_schema::FEATURE_COUNT;
use crate::match_model::ModelParameters;
use candle_core::{DType, Device, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

/// Probability at or above which a prediction counts as a match.
pub const DECISION_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingState {
    Initialized,
    Training { epoch: usize },
    Completed,
}

/// Metrics recorded at each validation checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: f64,
    pub validation_accuracy: f64,
}

#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub parameters: ModelParameters,
    pub history: Vec<EpochMetrics>,
    pub summary: TrainingSummary,
}

/// Binary cross-entropy on logits:
/// `mean(max(z, 0) - z * y + ln(1 + e^(-|z|)))`.
pub fn bce_with_logits(logits: &Tensor, targets: &Tensor) -> candle_core::Result<Tensor> {
    let softplus = logits.abs()?.neg()?.exp()?.affine(1.0, 1.0)?.log()?;
    logits
        .relu()?
        .sub(&logits.mul(targets)?)?
        .add(&softplus)?
        .mean_all()
}

/// Training data staged as tensors on the backend device.
struct Batch {
    xs: Tensor,
    ys: Tensor,
    labels: Vec<f32>,
}

impl Batch {
    fn new(dataset: &Dataset, device: &Device) -> MatchResult<Self> {
        let n = dataset.len();
        let xs = Tensor::from_vec(dataset.feature_matrix(), (n, FEATURE_COUNT), device)
            .map_err(|e| MatchError::tensor("staging features", e))?;
        let labels = dataset.labels();
        let ys = Tensor::from_vec(labels.clone(), (n, 1), device)
            .map_err(|e| MatchError::tensor("staging labels", e))?;
        Ok(Self { xs, ys, labels })
    }
}

pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    weights: Var,
    bias: Var,
    state: TrainingState,
}

impl Trainer {
    /// Initialise parameters from the configured seed.
    ///
    /// Weights are uniform in `±1/sqrt(d)`, the bias starts at zero.
    pub fn new(config: TrainingConfig) -> MatchResult<Self> {
        config.validate()?;
        let device = Device::Cpu;

        let bound = 1.0 / (FEATURE_COUNT as f32).sqrt();
        let mut rng = StdRng::seed_from_u64(config.init_seed());
        let init: Vec<f32> = (0..FEATURE_COUNT)
            .map(|_| rng.random_range(-bound..bound))
            .collect();

        let weights = Var::from_tensor(&Tensor::from_vec(init, (FEATURE_COUNT, 1), &device)?)?;
        let bias = Var::from_tensor(&Tensor::zeros(1, DType::F32, &device)?)?;

        Ok(Self {
            config,
            device,
            weights,
            bias,
            state: TrainingState::Initialized,
        })
    }

    pub fn state(&self) -> TrainingState {
        self.state
    }

    fn logits(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        xs.matmul(self.weights.as_tensor())?
            .broadcast_add(self.bias.as_tensor())
    }

    /// Loss and thresholded accuracy without touching the parameters.
    fn evaluate(&self, batch: &Batch) -> MatchResult<(f64, f64)> {
        let logits = self.logits(&batch.xs)?;
        let loss = bce_with_logits(&logits, &batch.ys)?.to_scalar::<f32>()?;

        let probs = candle_nn::ops::sigmoid(&logits)?
            .flatten_all()?
            .to_vec1::<f32>()?;
        let correct = probs
            .iter()
            .zip(batch.labels.iter())
            .filter(|(p, y)| (**p >= DECISION_THRESHOLD) == (**y > 0.5))
            .count();

        Ok((f64::from(loss), correct as f64 / batch.labels.len() as f64))
    }

    fn snapshot(&self) -> MatchResult<ModelParameters> {
        let weights = self
            .weights
            .as_tensor()
            .flatten_all()?
            .to_vec1::<f32>()?
            .into_iter()
            .map(f64::from)
            .collect();
        let bias = self.bias.as_tensor().to_vec1::<f32>()?;
        let bias = bias
            .first()
            .copied()
            .ok_or_else(|| MatchError::internal("bias tensor is empty"))?;
        Ok(ModelParameters::new(weights, f64::from(bias)))
    }

    /// Train on `train`, validating on `validation` every
    /// `validation_interval` epochs and after the last epoch.
    ///
    /// A non-finite loss aborts the run with `TrainingDivergence`.
    pub fn run(mut self, train: &Dataset, validation: &Dataset) -> MatchResult<TrainingOutcome> {
        if train.is_empty() {
            return Err(MatchError::dataset("training split is empty"));
        }
        if validation.is_empty() {
            return Err(MatchError::dataset("validation split is empty"));
        }

        let train_batch = Batch::new(train, &self.device)?;
        let val_batch = Batch::new(validation, &self.device)?;

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(vec![self.weights.clone(), self.bias.clone()], params)?;

        let epochs = self.config.epochs;
        let started = Instant::now();
        let mut history = Vec::new();
        let mut last_train_loss = f64::NAN;

        tracing::info!(
            epochs,
            learning_rate = self.config.learning_rate,
            train_rows = train.len(),
            validation_rows = validation.len(),
            seed = self.config.seed,
            "training started"
        );

        for epoch in 1..=epochs {
            self.state = TrainingState::Training { epoch };

            let logits = self.logits(&train_batch.xs)?;
            let loss = bce_with_logits(&logits, &train_batch.ys)?;
            let train_loss = f64::from(loss.to_scalar::<f32>()?);
            if !train_loss.is_finite() {
                tracing::error!(epoch, loss = train_loss, "training loss is not finite");
                return Err(MatchError::TrainingDivergence {
                    epoch,
                    loss: train_loss,
                });
            }

            optimizer
                .backward_step(&loss)
                .map_err(|e| MatchError::tensor("optimizer step", e))?;
            last_train_loss = train_loss;

            if epoch % self.config.validation_interval == 0 || epoch == epochs {
                let (validation_loss, validation_accuracy) = self.evaluate(&val_batch)?;
                if !validation_loss.is_finite() {
                    return Err(MatchError::TrainingDivergence {
                        epoch,
                        loss: validation_loss,
                    });
                }
                tracing::info!(
                    epoch,
                    epochs,
                    train_loss,
                    validation_loss,
                    validation_accuracy,
                    "validation"
                );
                history.push(EpochMetrics {
                    epoch,
                    train_loss,
                    validation_loss,
                    validation_accuracy,
                });
            }
        }

        let parameters = self.snapshot()?;
        if !parameters.is_finite() {
            return Err(MatchError::TrainingDivergence {
                epoch: epochs,
                loss: last_train_loss,
            });
        }
        self.state = TrainingState::Completed;

        let last = history
            .last()
            .cloned()
            .ok_or_else(|| MatchError::internal("training finished without validation"))?;
        let summary = TrainingSummary {
            epochs,
            learning_rate: self.config.learning_rate,
            seed: self.config.seed,
            validation_ratio: self.config.validation_ratio,
            train_rows: train.len(),
            validation_rows: validation.len(),
            final_train_loss: last_train_loss,
            final_validation_loss: last.validation_loss,
            final_validation_accuracy: last.validation_accuracy,
            completed_at: Utc::now(),
        };

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            final_validation_accuracy = last.validation_accuracy,
            "training completed"
        );

        Ok(TrainingOutcome {
            parameters,
            history,
            summary,
        })
    }
}

/// Split `dataset` per `config` and train a fresh model on it.
pub fn train_from_dataset(dataset: &Dataset, config: &TrainingConfig) -> MatchResult<TrainingOutcome> {
    config.validate()?;
    let (train, validation) = dataset.split(config.validation_ratio, config.split_seed())?;
    Trainer::new(config.clone())?.run(&train, &validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{synthetic_records, TrainingRecord};

    fn dataset(rows: usize, seed: u64) -> Dataset {
        Dataset::from_records(synthetic_records(rows, seed).unwrap()).unwrap()
    }

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            epochs: 40,
            learning_rate: 0.05,
            validation_interval: 10,
            validation_ratio: 0.2,
            seed: 42,
        }
    }

    #[test]
    fn bce_matches_closed_form() {
        let device = Device::Cpu;
        let logits = Tensor::new(&[[0.0f32], [2.0], [-1.0]], &device).unwrap();
        let targets = Tensor::new(&[[1.0f32], [0.0], [0.0]], &device).unwrap();
        let loss = bce_with_logits(&logits, &targets).unwrap().to_scalar::<f32>().unwrap();

        let sig = |z: f64| 1.0 / (1.0 + (-z).exp());
        let expected = (-(sig(0.0).ln()) - (1.0 - sig(2.0)).ln() - (1.0 - sig(-1.0)).ln()) / 3.0;
        assert!((f64::from(loss) - expected).abs() < 1e-5);
    }

    #[test]
    fn trainer_starts_initialized() {
        let trainer = Trainer::new(quick_config()).unwrap();
        assert_eq!(trainer.state(), TrainingState::Initialized);
    }

    #[test]
    fn history_follows_validation_interval() {
        let config = TrainingConfig {
            epochs: 25,
            ..quick_config()
        };
        let outcome = train_from_dataset(&dataset(200, 5), &config).unwrap();
        let epochs: Vec<usize> = outcome.history.iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![10, 20, 25]);
        assert_eq!(outcome.summary.epochs, 25);
        assert_eq!(outcome.parameters.input_dim(), FEATURE_COUNT);
    }

    #[test]
    fn loss_decreases_on_learnable_data() {
        let outcome = train_from_dataset(&dataset(400, 9), &quick_config()).unwrap();
        let first = outcome.history.first().unwrap();
        let last = outcome.history.last().unwrap();
        assert!(last.train_loss < first.train_loss);
        assert!(outcome.parameters.is_finite());
    }

    #[test]
    fn same_seed_reproduces_parameters() {
        let ds = dataset(300, 11);
        let a = train_from_dataset(&ds, &quick_config()).unwrap();
        let b = train_from_dataset(&ds, &quick_config()).unwrap();
        for (wa, wb) in a.parameters.weights.iter().zip(b.parameters.weights.iter()) {
            assert!((wa - wb).abs() < 1e-6);
        }
        assert!((a.parameters.bias - b.parameters.bias).abs() < 1e-6);
    }

    #[test]
    fn probability_of_one_half_counts_as_a_match() {
        let trainer = Trainer::new(quick_config()).unwrap();
        let zeros = Tensor::zeros((FEATURE_COUNT, 1), DType::F32, &trainer.device).unwrap();
        trainer.weights.set(&zeros).unwrap();

        // Zero weights and bias give logit 0 and p = 0.5 for every row.
        let records: Vec<TrainingRecord> = synthetic_records(4, 8)
            .unwrap()
            .into_iter()
            .zip([1u8, 0, 1, 1])
            .map(|(mut r, label)| {
                r.label = label;
                r
            })
            .collect();
        let batch = Batch::new(&Dataset::from_records(records).unwrap(), &trainer.device).unwrap();

        let (loss, accuracy) = trainer.evaluate(&batch).unwrap();
        assert_eq!(accuracy, 0.75);
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn empty_split_is_rejected() {
        let trainer = Trainer::new(quick_config()).unwrap();
        let err = trainer.run(&dataset(10, 1), &Dataset::default()).unwrap_err();
        assert!(matches!(err, MatchError::Dataset { .. }));
    }

    #[test]
    fn exploding_run_aborts_with_divergence() {
        // Near-zero budgets make price_gap huge; an absurd learning rate
        // then pushes the logits past f32 range.
        let records: Vec<TrainingRecord> = synthetic_records(40, 2)
            .unwrap()
            .into_iter()
            .map(|mut r| {
                r.car_price = 1.0e9;
                r.user_budget = 0.0;
                r
            })
            .collect();
        let config = TrainingConfig {
            epochs: 5,
            learning_rate: 1.0e38,
            validation_interval: 1,
            validation_ratio: 0.25,
            seed: 3,
        };
        let err = train_from_dataset(&Dataset::from_records(records).unwrap(), &config).unwrap_err();
        assert!(matches!(err, MatchError::TrainingDivergence { .. }));
    }
}
