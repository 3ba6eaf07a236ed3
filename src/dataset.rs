//! Labeled training data: CSV loading, the seeded train/validation split,
//! and a synthetic generator for bootstrapping a model without real labels.

use crate::errors::{MatchError, MatchResult};
use crate::feature_schema::FEATURE_COUNT;
use crate::feature_vector::{build_feature_vector, FeatureVector};
use crate::match_request::MatchRequest;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One CSV row: the raw request fields plus the observed outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub car_price: f64,
    pub user_budget: f64,
    pub car_mpg: f64,
    pub desired_mpg: f64,
    pub avg_star_rating: f64,
    pub avg_sentiment: f64,
    pub num_reviews: u64,
    pub prefer_new: f64,
    pub prefer_used: f64,
    pub body_sedan: u8,
    pub body_suv: u8,
    pub label: u8,
}

impl TrainingRecord {
    pub fn from_request(req: &MatchRequest, label: u8) -> Self {
        Self {
            car_price: req.car_price,
            user_budget: req.user_budget,
            car_mpg: req.car_mpg,
            desired_mpg: req.desired_mpg,
            avg_star_rating: req.avg_star_rating,
            avg_sentiment: req.avg_sentiment,
            num_reviews: req.num_reviews,
            prefer_new: req.prefer_new,
            prefer_used: req.prefer_used,
            body_sedan: req.body_sedan,
            body_suv: req.body_suv,
            label,
        }
    }

    pub fn request(&self) -> MatchRequest {
        MatchRequest {
            car_price: self.car_price,
            user_budget: self.user_budget,
            car_mpg: self.car_mpg,
            desired_mpg: self.desired_mpg,
            avg_star_rating: self.avg_star_rating,
            avg_sentiment: self.avg_sentiment,
            num_reviews: self.num_reviews,
            prefer_new: self.prefer_new,
            prefer_used: self.prefer_used,
            body_sedan: self.body_sedan,
            body_suv: self.body_suv,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub features: FeatureVector,
    pub label: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    rows: Vec<LabeledRow>,
}

impl Dataset {
    /// Run every record through the feature builder.
    pub fn from_records<I>(records: I) -> MatchResult<Self>
    where
        I: IntoIterator<Item = TrainingRecord>,
    {
        let mut rows = Vec::new();
        for (i, record) in records.into_iter().enumerate() {
            if record.label > 1 {
                return Err(MatchError::dataset(format!(
                    "row {i}: label must be 0 or 1, got {}",
                    record.label
                )));
            }
            let features = build_feature_vector(&record.request())
                .map_err(|e| MatchError::dataset(format!("row {i}: {e}")))?;
            rows.push(LabeledRow {
                features,
                label: f32::from(record.label),
            });
        }
        Ok(Self { rows })
    }

    pub fn from_csv(path: impl AsRef<Path>) -> MatchResult<Self> {
        let path = path.as_ref();
        let mut rdr = csv::Reader::from_path(path)?;
        let records = rdr
            .deserialize::<TrainingRecord>()
            .collect::<Result<Vec<_>, _>>()?;
        let dataset = Self::from_records(records)?;
        tracing::info!(path = %path.display(), rows = dataset.len(), "dataset loaded");
        Ok(dataset)
    }

    pub fn rows(&self) -> &[LabeledRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row-major feature matrix, narrowed to `f32`.
    pub fn feature_matrix(&self) -> Vec<f32> {
        let mut xs = Vec::with_capacity(self.rows.len() * FEATURE_COUNT);
        for row in &self.rows {
            xs.extend(row.features.to_f32());
        }
        xs
    }

    pub fn labels(&self) -> Vec<f32> {
        self.rows.iter().map(|r| r.label).collect()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.rows.iter().filter(|r| r.label > 0.5).count() as f64 / self.rows.len() as f64
    }

    /// Seeded shuffle split into `(train, validation)`.
    ///
    /// The validation split gets `ceil(len * validation_ratio)` rows. Both
    /// splits must end up non-empty.
    pub fn split(&self, validation_ratio: f64, seed: u64) -> MatchResult<(Dataset, Dataset)> {
        if !(validation_ratio > 0.0 && validation_ratio < 1.0) {
            return Err(MatchError::dataset(format!(
                "validation ratio {validation_ratio} must be strictly between 0 and 1"
            )));
        }

        let n = self.rows.len();
        let n_val = (n as f64 * validation_ratio).ceil() as usize;
        if n_val == 0 || n_val >= n {
            return Err(MatchError::dataset(format!(
                "{n} rows cannot be split into non-empty train and validation sets"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let pick = |idx: &[usize]| Dataset {
            rows: idx.iter().map(|&i| self.rows[i].clone()).collect(),
        };
        let (val_idx, train_idx) = indices.split_at(n_val);
        Ok((pick(train_idx), pick(val_idx)))
    }
}

/// Write records as CSV with a header row.
pub fn write_csv(records: &[TrainingRecord], path: impl AsRef<Path>) -> MatchResult<()> {
    let mut wtr = csv::Writer::from_path(path.as_ref())?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()
        .map_err(|e| MatchError::io("flushing dataset csv", e))?;
    Ok(())
}

/// Weights of the latent rule that labels synthetic rows, in schema order.
const LATENT_WEIGHTS: [f64; FEATURE_COUNT] = [-4.0, 1.5, 2.0, 1.5, 0.2, 0.3, -0.3, 0.2, -0.1];
const LATENT_BIAS: f64 = -2.0;
/// Fraction of synthetic labels flipped at random.
const LABEL_NOISE: f64 = 0.05;

fn random_request(rng: &mut StdRng) -> MatchRequest {
    let prefer_new: f64 = rng.random_range(0.0..=1.0);
    let sedan = rng.random_bool(0.5);
    MatchRequest {
        car_price: rng.random_range(12_000.0..60_000.0),
        user_budget: rng.random_range(15_000.0..50_000.0),
        car_mpg: rng.random_range(18.0..50.0),
        desired_mpg: rng.random_range(20.0..45.0),
        avg_star_rating: rng.random_range(1.0..=5.0),
        avg_sentiment: rng.random_range(-1.0..=1.0),
        num_reviews: rng.random_range(0..500),
        prefer_new,
        prefer_used: 1.0 - prefer_new,
        body_sedan: u8::from(sedan),
        body_suv: u8::from(!sedan),
    }
}

/// Generate `rows` plausible records labelled by a fixed linear rule over
/// the built features, with a small amount of label noise.
pub fn synthetic_records(rows: usize, seed: u64) -> MatchResult<Vec<TrainingRecord>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(rows);

    for _ in 0..rows {
        let req = random_request(&mut rng);
        let features = build_feature_vector(&req)?;
        let latent = LATENT_BIAS
            + features
                .as_slice()
                .iter()
                .zip(LATENT_WEIGHTS.iter())
                .map(|(x, w)| x * w)
                .sum::<f64>();

        let mut label = u8::from(latent > 0.0);
        if rng.random_bool(LABEL_NOISE) {
            label = 1 - label;
        }
        records.push(TrainingRecord::from_request(&req, label));
    }

    Ok(records)
}
