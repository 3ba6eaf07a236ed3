//! Checkpoint persistence: the one artifact shared by training and inference.
//!
//! A checkpoint is a JSON document carrying the learned parameters, the
//! schema metadata they were trained against, and a digest of the
//! parameters. Writes go to a temporary file in the destination directory
//! and are renamed into place, so a reader never sees a partial file.

use crate::errors::{MatchError, MatchResult};
use crate::feature_schema::{self, FEATURE_COUNT, SCHEMA_VERSION};
use crate::match_model::ModelParameters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Hyperparameters and results of the run that produced a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: usize,
    pub learning_rate: f64,
    pub seed: u64,
    pub validation_ratio: f64,
    pub train_rows: usize,
    pub validation_rows: usize,
    pub final_train_loss: f64,
    pub final_validation_loss: f64,
    pub final_validation_accuracy: f64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub format_version: u32,
    pub schema_version: String,
    pub feature_names: Vec<String>,
    pub input_dim: usize,
    pub parameters: ModelParameters,
    pub parameters_sha256: String,
    pub training: TrainingSummary,
}

/// Digest over the serialized parameters.
pub fn parameters_digest(params: &ModelParameters) -> MatchResult<String> {
    let bytes = serde_json::to_vec(params)
        .map_err(|e| MatchError::serialization("digesting parameters", e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

impl Checkpoint {
    /// Bind freshly trained parameters to the active feature schema.
    pub fn new(parameters: ModelParameters, training: TrainingSummary) -> MatchResult<Self> {
        if parameters.input_dim() != FEATURE_COUNT {
            return Err(MatchError::schema_mismatch(
                SCHEMA_VERSION,
                format!(
                    "trained {} weights, schema has {FEATURE_COUNT} features",
                    parameters.input_dim()
                ),
            ));
        }
        if !parameters.is_finite() {
            return Err(MatchError::checkpoint(
                "refusing to checkpoint non-finite parameters",
            ));
        }

        let parameters_sha256 = parameters_digest(&parameters)?;
        Ok(Self {
            format_version: CHECKPOINT_FORMAT_VERSION,
            schema_version: SCHEMA_VERSION.to_string(),
            feature_names: feature_schema::feature_names(),
            input_dim: FEATURE_COUNT,
            parameters,
            parameters_sha256,
            training,
        })
    }

    /// Verify the checkpoint's internal consistency.
    pub fn verify_integrity(&self) -> MatchResult<()> {
        if self.format_version != CHECKPOINT_FORMAT_VERSION {
            return Err(MatchError::checkpoint(format!(
                "unsupported checkpoint format version {}",
                self.format_version
            )));
        }
        if self.parameters.input_dim() != self.input_dim {
            return Err(MatchError::checkpoint(format!(
                "input_dim is {} but {} weights are stored",
                self.input_dim,
                self.parameters.input_dim()
            )));
        }
        let digest = parameters_digest(&self.parameters)?;
        if digest != self.parameters_sha256 {
            return Err(MatchError::checkpoint("parameter digest does not match"));
        }
        Ok(())
    }

    /// Verify that this checkpoint was trained against the active schema.
    pub fn verify_schema(&self) -> MatchResult<()> {
        feature_schema::check_compatible(&self.schema_version, &self.feature_names, self.input_dim)
    }

    pub fn to_json(&self) -> MatchResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MatchError::serialization("encoding checkpoint", e))
    }

    /// Read and integrity-check a checkpoint file.
    ///
    /// The schema check is left to the caller, see [`Checkpoint::verify_schema`].
    pub fn load(path: impl AsRef<Path>) -> MatchResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| MatchError::io(format!("reading checkpoint {}", path.display()), e))?;
        let checkpoint: Checkpoint = serde_json::from_str(&content)
            .map_err(|e| MatchError::serialization("decoding checkpoint", e))?;
        checkpoint.verify_integrity()?;
        Ok(checkpoint)
    }

    /// Write the checkpoint to `path`, replacing any existing file atomically.
    pub fn save(&self, path: impl AsRef<Path>) -> MatchResult<()> {
        let path = path.as_ref();
        let json = self.to_json()?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .map_err(|e| MatchError::io(format!("creating {}", dir.display()), e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| MatchError::io("creating temporary checkpoint", e))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| MatchError::io("writing temporary checkpoint", e))?;
        tmp.as_file()
            .sync_all()
            .map_err(|e| MatchError::io("syncing temporary checkpoint", e))?;
        tmp.persist(path)
            .map_err(|e| MatchError::io(format!("persisting {}", path.display()), e.error))?;

        tracing::info!(
            path = %path.display(),
            sha256 = %self.parameters_sha256,
            schema = %self.schema_version,
            "checkpoint written"
        );
        Ok(())
    }
}
