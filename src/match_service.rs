//! Inference side of the pipeline: a frozen model bound to the active
//! feature schema, plus the process-wide gate that holds it.

use crate::checkpoint::{Checkpoint, TrainingSummary};
use crate::errors::{MatchError, MatchResult};
use crate::feature_schema::{self, FEATURE_COUNT, SCHEMA_VERSION};
use crate::feature_vector::build_feature_vector;
use crate::match_model::MatchModel;
use crate::match_request::MatchRequest;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResponse {
    pub match_score: f64,
    pub match_score_percent: u8,
}

impl MatchResponse {
    /// Percentage is rounded half away from zero.
    pub fn from_score(match_score: f64) -> Self {
        let percent = (match_score * 100.0).round().clamp(0.0, 100.0) as u8;
        Self {
            match_score,
            match_score_percent: percent,
        }
    }
}

/// Metadata about the loaded checkpoint, for status endpoints and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub schema_version: String,
    pub schema_fingerprint: String,
    pub feature_names: Vec<String>,
    pub input_dim: usize,
    pub parameters_sha256: String,
    pub training: TrainingSummary,
    pub saturation_events: u64,
}

#[derive(Debug)]
pub struct MatchService {
    model: MatchModel,
    checkpoint: Checkpoint,
}

impl MatchService {
    /// Bind a checkpoint to the active schema.
    ///
    /// Any mismatch in dimension, schema version or feature order is fatal.
    pub fn from_checkpoint(checkpoint: Checkpoint) -> MatchResult<Self> {
        checkpoint.verify_schema()?;
        if checkpoint.parameters.input_dim() != FEATURE_COUNT {
            return Err(MatchError::schema_mismatch(
                SCHEMA_VERSION,
                format!(
                    "checkpoint stores {} weights, schema has {FEATURE_COUNT} features",
                    checkpoint.parameters.input_dim()
                ),
            ));
        }

        let model = MatchModel::new(checkpoint.parameters.clone())?;
        Ok(Self { model, checkpoint })
    }

    /// Read, verify and bind a checkpoint file.
    pub fn load(path: impl AsRef<Path>) -> MatchResult<Self> {
        let path = path.as_ref();
        let checkpoint = Checkpoint::load(path)?;
        let service = Self::from_checkpoint(checkpoint)?;
        tracing::info!(
            path = %path.display(),
            schema = SCHEMA_VERSION,
            input_dim = service.model.input_dim(),
            sha256 = %service.checkpoint.parameters_sha256,
            "match model loaded"
        );
        Ok(service)
    }

    pub fn score(&self, req: &MatchRequest) -> MatchResult<MatchResponse> {
        let features = build_feature_vector(req)?;
        let score = self.model.score(features.as_slice())?;
        tracing::debug!(match_score = score, "scored request");
        Ok(MatchResponse::from_score(score))
    }

    pub fn score_json(&self, payload: serde_json::Value) -> MatchResult<MatchResponse> {
        let req = MatchRequest::from_value(payload)?;
        self.score(&req)
    }

    pub fn model(&self) -> &MatchModel {
        &self.model
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            schema_version: self.checkpoint.schema_version.clone(),
            schema_fingerprint: feature_schema::schema_fingerprint(),
            feature_names: self.checkpoint.feature_names.clone(),
            input_dim: self.checkpoint.input_dim,
            parameters_sha256: self.checkpoint.parameters_sha256.clone(),
            training: self.checkpoint.training.clone(),
            saturation_events: self.model.saturation_events(),
        }
    }
}

/// Readiness gate in front of the scoring service.
///
/// Requests arriving before [`ScoringGate::install`] are rejected with
/// `NotReady` rather than queued. A gate accepts exactly one service.
#[derive(Debug, Default)]
pub struct ScoringGate {
    service: OnceLock<Arc<MatchService>>,
}

impl ScoringGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, service: MatchService) -> MatchResult<()> {
        self.service
            .set(Arc::new(service))
            .map_err(|_| MatchError::internal("a match model is already installed"))?;
        tracing::info!("scoring gate open");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.service.get().is_some()
    }

    pub fn service(&self) -> MatchResult<Arc<MatchService>> {
        self.service.get().cloned().ok_or(MatchError::NotReady)
    }
}
