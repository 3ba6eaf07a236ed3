use crate::errors::{MatchError, MatchResult};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "vehicle_match.toml";
pub const ENV_PREFIX: &str = "VEHICLE_MATCH_";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Validation runs every this many epochs, and always on the last one.
    pub validation_interval: usize,
    pub validation_ratio: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 200,
            learning_rate: 1e-3,
            validation_interval: 20,
            validation_ratio: 0.2,
            seed: 42,
        }
    }
}

// Per-stream salts so data generation, the split and initialisation draw
// from unrelated generators under one configured seed.
const SYNTHETIC_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;
const SPLIT_SEED_SALT: u64 = 0xBF58_476D_1CE4_E5B9;
const INIT_SEED_SALT: u64 = 0x94D0_49BB_1331_11EB;

impl TrainingConfig {
    /// Seed for the synthetic dataset generator.
    pub fn synthetic_seed(&self) -> u64 {
        self.seed ^ SYNTHETIC_SEED_SALT
    }

    /// Seed for the train/validation shuffle.
    pub fn split_seed(&self) -> u64 {
        self.seed ^ SPLIT_SEED_SALT
    }

    /// Seed for parameter initialisation.
    pub fn init_seed(&self) -> u64 {
        self.seed ^ INIT_SEED_SALT
    }

    pub fn validate(&self) -> MatchResult<()> {
        if self.epochs == 0 {
            return Err(MatchError::config("training.epochs must be at least 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(MatchError::config(
                "training.learning_rate must be a positive finite number",
            ));
        }
        if self.validation_interval == 0 {
            return Err(MatchError::config(
                "training.validation_interval must be at least 1",
            ));
        }
        if !(self.validation_ratio > 0.0 && self.validation_ratio < 1.0) {
            return Err(MatchError::config(
                "training.validation_ratio must be strictly between 0 and 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MatchConfig {
    pub log_level: String,
    pub checkpoint_path: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            checkpoint_path: "models/match_model.json".to_string(),
            server: ServerConfig::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> MatchResult<()> {
        if self.checkpoint_path.trim().is_empty() {
            return Err(MatchError::config("checkpoint_path cannot be empty"));
        }
        if self.server.host.trim().is_empty() {
            return Err(MatchError::config("server.host cannot be empty"));
        }
        self.training.validate()
    }
}

/// Layer defaults, then `vehicle_match.toml`, then `VEHICLE_MATCH_*` env vars.
pub fn figment() -> Figment {
    Figment::from(Serialized::defaults(MatchConfig::default()))
        .merge(Toml::file(CONFIG_FILE))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

pub fn load_config() -> MatchResult<MatchConfig> {
    load_from(figment())
}

pub fn load_from(figment: Figment) -> MatchResult<MatchConfig> {
    let config = extract_from(figment)?;
    config.validate()?;
    Ok(config)
}

/// Layered config without validation, for callers that apply their own
/// overrides and validate the merged result.
pub fn extract_config() -> MatchResult<MatchConfig> {
    extract_from(figment())
}

pub fn extract_from(figment: Figment) -> MatchResult<MatchConfig> {
    Ok(figment.extract()?)
}
