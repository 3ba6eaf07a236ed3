//! Library root for the `vehicle_match` crate

// Core error handling
pub mod errors;

// Feature construction
pub mod feature_schema;
pub mod feature_vector;
pub mod match_request;

// Model & persistence
pub mod checkpoint;
pub mod match_model;

// Training
pub mod dataset;
pub mod training;

// Inference service & web interface
pub mod match_service;
pub mod matchweb;

// Configuration, logging & CLI
pub mod cli;
pub mod config_loader;
pub mod logging;

pub use errors::{MatchError, MatchResult};
pub use feature_vector::{build_feature_vector, FeatureVector};
pub use match_model::{MatchModel, ModelParameters};
pub use match_request::MatchRequest;
pub use match_service::{MatchResponse, MatchService, ScoringGate};
