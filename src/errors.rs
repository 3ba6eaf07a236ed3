//! Error handling for the vehicle match pipeline
//!
//! One structured error type covers request validation, schema and
//! checkpoint compatibility, training failures and the I/O around them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Main error type for the match-scoring pipeline
#[derive(Error, Debug)]
pub enum MatchError {
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Checkpoint incompatible with feature schema {schema}: {message}")]
    SchemaMismatch { schema: String, message: String },

    #[error("Feature vector length {actual} does not match model input dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Training diverged at epoch {epoch}: loss is {loss}")]
    TrainingDivergence { epoch: usize, loss: f64 },

    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    #[error("Dataset error: {message}")]
    Dataset { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {context}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV parsing failed")]
    Csv {
        #[source]
        source: csv::Error,
    },

    #[error("Tensor operation failed: {operation}")]
    Tensor {
        operation: String,
        #[source]
        source: candle_core::Error,
    },

    #[error("Scoring service is not ready: no checkpoint installed")]
    NotReady,

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type MatchResult<T> = Result<T, MatchError>;

impl MatchError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            schema: schema.into(),
            message: message.into(),
        }
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn serialization(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            context: context.into(),
            source,
        }
    }

    /// Wrap a candle error with the operation that produced it
    pub fn tensor(operation: impl Into<String>, source: candle_core::Error) -> Self {
        Self::Tensor {
            operation: operation.into(),
            source,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            MatchError::Validation { .. } => StatusCode::BAD_REQUEST,
            MatchError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            // Everything else is a server-side failure
            MatchError::SchemaMismatch { .. }
            | MatchError::DimensionMismatch { .. }
            | MatchError::TrainingDivergence { .. }
            | MatchError::Checkpoint { .. }
            | MatchError::Dataset { .. }
            | MatchError::Config { .. }
            | MatchError::Io { .. }
            | MatchError::Serialization { .. }
            | MatchError::Csv { .. }
            | MatchError::Tensor { .. }
            | MatchError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
}

impl IntoResponse for MatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            Json(ErrBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl From<std::io::Error> for MatchError {
    fn from(err: std::io::Error) -> Self {
        MatchError::io("io_operation", err)
    }
}

impl From<serde_json::Error> for MatchError {
    fn from(err: serde_json::Error) -> Self {
        MatchError::serialization("json_operation", err)
    }
}

impl From<csv::Error> for MatchError {
    fn from(err: csv::Error) -> Self {
        MatchError::Csv { source: err }
    }
}

impl From<candle_core::Error> for MatchError {
    fn from(err: candle_core::Error) -> Self {
        MatchError::tensor("candle_operation", err)
    }
}

impl From<figment::Error> for MatchError {
    fn from(err: figment::Error) -> Self {
        MatchError::config(err.to_string())
    }
}
