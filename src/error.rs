//! Error types for Drive Sense

use thiserror::Error;

use crate::classifier::ClassifierError;

/// Errors that can occur while ingesting readings or producing verdicts
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Malformed reading: {0}")]
    MalformedReading(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Classifier failure: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
