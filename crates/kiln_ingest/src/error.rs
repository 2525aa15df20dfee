//! Error types for ingestion.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors that can occur while configuring or running ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Targets file not found: {0}")]
    TargetsNotFound(PathBuf),

    #[error("Invalid extraction target '{path}': {reason}")]
    InvalidTarget { path: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
