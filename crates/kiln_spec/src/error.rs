//! Error types for the spec module.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for spec operations.
pub type SpecResult<T> = Result<T, SpecError>;

/// Errors that can occur while loading schemas or inspecting projects.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Project directory not found: {0}")]
    ProjectNotFound(PathBuf),

    #[error("Schema not found: {0}")]
    SchemaNotFound(PathBuf),

    #[error("Unsupported schema format for {0} (expected .yaml, .yml, .json or .toml)")]
    UnsupportedSchemaFormat(PathBuf),

    #[error("Invalid subdomain '{raw}': {reason}")]
    InvalidSubdomain { raw: String, reason: String },

    #[error("Invalid glob pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),
}
