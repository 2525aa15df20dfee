//! Error types for the runner module.

use thiserror::Error;

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Errors that can occur during process orchestration.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("No free port in {base}..{end}")]
    PortsExhausted { base: u16, end: u32 },

    #[error("Failed to spawn '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("Server exited before becoming ready (exit code {exit_code:?}): {output}")]
    StartFailed {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("Command timed out after {0} seconds")]
    Timeout(u64),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid orchestrator configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Spec(#[from] kiln_spec::SpecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunnerError {
    /// Whether the error is a deployment failure rather than a start failure.
    pub fn is_deployment(&self) -> bool {
        matches!(self, Self::DeploymentFailed(_))
    }
}
