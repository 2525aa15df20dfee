//! Error types for generation sessions.

use thiserror::Error;

/// Result type alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while running a generation session.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session already open: {0}")]
    AlreadyOpen(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Project '{project_id}' is busy with session {chat_id}")]
    ProjectBusy { project_id: String, chat_id: String },

    #[error("Generation stage '{stage}' failed: {message}")]
    Chain { stage: String, message: String },

    #[error("LLM not configured. Set OPENAI_API_KEY or ANTHROPIC_API_KEY")]
    LlmNotConfigured,

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Spec(#[from] kiln_spec::SpecError),

    #[error(transparent)]
    Template(#[from] kiln_templates::TemplateError),

    #[error(transparent)]
    Ingest(#[from] kiln_ingest::IngestError),

    #[error(transparent)]
    Runner(#[from] kiln_runner::RunnerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl SessionError {
    /// Whether the caller sent something unusable (maps to HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::Spec(kiln_spec::SpecError::InvalidSubdomain { .. })
        )
    }
}
