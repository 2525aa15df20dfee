//! Generation session state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kiln_runner::ServerHandle;
use kiln_spec::slug::DEFAULT_PROJECT_SLUG;
use kiln_spec::{slugify, ValidationSummary};

use crate::chain::StageRecord;
use crate::events::PipelineStep;

/// Longest prompt-derived prefix of a generated project id.
const PROJECT_PREFIX_LEN: usize = 30;

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Complete,
    Failed,
}

/// A file written for the session's project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFile {
    pub path: String,
    pub source: kiln_spec::FileSource,
    pub bytes: usize,
}

/// Raw text returned by one generation stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutput {
    pub index: usize,
    pub stage: String,
    pub output: String,
}

impl From<&StageRecord> for StageOutput {
    fn from(record: &StageRecord) -> Self {
        Self {
            index: record.index,
            stage: record.stage.clone(),
            output: record.output.clone(),
        }
    }
}

/// One prompt-to-running-project attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSession {
    pub chat_id: String,
    pub project_id: String,
    pub prompt: String,
    pub subdomain: Option<String>,
    pub project_dir: PathBuf,
    pub status: SessionStatus,
    pub step: PipelineStep,
    /// Chain outputs in stage order
    #[serde(default)]
    pub stages: Vec<StageOutput>,
    pub files: Vec<SessionFile>,
    pub missing_required: Vec<String>,
    pub unresolved_dependencies: Vec<String>,
    pub validation: Option<ValidationSummary>,
    pub server: Option<ServerHandle>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GenerationSession {
    pub fn new(
        chat_id: impl Into<String>,
        project_id: impl Into<String>,
        prompt: impl Into<String>,
        project_dir: PathBuf,
    ) -> Self {
        let now = Utc::now();
        Self {
            chat_id: chat_id.into(),
            project_id: project_id.into(),
            prompt: prompt.into(),
            subdomain: None,
            project_dir,
            status: SessionStatus::Running,
            step: PipelineStep::Generating,
            stages: Vec::new(),
            files: Vec::new(),
            missing_required: Vec::new(),
            unresolved_dependencies: Vec::new(),
            validation: None,
            server: None,
            error: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn with_subdomain(mut self, subdomain: Option<String>) -> Self {
        self.subdomain = subdomain;
        self
    }

    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }

    pub fn enter(&mut self, step: PipelineStep) {
        self.step = step;
        self.touch();
    }

    pub fn complete(&mut self, server: ServerHandle) {
        self.server = Some(server);
        self.status = SessionStatus::Complete;
        self.step = PipelineStep::Complete;
        self.touch();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
        self.status = SessionStatus::Failed;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Project id for a session: the sanitized subdomain when one was given,
/// else a prompt slug suffixed with the first 8 characters of the chat id.
pub fn project_id_for(prompt: &str, chat_id: &str, subdomain: Option<&str>) -> String {
    if let Some(subdomain) = subdomain {
        return subdomain.to_string();
    }
    let mut prefix = slugify(prompt, PROJECT_PREFIX_LEN);
    if prefix.is_empty() {
        prefix = DEFAULT_PROJECT_SLUG.to_string();
    }
    let suffix: String = chat_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_lowercase();
    format!("{}-{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_from_prompt() {
        let id = project_id_for(
            "Build me a Space Shooter with power-ups!",
            "3f2a9c1e-77aa-4c1b-9d2e-000000000000",
            None,
        );
        assert_eq!(id, "build-me-a-space-shooter-with-3f2a9c1e");
        assert!(kiln_spec::is_valid_slug(&id));
    }

    #[test]
    fn test_project_id_prefers_subdomain() {
        assert_eq!(project_id_for("anything", "abc", Some("pong")), "pong");
    }

    #[test]
    fn test_project_id_for_symbol_prompt() {
        let id = project_id_for("🚀🚀", "ABCDEF12-0000", None);
        assert_eq!(id, "game-project-abcdef12");
    }

    #[test]
    fn test_lifecycle() {
        let mut session = GenerationSession::new("c", "p", "prompt", PathBuf::from("projects/p"));
        assert!(session.is_running());
        session.enter(PipelineStep::Validating);
        session.fail("boom");
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.step, PipelineStep::Validating);
        assert_eq!(session.error.as_deref(), Some("boom"));
    }
}
