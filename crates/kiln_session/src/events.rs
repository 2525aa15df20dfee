//! Pipeline progress events, streamed to clients as server-sent events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kiln_runner::{DeploymentKind, ServerHandle};
use kiln_spec::{FileSource, ValidationSummary};

/// Ordered steps of a generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStep {
    Generating,
    Extracting,
    Analyzing,
    Materializing,
    Validating,
    Launching,
    Complete,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generating => "generating",
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::Materializing => "materializing",
            Self::Validating => "validating",
            Self::Launching => "launching",
            Self::Complete => "complete",
        }
    }

    /// Overall progress when the step starts.
    pub fn percent(&self) -> u8 {
        match self {
            Self::Generating => 5,
            Self::Extracting => 40,
            Self::Analyzing => 50,
            Self::Materializing => 60,
            Self::Validating => 75,
            Self::Launching => 85,
            Self::Complete => 100,
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payload of the terminal `complete` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionSummary {
    pub project_id: String,
    pub url: String,
    pub port: Option<u16>,
    pub kind: DeploymentKind,
    pub ready_confirmed: bool,
    pub files: usize,
    pub validation: ValidationSummary,
}

impl CompletionSummary {
    pub fn new(server: &ServerHandle, files: usize, validation: ValidationSummary) -> Self {
        Self {
            project_id: server.project_id.clone(),
            url: server.url.clone(),
            port: server.port,
            kind: server.kind,
            ready_confirmed: server.ready_confirmed,
            files,
            validation,
        }
    }
}

/// Event body without the envelope fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    #[serde(rename_all = "camelCase")]
    Progress {
        step: PipelineStep,
        percent: u8,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    StepComplete {
        step: PipelineStep,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    FileGenerated {
        path: String,
        source: FileSource,
        bytes: usize,
    },
    Complete(CompletionSummary),
    #[serde(rename_all = "camelCase")]
    Error { step: PipelineStep, message: String },
}

/// One event of a session: payload plus `chatId` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    pub chat_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl PipelineEvent {
    pub fn new(chat_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            chat_id: chat_id.into(),
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn progress(chat_id: &str, step: PipelineStep, message: impl Into<String>) -> Self {
        Self::new(
            chat_id,
            EventPayload::Progress {
                step,
                percent: step.percent(),
                message: message.into(),
            },
        )
    }

    pub fn step_complete(chat_id: &str, step: PipelineStep, detail: Option<String>) -> Self {
        Self::new(chat_id, EventPayload::StepComplete { step, detail })
    }

    pub fn file_generated(chat_id: &str, path: &str, source: FileSource, bytes: usize) -> Self {
        Self::new(
            chat_id,
            EventPayload::FileGenerated {
                path: path.to_string(),
                source,
                bytes,
            },
        )
    }

    pub fn complete(chat_id: &str, summary: CompletionSummary) -> Self {
        Self::new(chat_id, EventPayload::Complete(summary))
    }

    pub fn error(chat_id: &str, step: PipelineStep, message: impl Into<String>) -> Self {
        Self::new(
            chat_id,
            EventPayload::Error {
                step,
                message: message.into(),
            },
        )
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self.payload {
            EventPayload::Progress { .. } => "progress",
            EventPayload::StepComplete { .. } => "step_complete",
            EventPayload::FileGenerated { .. } => "file_generated",
            EventPayload::Complete(_) => "complete",
            EventPayload::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.payload,
            EventPayload::Complete(_) | EventPayload::Error { .. }
        )
    }

    /// SSE data line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"chatId\":\"{}\",\"message\":\"unserializable event: {}\"}}",
                self.chat_id, e
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_spec::ValidationReport;
    use serde_json::Value;

    #[test]
    fn test_envelope_fields() {
        let event = PipelineEvent::progress("chat-1", PipelineStep::Extracting, "Extracting files");
        let json: Value = serde_json::from_str(&event.to_json()).unwrap();

        assert_eq!(event.name(), "progress");
        assert_eq!(json["chatId"], "chat-1");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["step"], "extracting");
        assert_eq!(json["percent"], 40);
    }

    #[test]
    fn test_file_generated_payload() {
        let event = PipelineEvent::file_generated("c", "src/App.tsx", FileSource::Fallback, 120);
        let json: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(event.name(), "file_generated");
        assert_eq!(json["path"], "src/App.tsx");
        assert_eq!(json["source"], "fallback");
        assert_eq!(json["bytes"], 120);
    }

    #[test]
    fn test_complete_payload() {
        let server = ServerHandle {
            project_id: "space-game".into(),
            port: Some(5174),
            url: "http://localhost:5174".into(),
            kind: DeploymentKind::Development,
            ready_confirmed: false,
            pid: None,
        };
        let summary = CompletionSummary::new(&server, 9, ValidationReport::new().summary());
        let event = PipelineEvent::complete("c", summary);
        let json: Value = serde_json::from_str(&event.to_json()).unwrap();

        assert!(event.is_terminal());
        assert_eq!(json["projectId"], "space-game");
        assert_eq!(json["port"], 5174);
        assert_eq!(json["kind"], "development");
        assert_eq!(json["readyConfirmed"], false);
        assert_eq!(json["validation"]["valid"], true);
    }

    #[test]
    fn test_step_order_progress_increases() {
        let steps = [
            PipelineStep::Generating,
            PipelineStep::Extracting,
            PipelineStep::Analyzing,
            PipelineStep::Materializing,
            PipelineStep::Validating,
            PipelineStep::Launching,
            PipelineStep::Complete,
        ];
        assert!(steps.windows(2).all(|w| w[0].percent() < w[1].percent()));
    }
}
