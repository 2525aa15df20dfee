//! End-to-end generation pipeline.
//!
//! One run per request: generation chain, extraction, dependency analysis,
//! materialization, validation and launch, strictly in that order. Progress
//! is reported on a channel as [`PipelineEvent`]s.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use kiln_runner::Orchestrator;
use kiln_spec::{project_slug, sanitize_subdomain};

use crate::assembly::ProjectAssembler;
use crate::chain::GenerationChain;
use crate::error::{SessionError, SessionResult};
use crate::events::{CompletionSummary, PipelineEvent, PipelineStep};
use crate::persistence::{StageLog, StageLogWriter};
use crate::session::{project_id_for, GenerationSession, SessionFile, StageOutput};
use crate::store::SessionStore;

/// Events buffered per run before the sender waits on the client.
const EVENT_BUFFER: usize = 64;

/// Body of a generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    #[serde(default)]
    pub subdomain: Option<String>,
}

/// A started run.
pub struct PipelineRun {
    pub chat_id: String,
    pub project_id: String,
    pub events: mpsc::Receiver<PipelineEvent>,
}

/// Prompt-to-running-project pipeline.
pub struct Pipeline {
    chain: GenerationChain,
    assembler: ProjectAssembler,
    orchestrator: Arc<Orchestrator>,
    sessions: Arc<SessionStore>,
    logs: StageLogWriter,
    projects_root: PathBuf,
}

impl Pipeline {
    pub fn new(
        chain: GenerationChain,
        assembler: ProjectAssembler,
        orchestrator: Arc<Orchestrator>,
        sessions: Arc<SessionStore>,
        logs: StageLogWriter,
        projects_root: impl Into<PathBuf>,
    ) -> SessionResult<Self> {
        if chain.is_empty() {
            return Err(SessionError::Config("generation chain has no stages".into()));
        }
        Ok(Self {
            chain,
            assembler,
            orchestrator,
            sessions,
            logs,
            projects_root: projects_root.into(),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn logs(&self) -> &StageLogWriter {
        &self.logs
    }

    /// Live session, or its archive once closed.
    pub fn session(&self, chat_id: &str) -> SessionResult<GenerationSession> {
        let chat_id = Self::parse_chat_id(chat_id)?;
        match self.sessions.get(&chat_id) {
            Some(session) => Ok(session),
            None => self.logs.load_session(&chat_id),
        }
    }

    /// Stage logs written so far for a session.
    pub fn stages(&self, chat_id: &str) -> SessionResult<Vec<StageLog>> {
        let chat_id = Self::parse_chat_id(chat_id)?;
        self.logs.read_stages(&chat_id)
    }

    /// Chat ids are UUIDs; anything else cannot name a log directory.
    fn parse_chat_id(chat_id: &str) -> SessionResult<String> {
        Uuid::parse_str(chat_id)
            .map(|id| id.to_string())
            .map_err(|_| SessionError::NotFound(chat_id.to_string()))
    }

    /// Validate `request`, open a session and run it in the background.
    ///
    /// Input problems are returned here, before any event is sent.
    pub fn start(self: &Arc<Self>, request: GenerateRequest) -> SessionResult<PipelineRun> {
        let session = self.open_session(&request)?;
        let chat_id = session.chat_id.clone();
        let project_id = session.project_id.clone();

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let pipeline = Arc::clone(self);
        let id = chat_id.clone();
        tokio::spawn(async move {
            // outcome is reported through events and the session archive
            let _ = pipeline.execute(&id, tx).await;
        });

        Ok(PipelineRun {
            chat_id,
            project_id,
            events: rx,
        })
    }

    /// Validate `request`, open a session and run it to completion.
    pub async fn run(
        &self,
        request: GenerateRequest,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> SessionResult<GenerationSession> {
        let session = self.open_session(&request)?;
        self.execute(&session.chat_id, tx).await
    }

    fn open_session(&self, request: &GenerateRequest) -> SessionResult<GenerationSession> {
        let prompt = request.prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::InvalidRequest("prompt must not be empty".into()));
        }

        let subdomain = match request.subdomain.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                sanitize_subdomain(raw, self.assembler.schema().max_subdomain_length)
                    .map_err(|e| SessionError::InvalidRequest(e.to_string()))?,
            ),
            _ => None,
        };

        let chat_id = Uuid::new_v4().to_string();
        let project_id = project_id_for(prompt, &chat_id, subdomain.as_deref());
        let session = GenerationSession::new(
            chat_id,
            project_id.clone(),
            prompt,
            self.projects_root.join(&project_id),
        )
        .with_subdomain(subdomain);

        self.sessions.open(session.clone())?;
        info!("Session {} started for project {}", session.chat_id, project_id);
        Ok(session)
    }

    /// Drive an open session, then close and archive it.
    async fn execute(
        &self,
        chat_id: &str,
        tx: mpsc::Sender<PipelineEvent>,
    ) -> SessionResult<GenerationSession> {
        let events = EventSink { chat_id, tx };
        let result = self.steps(chat_id, &events).await;

        if let Err(e) = &result {
            let step = self
                .sessions
                .get(chat_id)
                .map(|s| s.step)
                .unwrap_or(PipelineStep::Generating);
            error!("Session {} failed while {}: {}", chat_id, step, e);
            let _ = self.sessions.update(chat_id, |s| s.fail(e.to_string()));
            events.send(PipelineEvent::error(chat_id, step, e.to_string())).await;
        }

        let session = self.sessions.close(chat_id)?;
        if let Err(e) = self.logs.archive_session(&session) {
            warn!("Failed to archive session {}: {}", chat_id, e);
        }
        result.map(|_| session)
    }

    async fn steps(&self, chat_id: &str, events: &EventSink<'_>) -> SessionResult<()> {
        let session = self
            .sessions
            .get(chat_id)
            .ok_or_else(|| SessionError::NotFound(chat_id.to_string()))?;
        let project_id = session.project_id.as_str();
        let dir = session.project_dir.as_path();
        let package_name = project_slug(&session.prompt);

        // Generating
        self.enter(chat_id, PipelineStep::Generating, events, "Running generation chain")
            .await?;
        let mut previous: Option<String> = None;
        for index in 0..self.chain.len() {
            let record = self.chain.run_stage(index, &session.prompt, previous.take()).await?;
            if let Err(e) = self.logs.write_stage(chat_id, &record) {
                warn!("Failed to write stage log for {}: {}", record.stage, e);
            }
            let output = StageOutput::from(&record);
            self.sessions.update(chat_id, |s| s.stages.push(output))?;
            events
                .send(PipelineEvent::progress(
                    chat_id,
                    PipelineStep::Generating,
                    format!("Stage {}/{} ({}) finished", index + 1, self.chain.len(), record.stage),
                ))
                .await;
            previous = Some(record.output);
        }
        let raw = previous.unwrap_or_default();
        events
            .send(PipelineEvent::step_complete(
                chat_id,
                PipelineStep::Generating,
                Some(format!("{} characters generated", raw.len())),
            ))
            .await;

        // Extracting
        self.enter(chat_id, PipelineStep::Extracting, events, "Extracting files").await?;
        let extraction = self.assembler.extract(&raw);
        self.sessions.update(chat_id, |s| {
            s.missing_required = extraction.missing_required.clone();
        })?;
        events
            .send(PipelineEvent::step_complete(
                chat_id,
                PipelineStep::Extracting,
                Some(format!(
                    "{} files extracted, {} required missing",
                    extraction.files.len(),
                    extraction.missing_required.len()
                )),
            ))
            .await;

        // Analyzing
        self.enter(chat_id, PipelineStep::Analyzing, events, "Analyzing dependencies")
            .await?;
        let analysis = self.assembler.analyze(&package_name, &extraction);
        let unresolved = analysis.dependencies.unresolved();
        self.sessions
            .update(chat_id, |s| s.unresolved_dependencies = unresolved.clone())?;
        events
            .send(PipelineEvent::step_complete(
                chat_id,
                PipelineStep::Analyzing,
                Some(format!(
                    "{} dependencies, {} dev dependencies, engine {}",
                    analysis.manifest.dependencies.len(),
                    analysis.manifest.dev_dependencies.len(),
                    analysis.engine.as_str()
                )),
            ))
            .await;

        // Materializing
        self.enter(chat_id, PipelineStep::Materializing, events, "Writing project files")
            .await?;
        // nothing may serve the directory while it is rewritten
        if self.orchestrator.stop(project_id).await {
            info!("Stopped previous server of {} before rewriting it", project_id);
            events
                .send(PipelineEvent::progress(
                    chat_id,
                    PipelineStep::Materializing,
                    format!("Stopped the running server of {}", project_id),
                ))
                .await;
        }
        let materialized = self
            .assembler
            .materialize(dir, &package_name, &extraction, &analysis)?;
        for file in &materialized.written {
            events
                .send(PipelineEvent::file_generated(
                    chat_id,
                    &file.path,
                    file.source,
                    file.bytes,
                ))
                .await;
        }
        let files: Vec<SessionFile> = materialized
            .written
            .iter()
            .map(|f| SessionFile {
                path: f.path.clone(),
                source: f.source,
                bytes: f.bytes,
            })
            .collect();
        let file_count = files.len();
        self.sessions.update(chat_id, |s| s.files = files)?;
        events
            .send(PipelineEvent::step_complete(
                chat_id,
                PipelineStep::Materializing,
                Some(format!("{} files written", file_count)),
            ))
            .await;

        // Validating
        self.enter(chat_id, PipelineStep::Validating, events, "Validating project structure")
            .await?;
        let validation = self.assembler.validate(dir).summary();
        self.sessions
            .update(chat_id, |s| s.validation = Some(validation.clone()))?;
        events
            .send(PipelineEvent::step_complete(
                chat_id,
                PipelineStep::Validating,
                Some(format!(
                    "{} ({} errors, {} warnings)",
                    if validation.valid { "valid" } else { "invalid" },
                    validation.errors,
                    validation.warnings
                )),
            ))
            .await;

        // Launching
        self.enter(chat_id, PipelineStep::Launching, events, "Starting project").await?;
        let server = self
            .orchestrator
            .launch(project_id, dir, session.subdomain.as_deref())
            .await?;
        events
            .send(PipelineEvent::step_complete(
                chat_id,
                PipelineStep::Launching,
                Some(server.url.clone()),
            ))
            .await;

        let summary = CompletionSummary::new(&server, file_count, validation);
        self.sessions.update(chat_id, |s| s.complete(server))?;
        info!("Session {} complete: {}", chat_id, summary.url);
        events.send(PipelineEvent::complete(chat_id, summary)).await;
        Ok(())
    }

    async fn enter(
        &self,
        chat_id: &str,
        step: PipelineStep,
        events: &EventSink<'_>,
        message: &str,
    ) -> SessionResult<()> {
        self.sessions.update(chat_id, |s| s.enter(step))?;
        events.send(PipelineEvent::progress(chat_id, step, message)).await;
        Ok(())
    }
}

/// Event sender that tolerates a departed client.
struct EventSink<'a> {
    chat_id: &'a str,
    tx: mpsc::Sender<PipelineEvent>,
}

impl EventSink<'_> {
    async fn send(&self, event: PipelineEvent) {
        if self.tx.send(event).await.is_err() {
            // client went away; the run continues and is archived
            tracing::debug!("Event receiver for {} dropped", self.chat_id);
        }
    }
}
