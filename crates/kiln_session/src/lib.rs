//! # kiln_session
//!
//! Generation sessions for Kiln.
//!
//! A session turns one prompt into a running project: the generation chain
//! produces text, the ingest crate turns it into files and a manifest, the
//! templates crate writes the project, and the runner serves it. Progress is
//! streamed as [`PipelineEvent`]s.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kiln_runner::{Orchestrator, TokioProcessRunner};
//! use kiln_session::{
//!     GenerateRequest, GenerationChain, KilnConfig, Pipeline, ProjectAssembler, SessionStore,
//!     StageLogWriter, StaticStage,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = KilnConfig::load(None)?;
//!     let chain = GenerationChain::new()
//!         .with_stage(Arc::new(StaticStage::new("replay", "=== src/App.tsx ===\n...")));
//!     let orchestrator = Arc::new(Orchestrator::new(
//!         config.orchestrator_config(),
//!         Arc::new(TokioProcessRunner::new()),
//!     )?);
//!     let pipeline = Arc::new(Pipeline::new(
//!         chain,
//!         ProjectAssembler::from_config(&config)?,
//!         orchestrator,
//!         Arc::new(SessionStore::new()),
//!         StageLogWriter::new(&config.logs_dir),
//!         &config.projects_root,
//!     )?);
//!
//!     let mut run = pipeline.start(GenerateRequest {
//!         prompt: "a tiny pong game".into(),
//!         subdomain: None,
//!     })?;
//!     while let Some(event) = run.events.recv().await {
//!         println!("{}: {}", event.name(), event.to_json());
//!     }
//!     Ok(())
//! }
//! ```

pub mod assembly;
pub mod chain;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod persistence;
pub mod pipeline;
pub mod session;
pub mod store;

pub use assembly::{Analysis, AssembledProject, ProjectAssembler};
pub use chain::{GenerationChain, GenerationStage, StageInput, StageRecord, StaticStage};
pub use config::KilnConfig;
pub use error::{SessionError, SessionResult};
pub use events::{CompletionSummary, EventPayload, PipelineEvent, PipelineStep};
pub use llm::{chain_from_prompts, LlmClient, LlmProvider, LlmStage, DEFAULT_SYSTEM_PROMPT};
pub use persistence::{StageLog, StageLogWriter};
pub use pipeline::{GenerateRequest, Pipeline, PipelineRun};
pub use session::{project_id_for, GenerationSession, SessionFile, SessionStatus, StageOutput};
pub use store::SessionStore;
