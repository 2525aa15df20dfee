//! # kiln_runner
//!
//! Process orchestration for Kiln.
//!
//! Takes a materialized project directory and serves it, either as a local
//! dev server or as a static build behind the edge proxy.
//!
//! # Features
//!
//! - **Port Allocation**: sequential probing from a toolchain base port
//! - **Readiness Detection**: per-toolchain output markers, ANSI-aware
//! - **Degraded Completion**: failing installs and builds are tolerated
//! - **Proxy Deploys**: copy, site config, reload and an append-only log
//! - **Mock Runner**: for testing without a package manager
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use kiln_runner::{Orchestrator, OrchestratorConfig, TokioProcessRunner};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(
//!         OrchestratorConfig::default(),
//!         Arc::new(TokioProcessRunner::new()),
//!     )?;
//!
//!     let server = orchestrator
//!         .start_development("space-game", Path::new("projects/space-game"))
//!         .await?;
//!     println!("Running at {}", server.url);
//!
//!     orchestrator.shutdown_all().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod deploy_log;
pub mod error;
pub mod mock;
pub mod orchestrator;
pub mod port;
pub mod process;
pub mod readiness;
pub mod site;
pub mod state;

pub use config::{CommandSpec, OrchestratorConfig};
pub use deploy_log::{DeployLogEntry, DeployStatus, DeploymentLog};
pub use error::{RunnerError, RunnerResult};
pub use mock::{CapturedCall, MockProcess, MockProcessRunner, MockResponse};
pub use orchestrator::{locate_output_dir, DeploymentKind, Orchestrator, ServerHandle, OUTPUT_DIRS};
pub use port::PortAllocator;
pub use process::{
    ExecutionResult, LogLine, LogStream, ProcessHandle, ProcessRunner, RunningProcess,
    TokioProcessRunner,
};
pub use readiness::{MarkerDetector, ReadinessDetector, Toolchain};
pub use site::{render_server_block, write_server_block};
pub use state::{DeployState, DeployTracker, StateObserver};
