//! CLI command definitions.
//!
//! Each subcommand maps to one way of driving the pipeline: as a streaming
//! HTTP service, offline from a saved transcript, or as a structure check.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use kiln_session::KilnConfig;

pub mod materialize;
pub mod serve;
pub mod validate;

/// Kiln - turns generated text into running web game projects
#[derive(Parser)]
#[command(name = "kiln")]
#[command(version, about = "Kiln - turns generated text into running web game projects")]
#[command(long_about = r#"
Kiln takes the text produced by a chain of LLM calls, extracts the project
files from it, builds a package manifest, fills in anything missing from
templates, validates the result and starts a dev server (or deploys the
build behind a reverse proxy).

COMMANDS:
  serve        → HTTP service: POST /api/generate streams progress as SSE
  materialize  → Turn a saved transcript into a project directory
  validate     → Check a project directory against the structure schema

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Validation failure
  4 - Template error
  5 - Deployment error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the generation service
    Serve(serve::ServeArgs),

    /// Build a project from a saved generation transcript
    Materialize(materialize::MaterializeArgs),

    /// Validate a project directory
    Validate(validate::ValidateArgs),
}

/// Configuration from `path` plus environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<KilnConfig> {
    let config = KilnConfig::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load configuration from {}", p.display()),
        None => "Failed to load configuration from environment".to_string(),
    })?;
    Ok(config)
}
