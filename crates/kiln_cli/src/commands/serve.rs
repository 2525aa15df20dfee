//! Serve command - Run the generation service over HTTP.

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal;
use tracing::{error, info};

use kiln_runner::{Orchestrator, TokioProcessRunner};
use kiln_session::{
    chain_from_prompts, GenerationChain, KilnConfig, LlmClient, Pipeline, ProjectAssembler,
    SessionStore, StageLogWriter, StaticStage,
};

use crate::server::{router, AppState};

#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (overrides the configuration)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Answer every request with this saved transcript instead of calling an LLM
    #[arg(long)]
    replay: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = super::load_config(config_path.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let chain = build_chain(&config, args.replay.as_ref())?;
    let pipeline = Arc::new(build_pipeline(&config, chain)?);
    let orchestrator = Arc::clone(pipeline.orchestrator());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;

    println!("🔥 Kiln listening on http://{}", config.bind);
    println!("   Projects: {}", config.projects_root.display());
    if config.runner.proxy_enabled {
        println!(
            "   Mode: proxy deploy to *.{} ({})",
            config.runner.base_domain,
            config.runner.served_root.display()
        );
    } else {
        println!("   Mode: development servers ({})", config.runner.toolchain);
    }

    axum::serve(listener, router(AppState::new(pipeline)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    orchestrator.shutdown_all().await;
    println!("👋 Kiln stopped");
    Ok(())
}

fn build_chain(config: &KilnConfig, replay: Option<&PathBuf>) -> Result<GenerationChain> {
    if let Some(path) = replay {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Replay file not found: {}", path.display()))?;
        info!("Replaying {} for every request", path.display());
        return Ok(GenerationChain::new().with_stage(Arc::new(StaticStage::new("replay", text))));
    }

    let client = LlmClient::from_env(config.llm_model.clone())?;
    info!("Using {:?} model {}", client.provider(), client.model());
    Ok(chain_from_prompts(&config.prompts_dir, Arc::new(client))?)
}

fn build_pipeline(config: &KilnConfig, chain: GenerationChain) -> Result<Pipeline> {
    std::fs::create_dir_all(&config.projects_root).with_context(|| {
        format!(
            "Failed to create projects root {}",
            config.projects_root.display()
        )
    })?;

    let orchestrator = Orchestrator::new(
        config.orchestrator_config(),
        Arc::new(TokioProcessRunner::new()),
    )?;
    let assembler = ProjectAssembler::from_config(config)?;

    Ok(Pipeline::new(
        chain,
        assembler,
        Arc::new(orchestrator),
        Arc::new(SessionStore::new()),
        StageLogWriter::new(&config.logs_dir),
        &config.projects_root,
    )?)
}

async fn shutdown_signal() {
    let ctrl_c = wait_for_signal(signal::ctrl_c(), "Ctrl+C");

    #[cfg(unix)]
    let terminate = wait_for_signal(
        async {
            let mut stream = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            stream.recv().await;
            Ok::<(), std::io::Error>(())
        },
        "SIGTERM",
    );

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Resolves when `signal` fires. A handler that cannot be installed never
/// resolves, so the server keeps running instead of shutting down at once.
async fn wait_for_signal<F, E>(signal: F, name: &str)
where
    F: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    if let Err(e) = signal.await {
        error!("Failed to install {} handler: {}", name, e);
        std::future::pending::<()>().await;
    }
}
