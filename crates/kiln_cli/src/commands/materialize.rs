//! Materialize command - Turn a saved generation transcript into a project.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use tracing::info;

use kiln_session::ProjectAssembler;
use kiln_spec::project_slug;

#[derive(Args)]
pub struct MaterializeArgs {
    /// Transcript produced by the generation chain
    input: PathBuf,

    /// Project name (defaults to the input file name)
    #[arg(short, long)]
    name: Option<String>,

    /// Output directory (defaults to <projects root>/<name>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Fail when the result does not pass validation
    #[arg(long)]
    strict: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: MaterializeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config_path.as_deref())?;

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Input file not found: {}", args.input.display()))?;

    let raw_name = match &args.name {
        Some(name) => name.clone(),
        None => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let name = project_slug(&raw_name);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| config.project_dir(&name));

    info!("Materializing {} into {}", args.input.display(), output.display());
    let assembler = ProjectAssembler::from_config(&config)?;
    let project = assembler.assemble(&text, &name, &output)?;

    if args.json {
        let report = json!({
            "project": name,
            "root": project.materialized.root,
            "files": project.materialized.written,
            "failures": project.materialized.failures,
            "missingRequired": project.extraction.missing_required,
            "unresolvedDependencies": project.analysis.dependencies.unresolved(),
            "engine": project.analysis.engine,
            "validation": project.validation.summary(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("📦 Project '{}' written to {}", name, output.display());
        for file in &project.materialized.written {
            println!("   {:<28} {:>7} bytes  [{}]", file.path, file.bytes, file.source);
        }
        for failure in &project.materialized.failures {
            println!("   ❌ {}: {}", failure.path, failure.message);
        }
        if !project.extraction.missing_required.is_empty() {
            println!(
                "   ⚠️  Not found in transcript: {}",
                project.extraction.missing_required.join(", ")
            );
        }
        let unresolved = project.analysis.dependencies.unresolved();
        if !unresolved.is_empty() {
            println!("   ⚠️  Pinned to latest: {}", unresolved.join(", "));
        }
        println!("   🎮 Engine: {}", project.analysis.engine);

        if project.validation.valid {
            println!("   ✅ Structure valid");
        } else {
            println!("   ❌ Structure invalid:");
            for error in &project.validation.errors {
                println!("      - {}", error);
            }
        }
        for warning in &project.validation.warnings {
            println!("   ⚠️  {}", warning);
        }
    }

    if args.strict && !project.validation.valid {
        anyhow::bail!(
            "Validation failed with {} error(s)",
            project.validation.errors.len()
        );
    }
    Ok(())
}
