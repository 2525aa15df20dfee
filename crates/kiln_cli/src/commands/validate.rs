//! Validate command - Check a project directory against the structure schema.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use kiln_spec::{ProjectSchema, StructuralValidator};

#[derive(Args)]
pub struct ValidateArgs {
    /// Project directory to check
    path: PathBuf,

    /// Schema file (YAML, JSON or TOML); the configured or built-in schema otherwise
    #[arg(short, long)]
    schema: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: ValidateArgs, config_path: Option<PathBuf>) -> Result<()> {
    if !args.path.is_dir() {
        anyhow::bail!("Project directory not found: {}", args.path.display());
    }

    let schema = match args.schema {
        Some(path) => ProjectSchema::load(&path)
            .with_context(|| format!("Failed to load schema {}", path.display()))?,
        None => {
            let config = super::load_config(config_path.as_deref())?;
            match &config.schema {
                Some(path) => ProjectSchema::load(path)
                    .with_context(|| format!("Failed to load schema {}", path.display()))?,
                None => ProjectSchema::default(),
            }
        }
    };

    info!("Validating project: {}", args.path.display());
    let report = StructuralValidator::validate(&args.path, &schema);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("📋 Validating {}...", args.path.display());
        println!(
            "   Required files: {} found, {} missing",
            report.required_found,
            report.required_missing.len()
        );
        println!("   Files: {}  Engine: {}", report.file_count, report.engine);

        if report.valid {
            println!("   ✅ Structure validation passed");
        } else {
            println!("   ❌ Structure validation failed:");
            for error in &report.errors {
                println!("      - {}", error);
            }
        }
        for warning in &report.warnings {
            println!("   ⚠️  {}", warning);
        }
    }

    if !report.valid {
        anyhow::bail!("Validation failed with {} error(s)", report.errors.len());
    }
    Ok(())
}
