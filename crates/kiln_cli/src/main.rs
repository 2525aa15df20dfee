//! Kiln CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: Validation failure
//! - 4: Template error
//! - 5: Deployment error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod server;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const VALIDATION_FAILURE: u8 = 3;
    pub const TEMPLATE_ERROR: u8 = 4;
    pub const DEPLOYMENT_ERROR: u8 = 5;
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::execute(args, cli.config).await,
        Commands::Materialize(args) => commands::materialize::execute(args, cli.config).await,
        Commands::Validate(args) => commands::validate::execute(args, cli.config).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("❌ Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        "kiln=debug"
    } else if cli.quiet {
        "kiln=warn"
    } else {
        "kiln=info"
    };
    let filter = EnvFilter::from_default_env()
        .add_directive(level.parse().unwrap())
        .add_directive("warn".parse().unwrap());

    let registry = tracing_subscriber::registry().with(filter);
    let log_result = if cli.log_json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().with_target(false)).try_init()
    };

    if log_result.is_err() {
        // Logging already initialized, continue
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    let msg = format!("{:#}", e).to_lowercase();

    if msg.contains("validation") || msg.contains("schema") {
        ExitCodes::VALIDATION_FAILURE
    } else if msg.contains("template") {
        ExitCodes::TEMPLATE_ERROR
    } else if msg.contains("deploy") || msg.contains("proxy") || msg.contains("reload") {
        ExitCodes::DEPLOYMENT_ERROR
    } else if msg.contains("argument") || msg.contains("invalid subdomain") || msg.contains("not found") {
        ExitCodes::INVALID_ARGS
    } else {
        ExitCodes::GENERAL_ERROR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_error() {
        assert_eq!(
            categorize_error(&anyhow::anyhow!("Validation failed: 2 errors")),
            ExitCodes::VALIDATION_FAILURE
        );
        assert_eq!(
            categorize_error(&anyhow::anyhow!("Template not found: fallback/src/main.tsx")),
            ExitCodes::TEMPLATE_ERROR
        );
        assert_eq!(
            categorize_error(&anyhow::anyhow!("Deployment failed: nginx -s reload exited with 1")),
            ExitCodes::DEPLOYMENT_ERROR
        );
        assert_eq!(
            categorize_error(&anyhow::anyhow!("Input file not found: game.txt")),
            ExitCodes::INVALID_ARGS
        );
        assert_eq!(
            categorize_error(&anyhow::anyhow!("connection reset")),
            ExitCodes::GENERAL_ERROR
        );
    }

    #[test]
    fn test_categorize_uses_context_chain() {
        let err = anyhow::anyhow!("reload exited with 1").context("Failed to publish build");
        assert_eq!(categorize_error(&err), ExitCodes::DEPLOYMENT_ERROR);
    }
}
