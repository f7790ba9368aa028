// ABOUTME: Entry point for the ccdeploy CLI application.
// ABOUTME: Parses arguments, installs logging and dispatches to command handlers.

mod cli;
mod commands;

use ccdeploy::config::Config;
use ccdeploy::error::Result;
use ccdeploy::output::{Output, OutputMode};
use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

// Single-threaded: the deploy command relies on spawned attempt tasks not
// running before it subscribes to them.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = match &cli.command {
        Commands::Deploy { json, quiet, .. } => OutputMode::from_flags(*json, *quiet),
        _ => OutputMode::Normal,
    };

    if let Err(e) = run(cli).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init { force } => commands::init(&cwd, force, Output::new(OutputMode::Normal)),
        Commands::Check { config } => {
            let config = load_config(&cwd, config)?;
            commands::check(&config, Output::new(OutputMode::Normal))
        }
        Commands::Deploy {
            name,
            version,
            source,
            segment,
            language,
            actor,
            role,
            rollback_on_failure,
            config,
            json,
            quiet,
        } => {
            let config = load_config(&cwd, config)?;
            let request = commands::DeployRequest {
                name,
                version,
                source,
                language,
                segment,
                actor,
                role,
                rollback_on_failure,
            };
            commands::deploy(config, request, Output::new(OutputMode::from_flags(json, quiet))).await
        }
    }
}

fn load_config(cwd: &std::path::Path, explicit: Option<PathBuf>) -> Result<Config> {
    match explicit {
        Some(path) => Config::load(&cwd.join(path)),
        None => Config::discover(cwd),
    }
}
