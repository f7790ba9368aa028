// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use ccdeploy::authz::Role;
use ccdeploy::types::{ArtifactName, SegmentName};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ccdeploy")]
#[command(about = "Chaincode lifecycle orchestration: validate, approve, deploy and roll back")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a template ccdeploy.yml in the current directory
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Validate the configuration and print the step plan
    Check {
        /// Config file to use instead of discovering one
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Submit, validate, approve and deploy a chaincode package
    Deploy {
        /// Chaincode name
        #[arg(long)]
        name: ArtifactName,

        /// Chaincode version
        #[arg(long)]
        version: String,

        /// Package source path or content reference
        #[arg(long)]
        source: String,

        /// Channel to deploy to
        #[arg(long)]
        segment: SegmentName,

        /// Chaincode language
        #[arg(long, default_value = "golang")]
        language: String,

        /// Identity recorded as the actor
        #[arg(long, default_value = "cli")]
        actor: String,

        /// Role the actor acts with
        #[arg(long, default_value = "admin")]
        role: Role,

        /// Roll back completed steps if the deployment fails
        #[arg(long)]
        rollback_on_failure: bool,

        /// Config file to use instead of discovering one
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Emit JSON lines instead of human-readable progress
        #[arg(long, conflicts_with = "quiet")]
        json: bool,

        /// Print only the final result
        #[arg(short, long)]
        quiet: bool,
    },
}
