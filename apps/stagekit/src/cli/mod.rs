//! # Stagekit CLI Module
//!
//! This module implements the CLI interface for stagekit.
//!
//! ## Available Commands
//!
//! - `build` - Plan and execute the requested stages
//! - `plan` - Show the copy actions and waves without executing them
//! - `types` - List registered target types

mod commands;

use clap::{Parser, Subcommand};
use stagekit_core::StageError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Stagekit - stage built artifacts into distribution directories
///
/// Copies executables, libraries and files into the locations declared by
/// `[[stage]]` entries of `stagekit.toml`.
#[derive(Parser, Debug)]
#[command(name = "stagekit")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress summary output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Workspace root containing the top-level stagekit.toml
    #[arg(short = 'R', long, global = true, default_value = ".")]
    pub root: PathBuf,

    /// Project directory to build from, relative to the root
    #[arg(short = 'C', long, global = true)]
    pub dir: Option<PathBuf>,

    /// Reject stage locations outside the workspace root
    #[arg(long, global = true)]
    pub sandbox: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Stage the requested targets
    Build {
        /// Target names and properties (`dist`, `release`, `variant=release`, `<link>static`)
        request: Vec<String>,

        /// Hard-link instead of copying when possible
        #[arg(long)]
        hardlink: bool,

        /// Show what would be staged without copying
        #[arg(long)]
        dry_run: bool,
    },

    /// Show copy actions and execution waves
    Plan {
        /// Target names and properties
        request: Vec<String>,
    },

    /// List registered target types
    Types,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), StageError> {
    let options = Options {
        root: cli.root,
        dir: cli.dir,
        sandbox: cli.sandbox,
        json_mode: cli.json_mode,
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match cli.command {
        Some(Commands::Build {
            request,
            hardlink,
            dry_run,
        }) => cmd_build(&options, &request, hardlink, dry_run).await,
        Some(Commands::Plan { request }) => cmd_plan(&options, &request),
        Some(Commands::Types) => cmd_types(&options),
        None => {
            // No subcommand - build everything from the invoking project
            cmd_build(&options, &[], false, false).await
        }
    }
}
