//! CLI command definitions and dispatch for the `syl` binary.
//!
//! Uses clap derive macros for argument parsing. The CLI follows a
//! verb-noun pattern (e.g., `syl run start`, `syl runs list`).

pub mod run;
pub mod runs;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run declarative inference repositories.
#[derive(Parser)]
#[command(name = "syl", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a run (start, resume, fork).
    Run {
        #[command(subcommand)]
        action: run::RunCommand,
    },

    /// Inspect the run registry and checkpoint log.
    Runs {
        #[command(subcommand)]
        action: runs::RunsCommand,
    },

    /// Validate repositories without executing anything.
    Validate {
        /// Path to the concept repository JSON file.
        concepts: PathBuf,

        /// Path to the inference repository JSON file.
        inferences: PathBuf,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
