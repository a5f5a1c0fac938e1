//! CLI parse: clap types for arbor. No behavior; definitions only.

use crate::types::StepIndex;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Arbor CLI - experiment lineage store for generated images
#[derive(Parser)]
#[command(name = "arbor")]
#[command(about = "Record, branch and browse image-generation experiment lineages")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides layered config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, default_value = "false", conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List experiment summaries
    List {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show one experiment with all its steps
    Show {
        experiment_id: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the whole lineage log as JSON
    All,
    /// Print the node/edge projection of every experiment as JSON
    Graph,
    /// Pick a uniformly random step to branch from
    Branch {
        experiment_id: String,
        /// Seed for a reproducible pick
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Start an experiment from a local root image
    Start {
        /// Root image file
        #[arg(long)]
        image: PathBuf,
        /// Experiment name (default: "Experiment HH:MM:SS")
        #[arg(long)]
        name: Option<String>,
    },
    /// Generate a new step from a parent step and a prompt
    Generate {
        experiment_id: String,
        /// Index of the parent step
        #[arg(long)]
        parent: StepIndex,
        #[arg(long)]
        prompt: String,
    },
    /// Check every experiment's lineage integrity
    Validate,
    /// Show the effective configuration (secrets redacted)
    Config,
}
