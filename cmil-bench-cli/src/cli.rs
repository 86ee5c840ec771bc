//! Command-line argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{
    catalog::CatalogCommand,
    config::{ConfigCommands, ConfigSubcommand},
    evaluate::EvaluateCommand,
    extract::ExtractCommand,
    infer::InferCommand,
    judge::JudgeCommand,
};
use crate::output::OutputFormat;

/// CMiL-Bench: evaluate language models on Chinese minority languages
#[derive(Debug, Parser)]
#[command(name = "cmil-bench")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file layered over the user config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Expand the task catalog into inference jobs
    Catalog(CatalogCommand),

    /// Run inference jobs with checkpointing
    Infer(InferCommand),

    /// Extract answers from inference results
    Extract(ExtractCommand),

    /// Grade open-ended answers with an LLM judge
    Judge(JudgeCommand),

    /// Score extracted answers and rank models
    Evaluate(EvaluateCommand),

    /// Manage configuration
    Config(ConfigCommands),
}

impl Commands {
    /// Whether the command creates the `--config` file instead of reading it
    pub fn writes_config(&self) -> bool {
        matches!(self, Commands::Config(cmd) if matches!(cmd.command, ConfigSubcommand::Init { .. }))
    }
}
