//! Configuration commands

use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;

use crate::config::{CliConfig, ENV_PREFIX};
use crate::context::Context;
use crate::output::OutputFormat;

/// Configuration management commands
#[derive(Debug, Args)]
pub struct ConfigCommands {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show the effective configuration
    Show,

    /// Write a configuration file with the defaults
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Show configuration file paths
    Path,
}

/// Execute configuration commands
pub async fn execute(ctx: &Context, cmd: ConfigCommands) -> Result<()> {
    match cmd.command {
        ConfigSubcommand::Show => show(ctx),
        ConfigSubcommand::Init { force } => init(ctx, force),
        ConfigSubcommand::Path => show_paths(ctx),
    }
}

fn show(ctx: &Context) -> Result<()> {
    match ctx.output_format {
        OutputFormat::Table | OutputFormat::Compact => print!("{}", ctx.config.to_toml()?),
        _ => ctx.output.write_value(&ctx.config)?,
    }
    Ok(())
}

fn init(ctx: &Context, force: bool) -> Result<()> {
    let path = match &ctx.config_file {
        Some(path) => path.clone(),
        None => CliConfig::config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!("{} already exists; pass --force to overwrite", path.display());
    }

    CliConfig::default().save_to(&path)?;
    ctx.output.success(&format!("Wrote default configuration to {}", path.display()));
    Ok(())
}

fn show_paths(ctx: &Context) -> Result<()> {
    let path = CliConfig::config_path()?;
    let status = if path.exists() {
        "exists".green()
    } else {
        "not found".dimmed()
    };
    println!("{} {} ({})", "Config file:".cyan(), path.display(), status);
    if let Some(explicit) = &ctx.config_file {
        println!("{} {}", "Override file:".cyan(), explicit.display());
    }
    println!("{} {}_<SECTION>__<KEY>", "Environment:".cyan(), ENV_PREFIX);
    Ok(())
}
