//! CLI execution context

use anyhow::Result;
use clap::ValueEnum;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::config::CliConfig;
use crate::output::{OutputFormat, OutputWriter};

/// Execution context for CLI commands
pub struct Context {
    /// Effective configuration
    pub config: CliConfig,

    /// Explicit `--config` file, if any
    pub config_file: Option<PathBuf>,

    /// Output format
    pub output_format: OutputFormat,

    /// Output writer
    pub output: OutputWriter,

    /// Verbose mode
    pub verbose: bool,

    /// Cancelled on Ctrl-C
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a new context from CLI arguments
    pub fn new(cli: &Cli) -> Result<Self> {
        let explicit = cli
            .config
            .as_deref()
            .filter(|path| path.exists() || !cli.command.writes_config());
        let config = CliConfig::load(explicit)?;

        let output_format = match cli.output {
            Some(format) => format,
            None => OutputFormat::from_str(&config.settings.output_format, true)
                .map_err(|e| anyhow::anyhow!("Invalid settings.output_format: {}", e))?,
        };
        let output = OutputWriter::new(output_format, cli.no_color || !config.settings.color);

        Ok(Self {
            config,
            config_file: cli.config.clone(),
            output_format,
            output,
            verbose: cli.verbose,
            cancel: CancellationToken::new(),
        })
    }

    /// Cancel the shared token when the user presses Ctrl-C
    pub fn cancel_on_ctrl_c(&self) {
        let token = self.cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing the current batch");
                token.cancel();
            }
        });
    }

    /// Pick the flag value, then the configured one
    pub fn resolve_path(&self, flag: Option<PathBuf>, configured: Option<&PathBuf>, name: &str) -> Result<PathBuf> {
        flag.or_else(|| configured.cloned())
            .ok_or_else(|| anyhow::anyhow!("--{} is required (or set paths.{} in the config)", name, name.replace('-', "_")))
    }
}
