//! Inference commands

use anyhow::{Context as _, Result};
use clap::{Args, ValueEnum};
use cmil_bench_core::{LocalBackendConfig, RemoteBackendConfig, RunConfig, TaskSpec};
use cmil_bench_workflow::{
    clear_outputs, load_task_list, GenerationBackend, JobProgress, JobReport, JobRunner, LocalBackend,
    RemoteBackend,
};
use colored::Colorize;
use comfy_table::Cell;
use dialoguer::Confirm;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use super::catalog::CatalogArgs;
use crate::context::Context;
use crate::output::{format_rate, progress_bar, status_badge, OutputFormat, TableDisplay};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Locally served model, batched completions
    Local,
    /// Hosted chat model, one call per example
    Remote,
}

/// Run inference jobs
#[derive(Debug, Args)]
pub struct InferCommand {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Read jobs from a task-list file instead of expanding the catalog
    #[arg(long)]
    pub task_list: Option<PathBuf>,

    /// Generation backend
    #[arg(long, value_enum, default_value_t = BackendKind::Local)]
    pub backend: BackendKind,

    /// Endpoint of the serving engine or hosted API
    #[arg(long)]
    pub base_url: Option<String>,

    /// API key for the hosted backend
    #[arg(long)]
    pub api_key: Option<String>,

    /// Pause between hosted calls, in milliseconds
    #[arg(long)]
    pub inter_call_delay_ms: Option<u64>,

    /// Command that launches the local serving engine
    #[arg(long)]
    pub launch_command: Option<String>,

    #[arg(long)]
    pub gpu_memory_utilization: Option<f64>,

    #[arg(long)]
    pub tensor_parallel_size: Option<u32>,

    /// Examples per backend batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Flush results every N batches
    #[arg(long)]
    pub save_frequency: Option<usize>,

    /// Evaluate only the first N examples of each job (-1 for all)
    #[arg(long, allow_negative_numbers = true)]
    pub max_test_example_num: Option<i64>,

    /// Log every generation
    #[arg(long)]
    pub print_results: bool,

    /// Delete previous results and checkpoints before running
    #[arg(long)]
    pub fresh: bool,

    /// Skip the confirmation for --fresh
    #[arg(short, long)]
    pub yes: bool,
}

impl InferCommand {
    fn run_config(&self, base: &RunConfig) -> RunConfig {
        let mut config = base.clone();
        if let Some(n) = self.batch_size {
            config = config.with_batch_size(n);
        }
        if let Some(n) = self.save_frequency {
            config = config.with_save_frequency(n);
        }
        if let Some(n) = self.max_test_example_num {
            config = config.with_max_test_example_num(n);
        }
        config.print_results |= self.print_results;
        config
    }

    fn local_config(&self, ctx: &Context) -> LocalBackendConfig {
        let settings = &ctx.config.local;
        let mut config = LocalBackendConfig::new(
            self.base_url.clone().unwrap_or_else(|| settings.base_url.clone()),
            self.catalog.model.clone(),
        );
        config.launch_command = self.launch_command.clone().or_else(|| settings.launch_command.clone());
        config.gpu_memory_utilization = self.gpu_memory_utilization.unwrap_or(settings.gpu_memory_utilization);
        config.tensor_parallel_size = self.tensor_parallel_size.unwrap_or(settings.tensor_parallel_size);
        config.startup_timeout_secs = settings.startup_timeout_secs;
        config
    }

    fn remote_config(&self, ctx: &Context) -> RemoteBackendConfig {
        let settings = &ctx.config.remote;
        let mut config = RemoteBackendConfig::new(
            self.base_url.clone().unwrap_or_else(|| settings.base_url.clone()),
            self.catalog.model.clone(),
        );
        config.api_key = self.api_key.clone().or_else(|| settings.api_key.clone());
        config.inter_call_delay_ms = self.inter_call_delay_ms.unwrap_or(settings.inter_call_delay_ms);
        config.max_retries = settings.max_retries;
        config.timeout_secs = settings.timeout_secs;
        config
    }

    async fn specs(&self, ctx: &Context) -> Result<Vec<TaskSpec>> {
        match &self.task_list {
            Some(path) => load_task_list(path)
                .await
                .with_context(|| format!("Failed to load task list {:?}", path)),
            None => self.catalog.expand(ctx),
        }
    }
}

pub async fn execute(ctx: &Context, cmd: InferCommand) -> Result<()> {
    let specs = cmd.specs(ctx).await?;
    if specs.is_empty() {
        ctx.output.warning("No jobs selected");
        return Ok(());
    }

    if cmd.fresh {
        if !cmd.yes && !confirm_fresh(specs.len())? {
            ctx.output.info("Aborted");
            return Ok(());
        }
        for spec in &specs {
            clear_outputs(spec).await?;
        }
    }

    let mut local = None;
    let backend: Arc<dyn GenerationBackend> = match cmd.backend {
        BackendKind::Local => {
            let spinner = ctx.output.spinner("Waiting for the local serving engine...");
            let started = LocalBackend::start(cmd.local_config(ctx)).await;
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            let started = Arc::new(started.context("Local backend did not become ready")?);
            local = Some(started.clone());
            started
        }
        BackendKind::Remote => Arc::new(RemoteBackend::new(cmd.remote_config(ctx))?),
    };

    tracing::info!(
        model = %cmd.catalog.model,
        backend = ?cmd.backend,
        jobs = specs.len(),
        "starting inference"
    );

    let mut runner = JobRunner::new(backend, cmd.catalog.model.clone(), cmd.run_config(&ctx.config.run))
        .with_cancellation(ctx.cancel.clone());
    let progress = render_progress(runner.enable_progress_tracking(), ctx.output.format());

    let summary = runner.run_all(&specs).await;
    drop(runner);
    let _ = progress.await;

    if let Some(local) = local {
        local.shutdown().await?;
    }

    ctx.output.write_list(
        &summary.reports,
        &["Job", "State", "Total", "Skipped", "Succeeded", "Failed", "Success", "Elapsed"],
    )?;

    for failure in &summary.failures {
        ctx.output.error(&format!("{}: {}", failure.label, failure.error));
    }
    if let Some(reason) = &summary.stopped {
        ctx.output.warning(&format!("Run stopped early: {}", reason));
    }
    if summary.reports.iter().any(|r| r.cancelled) {
        ctx.output.warning("Interrupted; rerun the same command to resume from the checkpoint");
    }

    if summary.has_fatal() {
        anyhow::bail!(
            "{} job(s) failed with a fatal error",
            summary.failures.iter().filter(|f| f.fatal).count()
        );
    }
    Ok(())
}

fn confirm_fresh(jobs: usize) -> Result<bool> {
    if !console::Term::stderr().is_term() {
        anyhow::bail!("--fresh deletes previous results; pass --yes to confirm without a terminal");
    }
    Confirm::new()
        .with_prompt(format!("Delete previous results and checkpoints of {} job(s)?", jobs))
        .default(false)
        .interact()
        .context("Failed to read confirmation")
}

/// One progress bar per job, fed by the runner's broadcast channel.
fn render_progress(mut rx: broadcast::Receiver<JobProgress>, format: OutputFormat) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current: Option<(String, ProgressBar)> = None;
        loop {
            let progress = match rx.recv().await {
                Ok(progress) => progress,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            if format != OutputFormat::Table {
                continue;
            }

            let is_same_job = matches!(&current, Some((label, _)) if *label == progress.label);
            if !is_same_job {
                if let Some((_, pb)) = current.take() {
                    pb.finish();
                }
                current = Some((progress.label.clone(), progress_bar(progress.pending as u64, &progress.label)));
            }
            if let Some((_, pb)) = &current {
                pb.set_position(progress.processed as u64);
                pb.set_message(format!("{} ({} failed)", progress.label, progress.failed));
            }
        }
        if let Some((_, pb)) = current {
            pb.finish();
        }
    })
}

impl TableDisplay for JobReport {
    fn to_row(&self) -> Vec<Cell> {
        let state = if self.cancelled {
            "cancelled".to_string()
        } else {
            self.state.to_string().to_lowercase()
        };
        let attempted = self.succeeded + self.failed;
        let rate = if attempted == 0 { 0.0 } else { self.succeeded as f64 / attempted as f64 };
        vec![
            Cell::new(&self.label),
            Cell::new(status_badge(&state)),
            Cell::new(self.total),
            Cell::new(self.skipped),
            Cell::new(self.succeeded),
            Cell::new(self.failed),
            Cell::new(format_rate(rate)),
            Cell::new(format!("{:.1}s", self.elapsed_secs)),
        ]
    }

    fn display_compact(&self) {
        println!(
            "{}\t{}\t{}/{}",
            self.label,
            self.state.to_string().to_lowercase(),
            self.succeeded.to_string().green(),
            self.processed
        );
    }
}
