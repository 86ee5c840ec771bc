//! LLM judge commands

use anyhow::{Context as _, Result};
use clap::Args;
use cmil_bench_core::{BenchmarkTask, JudgeConfig, Language};
use cmil_bench_workflow::{JudgeReport, JudgeRun, LlmJudge};
use comfy_table::Cell;
use std::path::PathBuf;

use crate::context::Context;
use crate::output::{status_badge, TableDisplay};

/// Grade open-ended answers with a chat model
#[derive(Debug, Args)]
pub struct JudgeCommand {
    /// Reference test data, laid out like the dataset root
    #[arg(long)]
    pub test_data: PathBuf,

    /// Predictions, laid out as `{model}/{task}/{lang}/zh-prompt_test.json[l]`
    #[arg(long)]
    pub predictions: PathBuf,

    /// Where judgements, checkpoints and error logs are written
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Chat model that grades the answers
    #[arg(long)]
    pub judge_model: Option<String>,

    /// OpenAI-compatible endpoint of the judge
    #[arg(long)]
    pub api_base: Option<String>,

    #[arg(long)]
    pub api_key: Option<String>,

    /// Concurrent judge requests
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Judge a seeded sample of this many predictions per file
    #[arg(long)]
    pub sample_size: Option<usize>,

    /// Models to judge (comma-separated); every model directory when empty
    #[arg(long, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Judged task directories (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub task: Vec<BenchmarkTask>,

    /// Languages (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub language: Vec<Language>,

    /// Keep earlier successful judgements and skip them
    #[arg(long)]
    pub resume: bool,
}

impl JudgeCommand {
    fn judge_config(&self, ctx: &Context) -> Result<JudgeConfig> {
        let settings = &ctx.config.judge;
        let model = self
            .judge_model
            .clone()
            .or_else(|| settings.model.clone())
            .context("--judge-model is required (or set judge.model in the config)")?;
        let mut config = JudgeConfig::new(
            self.api_base.clone().unwrap_or_else(|| settings.base_url.clone()),
            model,
        )
        .with_max_workers(self.max_workers.unwrap_or(settings.max_workers))
        .with_sample_size(self.sample_size);
        if let Some(key) = self.api_key.clone().or_else(|| settings.api_key.clone()) {
            config = config.with_api_key(key);
        }
        Ok(config)
    }

    fn request(&self) -> JudgeRun {
        let mut run = JudgeRun::new(&self.test_data, &self.predictions, &self.output_dir)
            .with_models(self.models.clone())
            .with_resume(self.resume);
        if !self.task.is_empty() {
            run = run.with_tasks(self.task.clone());
        }
        if !self.language.is_empty() {
            run = run.with_languages(self.language.clone());
        }
        run
    }
}

pub async fn execute(ctx: &Context, cmd: JudgeCommand) -> Result<()> {
    let judge = LlmJudge::new(cmd.judge_config(ctx)?)
        .context("Invalid judge configuration")?
        .with_cancellation(ctx.cancel.clone());

    let spinner = ctx.output.spinner("Judging answers...");
    let result = judge.run(&cmd.request()).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let reports = result.context("Judge run failed")?;

    ctx.output.write_list(
        &reports,
        &["Model", "Task", "Language", "Predictions", "Resumed", "Judged", "Succeeded", "Failed", "Status"],
    )?;

    if reports.iter().any(|r| r.checkpoint_kept) {
        ctx.output.warning("Some judgements failed; rerun with --resume to retry them");
    }
    if ctx.cancel.is_cancelled() {
        ctx.output.warning("Interrupted; rerun with --resume to continue");
    }
    Ok(())
}

fn status(report: &JudgeReport) -> &'static str {
    if report.skipped.is_some() {
        "skipped"
    } else if report.cancelled {
        "cancelled"
    } else if report.checkpoint_kept {
        "partial"
    } else {
        "done"
    }
}

impl TableDisplay for JudgeReport {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(&self.model),
            Cell::new(&self.task),
            Cell::new(&self.language),
            Cell::new(self.predictions),
            Cell::new(self.previously_succeeded),
            Cell::new(self.evaluated),
            Cell::new(self.succeeded),
            Cell::new(self.failed),
            Cell::new(status_badge(status(self))),
        ]
    }

    fn display_compact(&self) {
        println!(
            "{}/{}/{}\t{}\t{}/{}",
            self.model,
            self.task,
            self.language,
            status(self),
            self.succeeded,
            self.predictions
        );
    }
}
