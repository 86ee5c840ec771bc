//! Evaluation commands

use anyhow::{Context as _, Result};
use clap::Args;
use cmil_bench_core::{BenchmarkTask, Language};
use cmil_bench_workflow::{EvaluationFilter, EvaluationPass};
use cmil_bench_metrics::OverallRankingEntry;
use comfy_table::Cell;
use std::path::PathBuf;

use crate::context::Context;
use crate::output::{print_field, print_section, OutputFormat, TableDisplay};

/// Score extracted answers and rank models
#[derive(Debug, Args)]
pub struct EvaluateCommand {
    /// Extracted answers, laid out as `{model}/{task}/{lang}/*.json`
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Where summaries, rankings and the report are written
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Output root of the judge; required to score judged tasks
    #[arg(long)]
    pub judge_dir: Option<PathBuf>,

    /// Models to score (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub model: Vec<String>,

    /// Task directories (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub task: Vec<BenchmarkTask>,

    /// Languages (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub language: Vec<Language>,
}

pub async fn execute(ctx: &Context, cmd: EvaluateCommand) -> Result<()> {
    let mut pass = EvaluationPass::new(&cmd.input_dir, &cmd.output_dir).with_filter(EvaluationFilter {
        models: cmd.model.clone(),
        tasks: cmd.task.clone(),
        languages: cmd.language.clone(),
    });
    if let Some(dir) = &cmd.judge_dir {
        pass = pass.with_judge_dir(dir);
    }

    let outcome = pass
        .run()
        .await
        .with_context(|| format!("Evaluation over {:?} failed", cmd.input_dir))?;

    ctx.output.write_list(
        &outcome.rankings.overall,
        &["Rank", "Model", "Total Score", "Average Rank", "Tasks"],
    )?;

    for partial in &outcome.rankings.partial {
        ctx.output.warning(&format!(
            "{} was not ranked on {} task(s): {}",
            partial.model,
            partial.tasks_missing.len(),
            partial.tasks_missing.join(", ")
        ));
    }
    for gap in &outcome.gaps {
        ctx.output.warning(&format!(
            "{} {} {} {}: {}",
            gap.model, gap.task, gap.language, gap.file, gap.reason
        ));
    }

    if ctx.output.format() == OutputFormat::Table {
        print_section("Summary");
        print_field("scored files", &outcome.scores.len().to_string());
        print_field("task rankings", &outcome.rankings.per_task.len().to_string());
        print_field("report", &cmd.output_dir.join("ranking_report.txt").display().to_string());
    }
    Ok(())
}

impl TableDisplay for OverallRankingEntry {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(self.overall_rank),
            Cell::new(&self.model),
            Cell::new(self.total_score),
            Cell::new(format!("{:.2}", self.average_rank)),
            Cell::new(self.tasks_evaluated),
        ]
    }

    fn display_compact(&self) {
        println!("{}\t{}\t{:.2}", self.overall_rank, self.model, self.average_rank);
    }
}
