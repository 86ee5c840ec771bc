//! Extraction commands

use anyhow::{Context as _, Result};
use clap::Args;
use cmil_bench_workflow::{ExtractionPass, FileExtraction};
use comfy_table::Cell;
use std::path::PathBuf;

use crate::context::Context;
use crate::output::{format_rate, print_field, print_section, OutputFormat, TableDisplay};

/// Extract final answers from inference results
#[derive(Debug, Args)]
pub struct ExtractCommand {
    /// Inference results, laid out as `{model}/{task}/{lang}/*.jsonl`
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Where extracted answers and statistics are written
    #[arg(long)]
    pub output_dir: PathBuf,
}

pub async fn execute(ctx: &Context, cmd: ExtractCommand) -> Result<()> {
    let spinner = ctx.output.spinner("Extracting answers...");
    let result = ExtractionPass::new(&cmd.input_dir, &cmd.output_dir).run().await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let summary = result.with_context(|| format!("Extraction over {:?} failed", cmd.input_dir))?;

    ctx.output.write_list(
        &summary.files,
        &["Model", "Task", "Language", "File", "Items", "Invalid", "Missed", "Success"],
    )?;

    if ctx.output.format() == OutputFormat::Table {
        print_section("Summary");
        print_field("files", &summary.files.len().to_string());
        print_field("items", &summary.total_items().to_string());
        print_field("extraction failures", &summary.failed_items().to_string());
        print_field("report", &cmd.output_dir.join("extraction_report.txt").display().to_string());
    }
    for skipped in &summary.skipped {
        ctx.output.warning(&format!("Skipped {}", skipped));
    }
    Ok(())
}

impl TableDisplay for FileExtraction {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(&self.model),
            Cell::new(&self.task),
            Cell::new(&self.language),
            Cell::new(&self.stats.file_name),
            Cell::new(self.stats.total_items),
            Cell::new(self.stats.invalid_items),
            Cell::new(self.stats.extraction_failed_items),
            Cell::new(format_rate(self.stats.success_rate)),
        ]
    }

    fn display_compact(&self) {
        println!(
            "{}/{}/{}/{}\t{}",
            self.model,
            self.task,
            self.language,
            self.stats.file_name,
            format_rate(self.stats.success_rate)
        );
    }
}
