//! Catalog commands

use anyhow::{Context as _, Result};
use clap::Args;
use cmil_bench_core::{BenchmarkTask, CatalogConfig, CatalogSelection, Language, PromptLang, TaskSpec};
use cmil_bench_workflow::{write_task_list, TaskCatalog};
use comfy_table::Cell;
use std::path::PathBuf;

use crate::context::Context;
use crate::output::TableDisplay;

/// Flags that select and place inference jobs
#[derive(Debug, Clone, Args)]
pub struct CatalogArgs {
    /// Model name; output files go under `{output_root}/{model}`
    #[arg(long)]
    pub model: String,

    /// Root of the benchmark datasets
    #[arg(long)]
    pub dataset_root: Option<PathBuf>,

    /// Root for inference results
    #[arg(long)]
    pub output_root: Option<PathBuf>,

    /// Evaluated languages (comma-separated: bo,mn,ug)
    #[arg(long, value_delimiter = ',')]
    pub langs: Vec<Language>,

    /// Instruction language (zh or en)
    #[arg(long)]
    pub prompt_lang: Option<PromptLang>,

    /// Task directories (comma-separated, e.g. Math_Reasoning)
    #[arg(long, value_delimiter = ',')]
    pub tasks: Vec<BenchmarkTask>,

    /// Root of the few-shot exemplar files
    #[arg(long)]
    pub exemplar_root: Option<PathBuf>,

    /// Exemplars per prompt when an exemplar root is set
    #[arg(long)]
    pub num_exemplar: Option<u32>,

    /// Skip tasks whose dataset file is missing
    #[arg(long)]
    pub skip_missing: bool,
}

impl CatalogArgs {
    pub fn catalog_config(&self, ctx: &Context) -> Result<CatalogConfig> {
        let paths = &ctx.config.paths;
        let dataset_root = ctx.resolve_path(self.dataset_root.clone(), paths.dataset_root.as_ref(), "dataset-root")?;
        let output_root = ctx.resolve_path(self.output_root.clone(), paths.output_root.as_ref(), "output-root")?;

        let mut config = CatalogConfig::new(dataset_root, output_root, self.model.clone())
            .with_prompt_lang(self.prompt_lang.unwrap_or_default())
            .with_skip_missing(self.skip_missing);
        if let Some(root) = self.exemplar_root.clone().or_else(|| paths.exemplar_root.clone()) {
            config = config.with_exemplar_root(root);
        }
        if let Some(n) = self.num_exemplar {
            config = config.with_num_exemplar(n);
        }
        Ok(config)
    }

    pub fn selection(&self) -> CatalogSelection {
        let mut selection = CatalogSelection::default();
        if !self.langs.is_empty() {
            selection.languages = self.langs.clone();
        }
        if !self.tasks.is_empty() {
            selection.tasks = self.tasks.clone();
        }
        selection
    }

    pub fn expand(&self, ctx: &Context) -> Result<Vec<TaskSpec>> {
        let catalog = TaskCatalog::new(self.catalog_config(ctx)?);
        catalog
            .expand(&self.selection())
            .context("Failed to expand the task catalog")
    }
}

/// Expand the task catalog
#[derive(Debug, Args)]
pub struct CatalogCommand {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Write the expanded jobs to a task-list file
    #[arg(long)]
    pub write: Option<PathBuf>,
}

pub async fn execute(ctx: &Context, cmd: CatalogCommand) -> Result<()> {
    let specs = cmd.catalog.expand(ctx)?;

    if let Some(path) = &cmd.write {
        write_task_list(path, &specs)
            .await
            .with_context(|| format!("Failed to write task list to {:?}", path))?;
    }

    ctx.output.write_list(
        &specs,
        &["Job", "Prompt", "Input", "Output", "Max Tokens", "Exemplars"],
    )?;

    if let Some(path) = &cmd.write {
        ctx.output.success(&format!("Wrote {} job(s) to {}", specs.len(), path.display()));
    }
    Ok(())
}

impl TableDisplay for TaskSpec {
    fn to_row(&self) -> Vec<Cell> {
        vec![
            Cell::new(self.label()),
            Cell::new(self.prompt_lang),
            Cell::new(self.input_file.display()),
            Cell::new(self.output_file.display()),
            Cell::new(self.max_new_tokens),
            Cell::new(if self.exemplar_file.is_some() { self.num_exemplar } else { 0 }),
        ]
    }

    fn display_compact(&self) {
        println!("{}\t{}", self.label(), self.output_file.display());
    }
}
