//! Task catalog: expands (languages × tasks) into concrete TaskSpecs and
//! persists them as task-list files.

use cmil_bench_core::{
    BenchmarkTask, CatalogConfig, CatalogSelection, CoreError, Language, PromptLang, Result,
    TaskKind, TaskSpec, DEFAULT_MAX_NEW_TOKENS,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use validator::Validate;

/// `{dataset_root}/{category}/{task_dir}/{lang}.json`
pub fn dataset_path(root: &Path, task: BenchmarkTask, lang: Language) -> PathBuf {
    root.join(task.category().dir_name())
        .join(task.dir_name())
        .join(format!("{}.json", lang.code()))
}

/// Result file name for a prompt language and optional translation pair.
pub fn output_file_name(prompt_lang: PromptLang, pair: Option<(Language, Language)>) -> String {
    match pair {
        Some((src, tgt)) => format!("{}-prompt_{}2{}_test.jsonl", prompt_lang, src, tgt),
        None => format!("{}-prompt_test.jsonl", prompt_lang),
    }
}

/// `{output_root}/{model}/{task_dir}/{lang}/{file}`
pub fn output_path(
    root: &Path,
    model: &str,
    task: BenchmarkTask,
    lang: Language,
    prompt_lang: PromptLang,
    pair: Option<(Language, Language)>,
) -> PathBuf {
    root.join(model)
        .join(task.dir_name())
        .join(lang.code())
        .join(output_file_name(prompt_lang, pair))
}

/// Token budget for a task named in a task list; unknown names get the
/// generic default.
pub fn max_new_tokens_for(task_name: &str) -> u32 {
    task_name
        .parse::<BenchmarkTask>()
        .map(|t| t.default_max_new_tokens())
        .unwrap_or(DEFAULT_MAX_NEW_TOKENS)
}

pub struct TaskCatalog {
    config: CatalogConfig,
}

impl TaskCatalog {
    pub fn new(config: CatalogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Expands a selection into specs: languages in the given order, tasks in
    /// declaration order, and for translation `zh→lang` before `lang→zh`.
    pub fn expand(&self, selection: &CatalogSelection) -> Result<Vec<TaskSpec>> {
        self.config.validate()?;
        let cfg = &self.config;

        let mut tasks = selection.tasks.clone();
        tasks.sort_by_key(|t| BenchmarkTask::ALL.iter().position(|x| x == t));
        tasks.dedup();

        let mut specs = Vec::new();
        for &lang in &selection.languages {
            for &task in &tasks {
                let input_file = dataset_path(&cfg.dataset_root, task, lang);
                if !input_file.is_file() {
                    if cfg.skip_missing {
                        tracing::warn!(
                            task = %task,
                            lang = %lang,
                            path = %input_file.display(),
                            "dataset file missing, skipping"
                        );
                        continue;
                    }
                    return Err(CoreError::Config(format!(
                        "dataset file not found: {}",
                        input_file.display()
                    )));
                }

                let exemplar_file = cfg
                    .exemplar_root
                    .as_deref()
                    .map(|root| dataset_path(root, task, lang));

                let pairs: Vec<Option<(Language, Language)>> = if task.kind() == TaskKind::Translation {
                    vec![Some((Language::Zh, lang)), Some((lang, Language::Zh))]
                } else {
                    vec![None]
                };

                for pair in pairs {
                    specs.push(TaskSpec {
                        task,
                        eval_lang: lang,
                        prompt_lang: cfg.prompt_lang,
                        input_file: input_file.clone(),
                        output_file: output_path(
                            &cfg.output_root,
                            &cfg.model_name,
                            task,
                            lang,
                            cfg.prompt_lang,
                            pair,
                        ),
                        exemplar_file: exemplar_file.clone(),
                        num_exemplar: if exemplar_file.is_some() { cfg.num_exemplar } else { 0 },
                        max_passage_len: task.default_max_passage_len(),
                        src_lang: pair.map(|(src, _)| src),
                        tgt_lang: pair.map(|(_, tgt)| tgt),
                        max_new_tokens: task.default_max_new_tokens(),
                    });
                }
            }
        }

        validate_specs(&specs)?;
        tracing::info!(
            model = %cfg.model_name,
            specs = specs.len(),
            languages = selection.languages.len(),
            "expanded task catalog"
        );
        Ok(specs)
    }
}

/// Checks every task spec and rejects output path collisions.
pub fn validate_specs(specs: &[TaskSpec]) -> Result<()> {
    let mut seen = HashSet::with_capacity(specs.len());
    for spec in specs {
        spec.validate_spec()?;
        if !seen.insert(spec.output_file.clone()) {
            return Err(CoreError::Config(format!(
                "duplicate output path in catalog: {}",
                spec.output_file.display()
            )));
        }
    }
    Ok(())
}

/// Task-list entry as written by hand: the task may be named by directory or
/// kind, and `max_new_tokens` may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaskListEntry {
    task: String,
    eval_lang: Language,
    prompt_lang: PromptLang,
    input_file: PathBuf,
    output_file: PathBuf,
    #[serde(default)]
    exemplar_file: Option<PathBuf>,
    #[serde(default)]
    num_exemplar: u32,
    #[serde(default)]
    max_passage_len: Option<usize>,
    #[serde(default)]
    src_lang: Option<Language>,
    #[serde(default)]
    tgt_lang: Option<Language>,
    #[serde(default)]
    max_new_tokens: Option<u32>,
}

impl TaskListEntry {
    fn into_spec(self) -> Result<TaskSpec> {
        let max_new_tokens = self
            .max_new_tokens
            .unwrap_or_else(|| max_new_tokens_for(&self.task));
        let task: BenchmarkTask = self.task.parse()?;
        Ok(TaskSpec {
            task,
            eval_lang: self.eval_lang,
            prompt_lang: self.prompt_lang,
            input_file: self.input_file,
            output_file: self.output_file,
            exemplar_file: self.exemplar_file,
            num_exemplar: self.num_exemplar,
            max_passage_len: self.max_passage_len,
            src_lang: self.src_lang,
            tgt_lang: self.tgt_lang,
            max_new_tokens,
        })
    }
}

/// Reads and validates a task-list file.
pub async fn load_task_list(path: &Path) -> Result<Vec<TaskSpec>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::Config(format!("cannot read task list {}: {}", path.display(), e)))?;
    let entries: Vec<TaskListEntry> = serde_json::from_str(&content)
        .map_err(|e| CoreError::Config(format!("invalid task list {}: {}", path.display(), e)))?;
    let specs = entries
        .into_iter()
        .map(TaskListEntry::into_spec)
        .collect::<Result<Vec<_>>>()?;
    validate_specs(&specs)?;
    for spec in &specs {
        if !spec.input_file.is_file() {
            return Err(CoreError::Config(format!(
                "dataset file not found: {}",
                spec.input_file.display()
            )));
        }
    }
    tracing::info!(path = %path.display(), specs = specs.len(), "loaded task list");
    Ok(specs)
}

/// Writes a task-list file.
pub async fn write_task_list(path: &Path, specs: &[TaskSpec]) -> Result<()> {
    crate::dataset::write_json_atomic(path, specs).await?;
    tracing::info!(path = %path.display(), specs = specs.len(), "wrote task list");
    Ok(())
}
