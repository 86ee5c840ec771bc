//! Extraction pass: turns raw result files into extracted answer files and
//! extraction statistics.

use cmil_bench_core::{AnswerFormat, BenchmarkTask, CoreError, ExampleId, ExtractedAnswer, InferenceResult, Language, Result, TaskKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::dataset::{read_records, write_json_atomic};
use crate::extract::{align_category, extract};

const REPORT_FAILED_ID_LIMIT: usize = 10;

/// Extracts the answer of one inference result.
///
/// Backend failures are never extracted; their answer is empty.
pub fn extract_record(kind: TaskKind, result: &InferenceResult) -> ExtractedAnswer {
    let (answer, extraction_success) = if result.succeeded {
        let extraction = extract(kind, &result.pred);
        let answer = if extraction.extracted && kind.answer_format() == AnswerFormat::Category {
            align_category(&extraction.answer, &result.gold)
        } else {
            extraction.answer
        };
        (answer, extraction.extracted)
    } else {
        (String::new(), false)
    };
    ExtractedAnswer {
        id: result.id.clone(),
        gold: result.gold.clone(),
        pred: result.pred.clone(),
        answer,
        extraction_success,
        category: result.category.clone(),
    }
}

/// Parses a raw result record; `None` when id or gold is missing.
fn parse_result(mut value: Value) -> Option<InferenceResult> {
    let gold = match value.get("gold") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return None,
    };
    ExampleId::from_value(value.get("id")?)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("gold".to_string(), Value::String(gold));
        object.entry("pred").or_insert(Value::String(String::new()));
    }
    serde_json::from_value(value).ok()
}

/// Per-file extraction outcome.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileExtractionStats {
    pub file_name: String,
    pub total_items: usize,
    pub invalid_items: usize,
    pub backend_failed_items: usize,
    pub extraction_failed_items: usize,
    pub processed_items: usize,
    pub success_rate: f64,
    /// Positions of records without id or gold.
    pub invalid_item_ids: Vec<String>,
    pub extraction_failed_ids: Vec<ExampleId>,
}

/// Extracts every record of a file, counting invalid and missed records.
pub fn extract_file(kind: TaskKind, file_name: &str, records: Vec<Value>) -> (Vec<ExtractedAnswer>, FileExtractionStats) {
    let mut stats = FileExtractionStats {
        file_name: file_name.to_string(),
        total_items: records.len(),
        ..Default::default()
    };
    let mut answers = Vec::with_capacity(records.len());

    for (index, value) in records.into_iter().enumerate() {
        let Some(result) = parse_result(value) else {
            stats.invalid_items += 1;
            stats.invalid_item_ids.push(index.to_string());
            continue;
        };
        let answer = extract_record(kind, &result);
        if !result.succeeded {
            stats.backend_failed_items += 1;
        }
        if !answer.extraction_success {
            stats.extraction_failed_items += 1;
            stats.extraction_failed_ids.push(answer.id.clone());
        }
        answers.push(answer);
    }

    stats.processed_items = answers.len();
    stats.success_rate = rate(stats.processed_items - stats.extraction_failed_items, stats.processed_items);
    (answers, stats)
}

fn rate(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Summed counts at model, task or language level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionCounts {
    pub total_items: usize,
    pub invalid_items: usize,
    pub extracted_items: usize,
    /// Valid records whose answer fell back to the raw text.
    pub failed_items: usize,
    pub success_rate: f64,
}

impl ExtractionCounts {
    fn add(&mut self, stats: &FileExtractionStats) {
        self.total_items += stats.total_items;
        self.invalid_items += stats.invalid_items;
        self.extracted_items += stats.processed_items - stats.extraction_failed_items;
        self.failed_items += stats.extraction_failed_items;
        self.success_rate = rate(self.extracted_items, self.extracted_items + self.failed_items);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskExtractionStats {
    #[serde(flatten)]
    pub counts: ExtractionCounts,
    pub languages: BTreeMap<String, ExtractionCounts>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelExtractionStats {
    #[serde(flatten)]
    pub counts: ExtractionCounts,
    pub tasks: BTreeMap<String, TaskExtractionStats>,
}

/// One processed result file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileExtraction {
    pub model: String,
    pub task: String,
    pub language: String,
    pub output_file: PathBuf,
    #[serde(flatten)]
    pub stats: FileExtractionStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessedFileEntry {
    pub file_name: String,
    pub item_count: usize,
    pub extraction_failed_count: usize,
    pub success_rate: f64,
}

/// Outcome of a whole extraction pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractionSummary {
    pub files: Vec<FileExtraction>,
    /// Files that were found but could not be read or placed.
    pub skipped: Vec<String>,
}

impl ExtractionSummary {
    pub fn by_model(&self) -> BTreeMap<String, ModelExtractionStats> {
        let mut models: BTreeMap<String, ModelExtractionStats> = BTreeMap::new();
        for file in &self.files {
            let model = models.entry(file.model.clone()).or_default();
            model.counts.add(&file.stats);
            let task = model.tasks.entry(file.task.clone()).or_default();
            task.counts.add(&file.stats);
            task.languages.entry(file.language.clone()).or_default().add(&file.stats);
        }
        models
    }

    /// model → task → lang → processed files.
    pub fn processed_files_map(&self) -> BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<ProcessedFileEntry>>>> {
        let mut map: BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<ProcessedFileEntry>>>> = BTreeMap::new();
        for file in &self.files {
            map.entry(file.model.clone())
                .or_default()
                .entry(file.task.clone())
                .or_default()
                .entry(file.language.clone())
                .or_default()
                .push(ProcessedFileEntry {
                    file_name: file.stats.file_name.clone(),
                    item_count: file.stats.processed_items,
                    extraction_failed_count: file.stats.extraction_failed_items,
                    success_rate: file.stats.success_rate,
                });
        }
        map
    }

    /// model → task → lang → file → failed ids, for files with misses.
    pub fn failed_ids(&self) -> BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<ExampleId>>>>> {
        let mut map: BTreeMap<String, BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<ExampleId>>>>> =
            BTreeMap::new();
        for file in self.files.iter().filter(|f| !f.stats.extraction_failed_ids.is_empty()) {
            map.entry(file.model.clone())
                .or_default()
                .entry(file.task.clone())
                .or_default()
                .entry(file.language.clone())
                .or_default()
                .insert(file.stats.file_name.clone(), file.stats.extraction_failed_ids.clone());
        }
        map
    }

    pub fn total_items(&self) -> usize {
        self.files.iter().map(|f| f.stats.total_items).sum()
    }

    pub fn failed_items(&self) -> usize {
        self.files.iter().map(|f| f.stats.extraction_failed_items).sum()
    }

    /// Plain-text report.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "提取统计报告");
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "生成时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out, "处理文件数: {}", self.files.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "模型级别汇总:");
        for (model, stats) in self.by_model() {
            let _ = writeln!(out, "  {}: {}", model, describe(&stats.counts));
            for (task, task_stats) in &stats.tasks {
                let _ = writeln!(out, "    {}: {}", task, describe(&task_stats.counts));
                for (lang, counts) in &task_stats.languages {
                    let _ = writeln!(out, "      {}: {}", lang, describe(counts));
                }
            }
        }

        let failed: Vec<&FileExtraction> = self
            .files
            .iter()
            .filter(|f| !f.stats.extraction_failed_ids.is_empty())
            .collect();
        if !failed.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "提取失败详情:");
            for file in failed {
                let ids = &file.stats.extraction_failed_ids;
                let mut shown: Vec<String> = ids.iter().take(REPORT_FAILED_ID_LIMIT).map(|id| id.to_string()).collect();
                if ids.len() > REPORT_FAILED_ID_LIMIT {
                    shown.push("...".to_string());
                }
                let _ = writeln!(
                    out,
                    "  {}/{}/{}/{}: {} 条失败 [{}]",
                    file.model,
                    file.task,
                    file.language,
                    file.stats.file_name,
                    ids.len(),
                    shown.join(", ")
                );
            }
        }

        if !self.skipped.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "跳过的文件:");
            for path in &self.skipped {
                let _ = writeln!(out, "  {}", path);
            }
        }
        out
    }
}

fn describe(counts: &ExtractionCounts) -> String {
    format!(
        "总数 {}, 无效 {}, 提取成功 {}, 提取失败 {}, 成功率 {:.2}%",
        counts.total_items,
        counts.invalid_items,
        counts.extracted_items,
        counts.failed_items,
        counts.success_rate * 100.0
    )
}

/// A result file located at `{model}/{task_dir}/{lang}/{file}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFile {
    pub path: PathBuf,
    pub model: String,
    pub task: BenchmarkTask,
    pub language: Language,
    pub file_name: String,
}

impl ResultFile {
    /// Extracted file name: the same stem with a `.json` extension.
    pub fn output_name(&self) -> String {
        let stem = Path::new(&self.file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file_name.clone());
        format!("{}.json", stem)
    }
}

/// Result files are named `…_test.json[l]`; the runner's checkpoints, error
/// id lists and temp files next to them are not.
fn is_result_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with("_test.json") || name.ends_with("_test.jsonl")
}

/// Finds `{root}/{model}/{task_dir}/{lang}/*_test.json[l]`, sorted by path.
///
/// Paths whose task directory or language code is unknown are returned
/// separately.
pub fn discover_result_files(root: &Path) -> (Vec<ResultFile>, Vec<PathBuf>) {
    let mut found = Vec::new();
    let mut unknown = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(4)
        .max_depth(4)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_result_file(path) {
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let [model, task, lang, file_name] = parts.as_slice() else {
            continue;
        };
        match (task.parse::<BenchmarkTask>(), lang.parse::<Language>()) {
            (Ok(task), Ok(language)) => found.push(ResultFile {
                path: path.to_path_buf(),
                model: model.clone(),
                task,
                language,
                file_name: file_name.clone(),
            }),
            _ => unknown.push(path.to_path_buf()),
        }
    }
    (found, unknown)
}

/// Walks an inference output tree and writes the extracted mirror.
#[derive(Debug, Clone)]
pub struct ExtractionPass {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl ExtractionPass {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub async fn run(&self) -> Result<ExtractionSummary> {
        if !self.input_dir.is_dir() {
            return Err(CoreError::NotFound(format!(
                "input directory {} does not exist",
                self.input_dir.display()
            )));
        }
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let (files, unknown) = discover_result_files(&self.input_dir);
        let mut summary = ExtractionSummary::default();
        for path in unknown {
            tracing::warn!(path = %path.display(), "unrecognized task or language directory");
            summary.skipped.push(path.display().to_string());
        }

        for file in files {
            let records = match read_records(&file.path).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(path = %file.path.display(), error = %e, "cannot read result file");
                    summary.skipped.push(file.path.display().to_string());
                    continue;
                }
            };

            let (answers, stats) = extract_file(file.task.kind(), &file.file_name, records);
            let output_file = self
                .output_dir
                .join(&file.model)
                .join(file.task.dir_name())
                .join(file.language.code())
                .join(file.output_name());
            write_json_atomic(&output_file, &answers).await?;

            tracing::info!(
                model = %file.model,
                task = %file.task,
                lang = %file.language,
                file = %file.file_name,
                total = stats.total_items,
                invalid = stats.invalid_items,
                failed = stats.extraction_failed_items,
                "extracted answers"
            );
            summary.files.push(FileExtraction {
                model: file.model,
                task: file.task.dir_name().to_string(),
                language: file.language.code().to_string(),
                output_file,
                stats,
            });
        }

        self.write_artifacts(&summary).await?;
        Ok(summary)
    }

    async fn write_artifacts(&self, summary: &ExtractionSummary) -> Result<()> {
        write_json_atomic(&self.output_dir.join("processed_files_map.json"), &summary.processed_files_map()).await?;
        write_json_atomic(&self.output_dir.join("extraction_failed_ids.json"), &summary.failed_ids()).await?;
        let statistics = serde_json::json!({
            "by_model": summary.by_model(),
            "raw_stats": summary.files,
        });
        write_json_atomic(&self.output_dir.join("extraction_statistics.json"), &statistics).await?;
        tokio::fs::write(self.output_dir.join("extraction_report.txt"), summary.render_report()).await?;
        Ok(())
    }
}
