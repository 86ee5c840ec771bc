//! LLM-as-judge grading of culture QA and instruction QA answers.

pub mod rubric;

pub use rubric::*;

use chrono::{DateTime, Utc};
use cmil_bench_client::{ChatRequest, ClientConfig, HttpClient};
use cmil_bench_core::{BenchmarkTask, CoreError, ExampleId, JudgeConfig, JudgeScore, Language, Result, TaskKind};
use futures::stream::{self, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::catalog::dataset_path;
use crate::dataset::{read_json, read_json_array, read_records, remove_if_exists, write_json_atomic, ErrorLog};

const JUDGE_TEMPERATURE: f32 = 0.2;
const SAMPLE_SEED: u64 = 42;
const PREDICTION_STEM: &str = "zh-prompt_test";
const ERROR_DETAIL_LIMIT: usize = 500;

/// One prediction joined with its test item.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeItem {
    pub id: ExampleId,
    pub question: String,
    pub reference: String,
    pub prediction: String,
    pub subcategory: Option<String>,
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn record_id(value: &Value) -> Option<ExampleId> {
    ["id", "query_id"]
        .iter()
        .find_map(|key| value.get(*key).and_then(ExampleId::from_value))
}

/// Joins predictions with test data by id.
///
/// Returns the joined items in prediction order and the ids of predictions
/// without a test item.
pub fn join_items(test_data: &[Value], predictions: &[Value]) -> (Vec<JudgeItem>, Vec<ExampleId>) {
    let index: HashMap<ExampleId, &Value> = test_data
        .iter()
        .filter_map(|item| record_id(item).map(|id| (id, item)))
        .collect();

    let mut items = Vec::with_capacity(predictions.len());
    let mut orphans = Vec::new();
    for prediction in predictions {
        let Some(id) = record_id(prediction) else {
            continue;
        };
        let Some(test_item) = index.get(&id) else {
            orphans.push(id);
            continue;
        };
        let subcategory = str_field(prediction, "subcategory").or_else(|| {
            test_item
                .get("metadata")
                .and_then(|m| str_field(m, "subcategory"))
        });
        items.push(JudgeItem {
            id,
            question: str_field(test_item, "question").unwrap_or_default(),
            reference: str_field(test_item, "answer").unwrap_or_default(),
            prediction: str_field(prediction, "answer")
                .or_else(|| str_field(prediction, "pred"))
                .unwrap_or_default(),
            subcategory,
        });
    }
    (items, orphans)
}

/// Picks `size` items with a fixed seed, keeping their original order.
pub fn sample_items<T>(items: Vec<T>, size: Option<usize>) -> Vec<T> {
    let Some(size) = size.filter(|n| *n > 0 && *n < items.len()) else {
        return items;
    };
    let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
    let picked: BTreeSet<usize> = rand::seq::index::sample(&mut rng, items.len(), size)
        .into_iter()
        .collect();
    items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| picked.contains(i))
        .map(|(_, item)| item)
        .collect()
}

/// Files of one judged (model, task, language).
#[derive(Debug, Clone, PartialEq)]
pub struct JudgePaths {
    pub evaluation: PathBuf,
    pub checkpoint: PathBuf,
    pub error_log: PathBuf,
    pub error_ids: PathBuf,
}

impl JudgePaths {
    pub fn new(output_root: &Path, model: &str, task: BenchmarkTask, language: Language) -> Self {
        let dir = output_root.join(model).join(task.dir_name());
        let lang = language.code();
        Self {
            evaluation: dir.join(format!("{}_evaluation.json", lang)),
            checkpoint: dir.join(format!("{}_checkpoint.json", lang)),
            error_log: dir.join(format!("{}_errors.log", lang)),
            error_ids: dir.join(format!("{}_error_ids.json", lang)),
        }
    }
}

/// Judge artifact a scoring pass reads: `{judge_dir}/{model}/{task_dir}/{lang}_evaluation.json`.
pub fn evaluation_path(judge_dir: &Path, model: &str, task: BenchmarkTask, language: Language) -> PathBuf {
    JudgePaths::new(judge_dir, model, task, language).evaluation
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeCheckpoint {
    pub processed_successful_ids: Vec<ExampleId>,
    pub successful_evaluation_results: Vec<JudgeScore>,
    pub timestamp: DateTime<Utc>,
}

/// What to judge.
#[derive(Debug, Clone)]
pub struct JudgeRun {
    pub test_data_root: PathBuf,
    pub predictions_root: PathBuf,
    pub output_root: PathBuf,
    /// Every model directory under the predictions root when empty.
    pub models: Vec<String>,
    pub tasks: Vec<BenchmarkTask>,
    pub languages: Vec<Language>,
    pub resume: bool,
}

impl JudgeRun {
    pub fn new(
        test_data_root: impl Into<PathBuf>,
        predictions_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            test_data_root: test_data_root.into(),
            predictions_root: predictions_root.into(),
            output_root: output_root.into(),
            models: Vec::new(),
            tasks: BenchmarkTask::ALL
                .iter()
                .copied()
                .filter(|t| t.kind().is_judged())
                .collect(),
            languages: Language::EVALUATED.to_vec(),
            resume: false,
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<BenchmarkTask>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_languages(mut self, languages: Vec<Language>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_resume(mut self, resume: bool) -> Self {
        self.resume = resume;
        self
    }
}

/// Outcome of judging one (model, task, language).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JudgeReport {
    pub model: String,
    pub task: String,
    pub language: String,
    pub predictions: usize,
    pub previously_succeeded: usize,
    pub evaluated: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub checkpoint_kept: bool,
    /// Why the pair was not judged at all.
    pub skipped: Option<String>,
}

#[derive(Debug)]
enum Outcome {
    Scored(JudgeScore),
    Rejected { score: JudgeScore, reason: String },
}

/// Grades answers with a chat model.
pub struct LlmJudge {
    config: JudgeConfig,
    client: HttpClient,
    cancel: CancellationToken,
}

impl LlmJudge {
    pub fn new(config: JudgeConfig) -> Result<Self> {
        config.validate()?;
        let client_config = ClientConfig::new(config.base_url.clone())
            .with_api_key(config.api_key.clone())
            .with_max_retries(config.max_retries);
        let client = HttpClient::new(client_config)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: JudgeConfig, client: HttpClient) -> Self {
        Self {
            config,
            client,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Grades one item.
    ///
    /// Transport failures and unusable replies come back as a rejected
    /// outcome; only authentication failures are errors.
    async fn grade(&self, kind: TaskKind, language: Language, item: &JudgeItem) -> Result<Outcome> {
        let input = JudgeInput {
            language,
            question: &item.question,
            reference: &item.reference,
            prediction: &item.prediction,
            subcategory: item.subcategory.as_deref(),
        };
        let prompt = build_judge_prompt(kind, &input)?;
        let request = ChatRequest::new(self.config.model.clone(), prompt.to_messages())
            .with_temperature(JUDGE_TEMPERATURE)
            .with_max_tokens(self.config.max_tokens);

        let mut score = JudgeScore {
            id: item.id.clone(),
            question: item.question.clone(),
            reference_answer: item.reference.clone(),
            model_answer: item.prediction.clone(),
            dimension_scores: Default::default(),
            summary: String::new(),
            final_score: None,
            subcategory: item.subcategory.clone(),
            raw_response: None,
        };

        let reply = match self.client.chat(&request).await {
            Ok(reply) => reply,
            Err(e) if e.error.is_auth_failure() => return Err(e.into()),
            Err(e) => {
                tracing::debug!(id = %item.id, attempts = e.attempts, error = %e.error, "judge request failed");
                return Ok(Outcome::Rejected {
                    score,
                    reason: format!("评估API调用失败: {}", e.error),
                });
            }
        };
        let text = match reply.value.content() {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                return Ok(Outcome::Rejected {
                    score,
                    reason: format!("评估API调用失败: {}", e),
                })
            }
        };

        let dimensions = judge_dimensions(kind, item.subcategory.as_deref());
        let verdict = parse_judge_reply(&text, &dimensions);
        let success = verdict.is_success();
        score.dimension_scores = verdict.dimension_scores;
        score.summary = verdict.summary;
        score.final_score = verdict.final_score;
        score.raw_response = Some(text);
        if success {
            Ok(Outcome::Scored(score))
        } else {
            Ok(Outcome::Rejected {
                score,
                reason: "评估不成功".to_string(),
            })
        }
    }

    /// Judges every requested (model, task, language) in order.
    ///
    /// An authentication failure stops the run; missing inputs skip a pair.
    pub async fn run(&self, request: &JudgeRun) -> Result<Vec<JudgeReport>> {
        let models = if request.models.is_empty() {
            discover_models(&request.predictions_root).await?
        } else {
            request.models.clone()
        };

        let mut reports = Vec::new();
        for model in &models {
            for task in &request.tasks {
                if !task.kind().is_judged() {
                    return Err(CoreError::Config(format!("task {} is not judged", task)));
                }
                for language in &request.languages {
                    if self.cancel.is_cancelled() {
                        return Ok(reports);
                    }
                    let report = self.judge_pair(request, model, *task, *language).await?;
                    reports.push(report);
                }
            }
        }
        Ok(reports)
    }

    async fn judge_pair(&self, request: &JudgeRun, model: &str, task: BenchmarkTask, language: Language) -> Result<JudgeReport> {
        let paths = JudgePaths::new(&request.output_root, model, task, language);
        let mut report = JudgeReport {
            model: model.to_string(),
            task: task.dir_name().to_string(),
            language: language.code().to_string(),
            ..Default::default()
        };

        let test_path = dataset_path(&request.test_data_root, task, language);
        let test_data = match read_json_array(&test_path).await {
            Ok(data) if !data.is_empty() => data,
            Ok(_) => {
                tracing::warn!(path = %test_path.display(), "test data is empty");
                report.skipped = Some(format!("test data is empty: {}", test_path.display()));
                return Ok(report);
            }
            Err(e) => {
                tracing::warn!(path = %test_path.display(), error = %e, "test data unavailable");
                report.skipped = Some(format!("test data unavailable: {}", e));
                return Ok(report);
            }
        };

        let Some(prediction_path) = find_predictions(&request.predictions_root, model, task, language) else {
            tracing::warn!(model, task = %task, lang = %language, "predictions not found");
            report.skipped = Some("predictions not found".to_string());
            return Ok(report);
        };
        let predictions = match read_records(&prediction_path).await {
            Ok(predictions) => predictions,
            Err(e) => {
                tracing::warn!(path = %prediction_path.display(), error = %e, "cannot read predictions");
                report.skipped = Some(format!("cannot read predictions: {}", e));
                return Ok(report);
            }
        };

        self.judge_file(task.kind(), language, &test_data, &predictions, &paths, request.resume, report)
            .await
    }

    /// Judges the predictions of one file against its test data.
    #[allow(clippy::too_many_arguments)]
    pub async fn judge_file(
        &self,
        kind: TaskKind,
        language: Language,
        test_data: &[Value],
        predictions: &[Value],
        paths: &JudgePaths,
        resume: bool,
        mut report: JudgeReport,
    ) -> Result<JudgeReport> {
        let errors = ErrorLog::new(&paths.error_log, &paths.error_ids);
        report.predictions = predictions.len();

        let mut successes: Vec<JudgeScore> = if resume { load_previous(paths).await } else { Vec::new() };
        let mut done: BTreeSet<ExampleId> = successes.iter().map(|s| s.id.clone()).collect();
        report.previously_succeeded = done.len();

        let (items, orphans) = join_items(test_data, predictions);
        if !orphans.is_empty() {
            let failures: Vec<(ExampleId, String)> = orphans
                .into_iter()
                .map(|id| (id, format!("{} / {}", kind, language)))
                .collect();
            report.failed += failures.len();
            errors.record("找不到原始测试数据", &failures).await?;
        }

        let pending: Vec<JudgeItem> = items.into_iter().filter(|item| !done.contains(&item.id)).collect();
        let pending = sample_items(pending, self.config.sample_size);
        tracing::info!(
            model = %report.model,
            task = %report.task,
            lang = %report.language,
            pending = pending.len(),
            previously_succeeded = report.previously_succeeded,
            "judging"
        );

        let mut since_save = 0usize;
        let mut last_save = Instant::now();
        let interval: Duration = self.config.checkpoint_interval();
        let mut fatal: Option<CoreError> = None;

        let mut in_flight = stream::iter(pending.iter())
            .map(|item| async move { (item, self.grade(kind, language, item).await) })
            .buffer_unordered(self.config.max_workers.max(1));

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                next = in_flight.next() => next,
            };
            let Some((item, outcome)) = next else {
                break;
            };
            report.evaluated += 1;
            since_save += 1;

            match outcome {
                Ok(Outcome::Scored(score)) => {
                    if done.insert(score.id.clone()) {
                        successes.push(score);
                    }
                    report.succeeded += 1;
                }
                Ok(Outcome::Rejected { score, reason }) => {
                    report.failed += 1;
                    let detail: String = score
                        .raw_response
                        .as_deref()
                        .unwrap_or("无评估文本")
                        .chars()
                        .take(ERROR_DETAIL_LIMIT)
                        .collect();
                    errors
                        .record(&reason, &[(item.id.clone(), detail)])
                        .await?;
                }
                Err(e) if e.stops_run() => {
                    report.failed += 1;
                    fatal = Some(e);
                    break;
                }
                Err(e) => {
                    report.failed += 1;
                    errors
                        .record("处理样本时发生严重错误", &[(item.id.clone(), e.to_string())])
                        .await?;
                }
            }

            if (since_save >= self.config.checkpoint_interval_items || last_save.elapsed() >= interval)
                && !successes.is_empty()
            {
                save_state(paths, &successes).await?;
                since_save = 0;
                last_save = Instant::now();
            }
        }
        drop(in_flight);

        if !successes.is_empty() {
            save_state(paths, &successes).await?;
        }

        let prediction_ids: BTreeSet<ExampleId> = predictions.iter().filter_map(record_id).collect();
        let complete = prediction_ids.iter().all(|id| done.contains(id));
        if complete && !report.cancelled && report.failed == 0 && fatal.is_none() {
            remove_if_exists(&paths.checkpoint).await?;
        } else {
            report.checkpoint_kept = paths.checkpoint.exists();
        }

        tracing::info!(
            model = %report.model,
            task = %report.task,
            lang = %report.language,
            succeeded = report.succeeded,
            failed = report.failed,
            total_succeeded = done.len(),
            "judging finished"
        );

        match fatal {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

async fn save_state(paths: &JudgePaths, successes: &[JudgeScore]) -> Result<()> {
    write_json_atomic(&paths.evaluation, successes).await?;
    let checkpoint = JudgeCheckpoint {
        processed_successful_ids: successes.iter().map(|s| s.id.clone()).collect(),
        successful_evaluation_results: successes.to_vec(),
        timestamp: Utc::now(),
    };
    write_json_atomic(&paths.checkpoint, &checkpoint).await
}

/// Successful results of a previous run: the evaluation file first, the
/// checkpoint when that holds nothing.
async fn load_previous(paths: &JudgePaths) -> Vec<JudgeScore> {
    let mut seen = BTreeSet::new();
    let from_output = match read_json::<Vec<JudgeScore>>(&paths.evaluation).await {
        Ok(Some(scores)) => scores,
        Ok(None) => Vec::new(),
        Err(e) => {
            tracing::warn!(path = %paths.evaluation.display(), error = %e, "ignoring unreadable evaluation file");
            Vec::new()
        }
    };
    let scores = if from_output.iter().any(JudgeScore::is_success) {
        from_output
    } else {
        match read_json::<JudgeCheckpoint>(&paths.checkpoint).await {
            Ok(Some(checkpoint)) => {
                let ids: BTreeSet<&ExampleId> = checkpoint.processed_successful_ids.iter().collect();
                checkpoint
                    .successful_evaluation_results
                    .iter()
                    .filter(|s| ids.contains(&s.id))
                    .cloned()
                    .collect()
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(path = %paths.checkpoint.display(), error = %e, "ignoring unreadable checkpoint");
                Vec::new()
            }
        }
    };
    scores
        .into_iter()
        .filter(|s| s.is_success() && seen.insert(s.id.clone()))
        .collect()
}

/// `{root}/{model}/{task_dir}/{lang}/zh-prompt_test.json`, or `.jsonl`.
pub fn find_predictions(root: &Path, model: &str, task: BenchmarkTask, language: Language) -> Option<PathBuf> {
    let dir = root.join(model).join(task.dir_name()).join(language.code());
    ["json", "jsonl"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", PREDICTION_STEM, ext)))
        .find(|path| path.is_file())
}

async fn discover_models(root: &Path) -> Result<Vec<String>> {
    let mut entries = tokio::fs::read_dir(root)
        .await
        .map_err(|e| CoreError::NotFound(format!("predictions directory {}: {}", root.display(), e)))?;
    let mut models = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            models.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    models.sort();
    if models.is_empty() {
        return Err(CoreError::NotFound(format!("no model directories under {}", root.display())));
    }
    Ok(models)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_uses_query_id_and_metadata_subcategory() {
        let test_data = vec![
            json!({"query_id": "q1", "question": "问", "answer": "答", "metadata": {"subcategory": "历史"}}),
            json!({"id": 2, "question": "问2", "answer": "答2"}),
        ];
        let predictions = vec![
            json!({"id": "q1", "pred": "raw", "gold": "答"}),
            json!({"id": "2", "answer": "extracted", "pred": "raw", "subcategory": "推理"}),
            json!({"id": "9", "pred": "orphan"}),
        ];
        let (items, orphans) = join_items(&test_data, &predictions);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].subcategory.as_deref(), Some("历史"));
        assert_eq!(items[0].prediction, "raw");
        assert_eq!(items[1].prediction, "extracted");
        assert_eq!(items[1].subcategory.as_deref(), Some("推理"));
        assert_eq!(orphans, vec![ExampleId::from("9")]);
    }

    #[test]
    fn test_sampling_is_seeded_and_ordered() {
        let items: Vec<usize> = (0..50).collect();
        let a = sample_items(items.clone(), Some(5));
        let b = sample_items(items.clone(), Some(5));
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_items(items.clone(), Some(100)).len(), 50);
        assert_eq!(sample_items(items, None).len(), 50);
    }

    #[test]
    fn test_paths_layout() {
        let paths = JudgePaths::new(Path::new("/out"), "m", BenchmarkTask::MinorityCultureQa, Language::Ug);
        assert_eq!(paths.evaluation, PathBuf::from("/out/m/Minority_Culture_QA/ug_evaluation.json"));
        assert_eq!(paths.checkpoint, PathBuf::from("/out/m/Minority_Culture_QA/ug_checkpoint.json"));
    }
}
