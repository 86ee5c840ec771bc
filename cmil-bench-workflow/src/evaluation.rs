//! Evaluation pass: scores extracted answer files, ranks models and writes
//! the summary and ranking reports.

use cmil_bench_core::{BenchmarkTask, CoreError, ExtractedAnswer, JudgeScore, Language, Result, ScoreRecord};
use cmil_bench_metrics::{rank_models, score_file, FileContext, FileScore, JudgeScores, Rankings, ScoringGap};
use comfy_table::{presets::UTF8_FULL, Table};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::dataset::{read_json, read_records, write_json_atomic};
use crate::extraction::{discover_result_files, ResultFile};
use crate::judge::evaluation_path;

/// Restricts an evaluation pass; empty lists select everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationFilter {
    pub models: Vec<String>,
    pub tasks: Vec<BenchmarkTask>,
    pub languages: Vec<Language>,
}

impl EvaluationFilter {
    pub fn matches(&self, file: &ResultFile) -> bool {
        (self.models.is_empty() || self.models.contains(&file.model))
            && (self.tasks.is_empty() || self.tasks.contains(&file.task))
            && (self.languages.is_empty() || self.languages.contains(&file.language))
    }
}

/// Scores, rankings and gaps of one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationOutcome {
    pub scores: Vec<FileScore>,
    pub rankings: Rankings,
    pub gaps: Vec<ScoringGap>,
}

impl EvaluationOutcome {
    /// Every score record, in (model, task, language, file) order.
    pub fn summary_rows(&self) -> Vec<ScoreRecord> {
        self.scores.iter().flat_map(|s| s.records.iter().cloned()).collect()
    }

    /// Human-readable ranking report.
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "模型排名报告");
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out, "生成时间: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
        let _ = writeln!(out);

        let _ = writeln!(out, "综合排名:");
        let mut overall = Table::new();
        overall.load_preset(UTF8_FULL);
        overall.set_header(vec!["排名", "模型名称", "综合得分", "平均排名", "评估任务数"]);
        for entry in &self.rankings.overall {
            overall.add_row(vec![
                entry.overall_rank.to_string(),
                entry.model.clone(),
                entry.total_score.to_string(),
                format!("{:.2}", entry.average_rank),
                entry.tasks_evaluated.to_string(),
            ]);
        }
        let _ = writeln!(out, "{}", overall);

        if !self.rankings.partial.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "未完整评估的模型:");
            for partial in &self.rankings.partial {
                let _ = writeln!(
                    out,
                    "  {}: 已评估 {} 个任务, 缺少 {}",
                    partial.model,
                    partial.tasks_evaluated,
                    partial.tasks_missing.join(", ")
                );
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "任务级别排名:");
        for (key, entries) in &self.rankings.per_task {
            let _ = writeln!(out);
            let _ = writeln!(out, "任务: {}", key);
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["排名", "模型名称", "得分", "指标"]);
            for entry in entries {
                table.add_row(vec![
                    entry.rank.to_string(),
                    entry.model.clone(),
                    entry.score.map_or_else(|| "-".to_string(), |s| format!("{:.4}", s)),
                    entry.metric.clone(),
                ]);
            }
            let _ = writeln!(out, "{}", table);
        }

        if !self.gaps.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "缺失的评估结果:");
            for gap in &self.gaps {
                let _ = writeln!(out, "  {}/{}/{}/{}: {}", gap.model, gap.task, gap.language, gap.file, gap.reason);
            }
        }
        out
    }
}

/// Loads the successful judge scores of an artifact, keyed by id.
pub async fn load_judge_scores(path: &Path) -> Result<Option<JudgeScores>> {
    let Some(scores) = read_json::<Vec<JudgeScore>>(path).await? else {
        return Ok(None);
    };
    Ok(Some(
        scores
            .into_iter()
            .filter(JudgeScore::is_success)
            .filter_map(|s| s.final_score.map(|score| (s.id, score)))
            .collect(),
    ))
}

async fn load_answers(path: &Path) -> Result<Vec<ExtractedAnswer>> {
    let records = read_records(path).await?;
    let total = records.len();
    let answers: Vec<ExtractedAnswer> = records
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    if answers.len() < total {
        tracing::warn!(path = %path.display(), skipped = total - answers.len(), "skipping malformed extracted records");
    }
    Ok(answers)
}

/// Scores an extracted answer tree.
#[derive(Debug, Clone)]
pub struct EvaluationPass {
    input_dir: PathBuf,
    output_dir: PathBuf,
    judge_dir: Option<PathBuf>,
    filter: EvaluationFilter,
}

impl EvaluationPass {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            judge_dir: None,
            filter: EvaluationFilter::default(),
        }
    }

    pub fn with_judge_dir(mut self, judge_dir: impl Into<PathBuf>) -> Self {
        self.judge_dir = Some(judge_dir.into());
        self
    }

    pub fn with_filter(mut self, filter: EvaluationFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Scores every matching file. Unscorable files become gaps.
    pub async fn score(&self) -> Result<EvaluationOutcome> {
        if !self.input_dir.is_dir() {
            return Err(CoreError::NotFound(format!(
                "input directory {} does not exist",
                self.input_dir.display()
            )));
        }

        let (files, unknown) = discover_result_files(&self.input_dir);
        for path in unknown {
            tracing::warn!(path = %path.display(), "unrecognized task or language directory");
        }

        let mut outcome = EvaluationOutcome::default();
        for file in files.into_iter().filter(|f| self.filter.matches(f)) {
            let context = FileContext::new(file.model.clone(), file.task, file.language, file.file_name.clone());
            let answers = match load_answers(&file.path).await {
                Ok(answers) => answers,
                Err(e) => {
                    outcome.gaps.push(ScoringGap::new(&context, format!("unreadable: {}", e)));
                    continue;
                }
            };

            let judge = if file.task.kind().is_judged() {
                match self.judge_scores(&file).await {
                    Ok(scores) => Some(scores),
                    Err(reason) => {
                        tracing::warn!(model = %file.model, task = %file.task, lang = %file.language, "{}", reason);
                        outcome.gaps.push(ScoringGap::new(&context, reason));
                        continue;
                    }
                }
            } else {
                None
            };

            match score_file(&answers, &context, judge.as_ref()) {
                Ok(score) => outcome.scores.push(score),
                Err(gap) => {
                    tracing::warn!(
                        model = %gap.model,
                        task = %gap.task,
                        lang = %gap.language,
                        file = %gap.file,
                        reason = %gap.reason,
                        "aggregation gap"
                    );
                    outcome.gaps.push(gap);
                }
            }
        }

        outcome.rankings = rank_models(&outcome.scores);
        tracing::info!(
            files = outcome.scores.len(),
            gaps = outcome.gaps.len(),
            models = outcome.rankings.overall.len() + outcome.rankings.partial.len(),
            "evaluation scored"
        );
        Ok(outcome)
    }

    /// Judge scores of a file, or the reason they are unavailable.
    async fn judge_scores(&self, file: &ResultFile) -> std::result::Result<JudgeScores, String> {
        let Some(judge_dir) = self.judge_dir.as_deref() else {
            return Err("judge directory not configured".to_string());
        };
        let path = evaluation_path(judge_dir, &file.model, file.task, file.language);
        match load_judge_scores(&path).await {
            Ok(Some(scores)) => Ok(scores),
            Ok(None) => Err(format!("judge artifact missing: {}", path.display())),
            Err(e) => Err(format!("judge artifact unreadable: {}: {}", path.display(), e)),
        }
    }

    /// Scores, ranks and writes every report.
    pub async fn run(&self) -> Result<EvaluationOutcome> {
        let outcome = self.score().await?;
        self.write_reports(&outcome).await?;
        Ok(outcome)
    }

    pub async fn write_reports(&self, outcome: &EvaluationOutcome) -> Result<()> {
        let dir = &self.output_dir;
        tokio::fs::create_dir_all(dir).await?;
        write_json_atomic(&dir.join("evaluation_summary.json"), &outcome.summary_rows()).await?;
        write_json_atomic(&dir.join("task_ranking.json"), &outcome.rankings.task_rows()).await?;
        write_json_atomic(&dir.join("model_overall_ranking.json"), &outcome.rankings.overall).await?;
        write_json_atomic(&dir.join("partial_models.json"), &outcome.rankings.partial).await?;
        write_json_atomic(&dir.join("aggregation_gaps.json"), &outcome.gaps).await?;
        tokio::fs::write(dir.join("ranking_report.txt"), outcome.render_report()).await?;
        tracing::info!(dir = %dir.display(), "evaluation reports written");
        Ok(())
    }
}
