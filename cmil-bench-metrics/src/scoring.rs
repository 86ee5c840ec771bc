use cmil_bench_core::{
    BenchmarkTask, ExampleId, ExtractedAnswer, Language, MetricName, ScoreRecord, ScoreType,
    TaskKind, TranslationDirection,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::aggregators::ScoreSplit;
use crate::calculators::{AccuracyCalculator, BleuCalculator, ChrfCalculator, RougeCalculator};

/// Judge final scores of successfully judged examples.
pub type JudgeScores = HashMap<ExampleId, f64>;

/// Identity of one extracted answer file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileContext {
    pub model: String,
    pub task: BenchmarkTask,
    pub language: Language,
    pub file: String,
}

impl FileContext {
    pub fn new(model: impl Into<String>, task: BenchmarkTask, language: Language, file: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            task,
            language,
            file: file.into(),
        }
    }

    pub fn direction(&self) -> Option<TranslationDirection> {
        if self.task.kind() == TaskKind::Translation {
            TranslationDirection::from_file_name(&self.file)
        } else {
            None
        }
    }

    /// Result file variant: the file stem without its `_test` suffix.
    pub fn variant(&self) -> String {
        let stem = self.file.split('.').next().unwrap_or(&self.file);
        stem.strip_suffix("_test").unwrap_or(stem).to_string()
    }
}

/// Metrics computed for one file, the first being the ranking metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricPlan {
    pub primary: MetricName,
    pub metrics: Vec<MetricName>,
}

impl MetricPlan {
    pub fn for_file(context: &FileContext) -> Self {
        let primary = context.task.primary_metric(context.direction());
        let metrics = match context.task.kind() {
            TaskKind::Translation => match primary {
                MetricName::Bleu => vec![MetricName::Bleu, MetricName::ChrfPlusPlus],
                _ => vec![MetricName::ChrfPlusPlus, MetricName::Bleu],
            },
            _ => vec![primary],
        };
        Self { primary, metrics }
    }
}

/// Score records of one file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileScore {
    pub context: FileContext,
    pub primary: MetricName,
    pub records: Vec<ScoreRecord>,
}

impl FileScore {
    pub fn primary_record(&self, score_type: ScoreType) -> Option<&ScoreRecord> {
        self.records
            .iter()
            .find(|r| r.is_metric(self.primary) && r.score_type == score_type)
    }

    pub fn primary_all(&self) -> Option<f64> {
        self.primary_record(ScoreType::All).and_then(|r| r.score)
    }

    pub fn primary_success(&self) -> Option<f64> {
        self.primary_record(ScoreType::Success).and_then(|r| r.score)
    }

    pub fn success_rate(&self) -> f64 {
        self.primary_record(ScoreType::All)
            .map(|r| r.success_rate)
            .unwrap_or(0.0)
    }
}

/// A (model, task, language, file) that could not be scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringGap {
    pub model: String,
    pub task: String,
    pub language: String,
    pub file: String,
    pub reason: String,
}

impl ScoringGap {
    pub fn new(context: &FileContext, reason: impl Into<String>) -> Self {
        Self {
            model: context.model.clone(),
            task: context.task.dir_name().to_string(),
            language: context.language.english_name().to_string(),
            file: context.file.clone(),
            reason: reason.into(),
        }
    }
}

/// Scores one file of extracted answers.
///
/// Judge scores are required for judged tasks and ignored otherwise.
pub fn score_file(
    answers: &[ExtractedAnswer],
    context: &FileContext,
    judge: Option<&JudgeScores>,
) -> Result<FileScore, ScoringGap> {
    if answers.is_empty() {
        return Err(ScoringGap::new(context, "no records"));
    }

    let plan = MetricPlan::for_file(context);
    let mut records = Vec::new();

    for metric in &plan.metrics {
        let split = match metric {
            MetricName::Accuracy => accuracy_split(answers, context.task.kind()),
            MetricName::RougeL => rouge_split(answers, context.language),
            MetricName::Bleu => corpus_split(answers, |h, r| BleuCalculator::default().corpus_bleu(h, r)),
            MetricName::ChrfPlusPlus => {
                corpus_split(answers, |h, r| ChrfCalculator::chrf_plus_plus().corpus_chrf(h, r))
            }
            MetricName::LlmScore => {
                let Some(judge) = judge else {
                    return Err(ScoringGap::new(context, "judge scores missing"));
                };
                llm_split(answers, judge)
            }
        };
        push_split(&mut records, context, metric.as_str(), &split);
    }

    if context.task.kind() == TaskKind::Safety {
        let mut by_category: BTreeMap<&str, Vec<ExtractedAnswer>> = BTreeMap::new();
        for answer in answers {
            if let Some(category) = answer.category.as_deref() {
                by_category.entry(category).or_default().push(answer.clone());
            }
        }
        for (category, items) in by_category {
            let split = accuracy_split(&items, TaskKind::Safety);
            let name = format!("{}_{}", category, MetricName::Accuracy);
            push_split(&mut records, context, &name, &split);
        }
    }

    tracing::debug!(
        model = %context.model,
        task = %context.task,
        lang = %context.language,
        file = %context.file,
        records = records.len(),
        "scored file"
    );

    Ok(FileScore {
        context: context.clone(),
        primary: plan.primary,
        records,
    })
}

fn accuracy_split(answers: &[ExtractedAnswer], kind: TaskKind) -> ScoreSplit {
    let calc = AccuracyCalculator::for_task(kind);
    let scores: Vec<Option<f64>> = answers
        .iter()
        .map(|a| {
            a.extraction_success
                .then(|| if calc.is_correct(&a.answer, &a.gold) { 1.0 } else { 0.0 })
        })
        .collect();
    ScoreSplit::from_per_example(&scores)
}

fn rouge_split(answers: &[ExtractedAnswer], language: Language) -> ScoreSplit {
    let calc = RougeCalculator::rouge_l().with_language(language);
    let scores: Vec<Option<f64>> = answers
        .iter()
        .map(|a| {
            a.is_usable()
                .then(|| calc.calculate_rouge_l(&a.answer, &a.gold, None).2)
        })
        .collect();
    ScoreSplit::from_per_example(&scores)
}

fn corpus_split<F>(answers: &[ExtractedAnswer], score: F) -> ScoreSplit
where
    F: Fn(&[String], &[String]) -> f64,
{
    let (hyps, refs): (Vec<String>, Vec<String>) = answers
        .iter()
        .filter(|a| a.is_usable())
        .map(|a| (a.answer.clone(), a.gold.clone()))
        .unzip();
    let success_score = (!hyps.is_empty()).then(|| score(&hyps, &refs));
    ScoreSplit::from_corpus(success_score, answers.len(), hyps.len())
}

fn llm_split(answers: &[ExtractedAnswer], judge: &JudgeScores) -> ScoreSplit {
    let scores: Vec<Option<f64>> = answers.iter().map(|a| judge.get(&a.id).copied()).collect();
    ScoreSplit::from_per_example(&scores)
}

fn push_split(records: &mut Vec<ScoreRecord>, context: &FileContext, metric: &str, split: &ScoreSplit) {
    for (score_type, score) in [(ScoreType::All, split.all), (ScoreType::Success, split.success)] {
        records.push(ScoreRecord {
            model: context.model.clone(),
            task: context.task.dir_name().to_string(),
            language: context.language.english_name().to_string(),
            file: context.file.clone(),
            metric: metric.to_string(),
            score_type,
            score,
            sample_count: split.sample_count,
            success_count: split.success_count,
            success_rate: split.success_rate(),
        });
    }
}
