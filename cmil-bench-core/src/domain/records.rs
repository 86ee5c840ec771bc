use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::ids::ExampleId;
use super::task::MetricName;

fn default_true() -> bool {
    true
}

/// One persisted generation for one example.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceResult {
    pub id: ExampleId,
    pub pred: String,
    pub gold: String,
    #[serde(default = "default_true")]
    pub succeeded: bool,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl InferenceResult {
    pub fn success(id: ExampleId, pred: impl Into<String>, gold: impl Into<String>) -> Self {
        Self {
            id,
            pred: pred.into(),
            gold: gold.into(),
            succeeded: true,
            attempts: 1,
            error: None,
            category: None,
        }
    }

    pub fn failure(id: ExampleId, gold: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id,
            pred: String::new(),
            gold: gold.into(),
            succeeded: false,
            attempts: 1,
            error: Some(error.into()),
            category: None,
        }
    }
}

/// An inference result with its normalized answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractedAnswer {
    pub id: ExampleId,
    pub gold: String,
    pub pred: String,
    pub answer: String,
    pub extraction_success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ExtractedAnswer {
    /// Prediction that counts towards success-only scores.
    pub fn is_usable(&self) -> bool {
        self.extraction_success && !self.answer.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ScoreType {
    /// Denominator is every example; unextracted answers score zero.
    All,
    /// Denominator is only the successfully extracted examples.
    Success,
}

impl fmt::Display for ScoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreType::All => f.write_str("all"),
            ScoreType::Success => f.write_str("success"),
        }
    }
}

/// One scored (model, task, language, file, metric, score type) cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreRecord {
    #[serde(rename = "Model")]
    pub model: String,
    #[serde(rename = "Task")]
    pub task: String,
    #[serde(rename = "Language")]
    pub language: String,
    #[serde(rename = "File")]
    pub file: String,
    /// Metric name; per-category safety scores carry a `{category}_` prefix.
    #[serde(rename = "Metric")]
    pub metric: String,
    #[serde(rename = "Score_Type")]
    pub score_type: ScoreType,
    /// `None` when the denominator is zero.
    #[serde(rename = "Score")]
    pub score: Option<f64>,
    #[serde(rename = "Sample_Count")]
    pub sample_count: usize,
    #[serde(rename = "Success_Count")]
    pub success_count: usize,
    #[serde(rename = "Success_Rate")]
    pub success_rate: f64,
}

impl ScoreRecord {
    pub fn is_metric(&self, metric: MetricName) -> bool {
        self.metric == metric.as_str()
    }
}

/// Judge verdict for one generated answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeScore {
    pub id: ExampleId,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub reference_answer: String,
    #[serde(default)]
    pub model_answer: String,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub summary: String,
    pub final_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

impl JudgeScore {
    pub fn is_success(&self) -> bool {
        matches!(self.final_score, Some(s) if (1.0..=5.0).contains(&s))
    }
}
