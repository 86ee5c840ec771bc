use cmil_bench_core::{AnswerFormat, TaskKind};
use serde::{Deserialize, Serialize};

/// Tolerance for numeric answers.
pub const NUMERIC_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonMode {
    ExactMatch,
    CaseInsensitive,
    /// Compare the sets of option letters, ignoring order and separators.
    ChoiceLetters,
    /// Compare as numbers within [`NUMERIC_TOLERANCE`].
    Numeric,
}

impl ComparisonMode {
    pub fn for_task(kind: TaskKind) -> Self {
        match kind.answer_format() {
            AnswerFormat::Choice => ComparisonMode::ChoiceLetters,
            AnswerFormat::Numeric => ComparisonMode::Numeric,
            AnswerFormat::Category => ComparisonMode::CaseInsensitive,
            AnswerFormat::FreeText | AnswerFormat::Translation => ComparisonMode::ExactMatch,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccuracyCalculator {
    pub mode: ComparisonMode,
}

/// Upper-case letters of an answer, deduplicated and sorted: `"b, a"` → `"AB"`.
pub fn normalize_choice(answer: &str) -> String {
    let mut letters: Vec<char> = answer
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    letters.sort_unstable();
    letters.dedup();
    letters.into_iter().collect()
}

impl AccuracyCalculator {
    pub fn new(mode: ComparisonMode) -> Self {
        Self { mode }
    }

    pub fn for_task(kind: TaskKind) -> Self {
        Self::new(ComparisonMode::for_task(kind))
    }

    /// Exact string match (case-sensitive)
    fn exact_match(&self, predicted: &str, reference: &str) -> bool {
        predicted.trim() == reference.trim()
    }

    fn case_insensitive_match(&self, predicted: &str, reference: &str) -> bool {
        predicted.trim().to_lowercase() == reference.trim().to_lowercase()
    }

    fn choice_match(&self, predicted: &str, reference: &str) -> bool {
        let gold = normalize_choice(reference);
        !gold.is_empty() && normalize_choice(predicted) == gold
    }

    /// Float comparison, falling back to string equality for non-numbers.
    fn numeric_match(&self, predicted: &str, reference: &str) -> bool {
        match (predicted.trim().parse::<f64>(), reference.trim().parse::<f64>()) {
            (Ok(p), Ok(r)) => (p - r).abs() < NUMERIC_TOLERANCE,
            _ => self.exact_match(predicted, reference),
        }
    }

    pub fn is_correct(&self, predicted: &str, reference: &str) -> bool {
        match self.mode {
            ComparisonMode::ExactMatch => self.exact_match(predicted, reference),
            ComparisonMode::CaseInsensitive => self.case_insensitive_match(predicted, reference),
            ComparisonMode::ChoiceLetters => self.choice_match(predicted, reference),
            ComparisonMode::Numeric => self.numeric_match(predicted, reference),
        }
    }
}

impl Default for AccuracyCalculator {
    fn default() -> Self {
        Self::new(ComparisonMode::ExactMatch)
    }
}
