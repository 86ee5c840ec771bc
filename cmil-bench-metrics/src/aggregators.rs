use serde::{Deserialize, Serialize};

/// A metric evaluated over every example and over the successfully
/// extracted subset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSplit {
    /// Denominator N; failures contribute zero.
    pub all: Option<f64>,
    /// Denominator K; undefined when K = 0.
    pub success: Option<f64>,
    pub sample_count: usize,
    pub success_count: usize,
}

impl ScoreSplit {
    /// Per-example scores, `None` marking an example that failed extraction.
    pub fn from_per_example(scores: &[Option<f64>]) -> Self {
        let sample_count = scores.len();
        let successes: Vec<f64> = scores.iter().flatten().copied().collect();
        let success_count = successes.len();
        let sum: f64 = successes.iter().sum();

        Self {
            all: (sample_count > 0).then(|| sum / sample_count as f64),
            success: (success_count > 0).then(|| sum / success_count as f64),
            sample_count,
            success_count,
        }
    }

    /// A corpus-level score computed over the K successful examples, scaled
    /// by K / N for the all-examples view.
    pub fn from_corpus(success_score: Option<f64>, sample_count: usize, success_count: usize) -> Self {
        let success = if success_count > 0 { success_score } else { None };
        let all = if sample_count == 0 {
            None
        } else {
            Some(success.unwrap_or(0.0) * success_count as f64 / sample_count as f64)
        };
        Self {
            all,
            success,
            sample_count,
            success_count,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.success_count as f64 / self.sample_count as f64
        }
    }
}
