use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tokenize::bleu_tokens;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMethod {
    None,
    /// Halve the pseudo-count for each successive zero-match order.
    Exp,
    Floor(f64),
}

/// Sufficient statistics of a corpus: matches and totals per order plus
/// hypothesis and reference lengths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BleuStats {
    pub correct: Vec<usize>,
    pub total: Vec<usize>,
    pub hyp_len: usize,
    pub ref_len: usize,
}

/// Corpus-level BLEU on a 0–100 scale.
#[derive(Debug, Clone)]
pub struct BleuCalculator {
    pub max_n: usize,
    pub smoothing: SmoothingMethod,
}

impl BleuCalculator {
    pub fn new(max_n: usize) -> Self {
        Self {
            max_n,
            smoothing: SmoothingMethod::Exp,
        }
    }

    pub fn with_smoothing(mut self, smoothing: SmoothingMethod) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Extract n-grams from a token sequence
    fn extract_ngrams(&self, tokens: &[String], n: usize) -> Vec<Vec<String>> {
        if tokens.len() < n {
            return vec![];
        }
        tokens.windows(n).map(|window| window.to_vec()).collect()
    }

    /// Count n-grams
    fn count_ngrams(&self, ngrams: &[Vec<String>]) -> HashMap<Vec<String>, usize> {
        let mut counts = HashMap::new();
        for ngram in ngrams {
            *counts.entry(ngram.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Accumulates clipped n-gram matches over aligned sentence pairs.
    pub fn corpus_stats(&self, hypotheses: &[String], references: &[String]) -> BleuStats {
        let mut stats = BleuStats {
            correct: vec![0; self.max_n],
            total: vec![0; self.max_n],
            hyp_len: 0,
            ref_len: 0,
        };

        for (hyp, reference) in hypotheses.iter().zip(references.iter()) {
            let hyp_tokens = bleu_tokens(hyp);
            let ref_tokens = bleu_tokens(reference);
            stats.hyp_len += hyp_tokens.len();
            stats.ref_len += ref_tokens.len();

            for n in 1..=self.max_n {
                let hyp_counts = self.count_ngrams(&self.extract_ngrams(&hyp_tokens, n));
                let ref_counts = self.count_ngrams(&self.extract_ngrams(&ref_tokens, n));
                for (ngram, count) in &hyp_counts {
                    let ref_count = ref_counts.get(ngram).copied().unwrap_or(0);
                    stats.correct[n - 1] += (*count).min(ref_count);
                    stats.total[n - 1] += count;
                }
            }
        }
        stats
    }

    /// Calculate brevity penalty
    fn brevity_penalty(&self, hyp_len: usize, ref_len: usize) -> f64 {
        if hyp_len == 0 {
            0.0
        } else if hyp_len >= ref_len {
            1.0
        } else {
            (1.0 - ref_len as f64 / hyp_len as f64).exp()
        }
    }

    /// Score from accumulated statistics, with per-order precisions.
    pub fn score_from_stats(&self, stats: &BleuStats) -> (f64, Vec<f64>) {
        let mut precisions = vec![0.0; self.max_n];
        if stats.hyp_len == 0 {
            return (0.0, precisions);
        }

        let mut smooth = 1.0;
        for n in 0..self.max_n {
            if stats.total[n] == 0 {
                break;
            }
            precisions[n] = if stats.correct[n] > 0 {
                100.0 * stats.correct[n] as f64 / stats.total[n] as f64
            } else {
                match self.smoothing {
                    SmoothingMethod::None => 0.0,
                    SmoothingMethod::Exp => {
                        smooth *= 2.0;
                        100.0 / (smooth * stats.total[n] as f64)
                    }
                    SmoothingMethod::Floor(floor) => 100.0 * floor / stats.total[n] as f64,
                }
            };
        }

        if precisions.iter().any(|p| *p <= 0.0) {
            return (0.0, precisions);
        }

        let log_mean = precisions.iter().map(|p| (p / 100.0).ln()).sum::<f64>() / self.max_n as f64;
        let bp = self.brevity_penalty(stats.hyp_len, stats.ref_len);
        (100.0 * bp * log_mean.exp(), precisions)
    }

    pub fn corpus_bleu(&self, hypotheses: &[String], references: &[String]) -> f64 {
        let stats = self.corpus_stats(hypotheses, references);
        self.score_from_stats(&stats).0
    }
}

impl Default for BleuCalculator {
    fn default() -> Self {
        Self::new(4)
    }
}
