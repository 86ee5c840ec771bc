use std::collections::HashMap;
use std::hash::Hash;

use crate::tokenize::{chrf_chars, chrf_words};

/// Per-order hypothesis, reference and matching n-gram counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NgramStats {
    pub hyp: usize,
    pub reference: usize,
    pub matched: usize,
}

/// Corpus-level chrF++ (character n-grams plus word n-grams), 0–100 scale.
#[derive(Debug, Clone)]
pub struct ChrfCalculator {
    pub char_order: usize,
    pub word_order: usize,
    pub beta: f64,
}

impl ChrfCalculator {
    pub fn new(char_order: usize, word_order: usize, beta: f64) -> Self {
        Self {
            char_order,
            word_order,
            beta,
        }
    }

    /// Plain chrF without word n-grams.
    pub fn chrf() -> Self {
        Self::new(6, 0, 2.0)
    }

    pub fn chrf_plus_plus() -> Self {
        Self::new(6, 2, 2.0)
    }

    fn count<T: Clone + Eq + Hash>(items: &[T], n: usize) -> HashMap<Vec<T>, usize> {
        let mut counts = HashMap::new();
        if items.len() >= n {
            for window in items.windows(n) {
                *counts.entry(window.to_vec()).or_insert(0) += 1;
            }
        }
        counts
    }

    fn match_counts<T: Clone + Eq + Hash>(hyp: &[T], reference: &[T], n: usize) -> NgramStats {
        let hyp_counts = Self::count(hyp, n);
        let ref_counts = Self::count(reference, n);
        let matched = hyp_counts
            .iter()
            .map(|(gram, c)| (*c).min(ref_counts.get(gram).copied().unwrap_or(0)))
            .sum();
        NgramStats {
            hyp: hyp_counts.values().sum(),
            reference: ref_counts.values().sum(),
            matched,
        }
    }

    /// Statistics for every character order followed by every word order.
    pub fn sentence_stats(&self, hypothesis: &str, reference: &str) -> Vec<NgramStats> {
        let hyp_chars = chrf_chars(hypothesis);
        let ref_chars = chrf_chars(reference);
        let mut stats: Vec<NgramStats> = (1..=self.char_order)
            .map(|n| Self::match_counts(&hyp_chars, &ref_chars, n))
            .collect();

        if self.word_order > 0 {
            let hyp_words = chrf_words(hypothesis);
            let ref_words = chrf_words(reference);
            stats.extend((1..=self.word_order).map(|n| Self::match_counts(&hyp_words, &ref_words, n)));
        }
        stats
    }

    pub fn corpus_stats(&self, hypotheses: &[String], references: &[String]) -> Vec<NgramStats> {
        let mut totals = vec![NgramStats::default(); self.char_order + self.word_order];
        for (hyp, reference) in hypotheses.iter().zip(references.iter()) {
            for (acc, s) in totals.iter_mut().zip(self.sentence_stats(hyp, reference)) {
                acc.hyp += s.hyp;
                acc.reference += s.reference;
                acc.matched += s.matched;
            }
        }
        totals
    }

    /// F-beta of the precision and recall averaged over the orders that have
    /// both hypothesis and reference n-grams.
    pub fn score_from_stats(&self, stats: &[NgramStats]) -> f64 {
        const EPS: f64 = 1e-16;
        let factor = self.beta * self.beta;
        let mut avg_precision = 0.0;
        let mut avg_recall = 0.0;
        let mut effective_order = 0;

        for s in stats {
            avg_precision += if s.hyp > 0 { s.matched as f64 / s.hyp as f64 } else { EPS };
            avg_recall += if s.reference > 0 {
                s.matched as f64 / s.reference as f64
            } else {
                EPS
            };
            if s.hyp > 0 && s.reference > 0 {
                effective_order += 1;
            }
        }

        if effective_order == 0 {
            return 0.0;
        }
        avg_precision /= effective_order as f64;
        avg_recall /= effective_order as f64;

        let denom = factor * avg_precision + avg_recall;
        if avg_precision + avg_recall <= 0.0 || denom <= 0.0 {
            return 0.0;
        }
        100.0 * (1.0 + factor) * avg_precision * avg_recall / denom
    }

    pub fn corpus_chrf(&self, hypotheses: &[String], references: &[String]) -> f64 {
        self.score_from_stats(&self.corpus_stats(hypotheses, references))
    }
}

impl Default for ChrfCalculator {
    fn default() -> Self {
        Self::chrf_plus_plus()
    }
}
