use cmil_bench_core::Language;

use crate::tokenize::rouge_tokens;

/// ROUGE-L F1 over language-aware tokens.
#[derive(Debug, Clone, Default)]
pub struct RougeCalculator {
    pub language: Option<Language>,
}

impl RougeCalculator {
    pub fn rouge_l() -> Self {
        Self { language: None }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    /// Calculate longest common subsequence length
    fn lcs_length(&self, text1: &[String], text2: &[String]) -> usize {
        let m = text1.len();
        let n = text2.len();

        if m == 0 || n == 0 {
            return 0;
        }

        // Two rolling rows of the LCS table.
        let mut prev = vec![0usize; n + 1];
        let mut curr = vec![0usize; n + 1];
        for i in 1..=m {
            for j in 1..=n {
                curr[j] = if text1[i - 1] == text2[j - 1] {
                    prev[j - 1] + 1
                } else {
                    prev[j].max(curr[j - 1])
                };
            }
            std::mem::swap(&mut prev, &mut curr);
        }

        prev[n]
    }

    /// (precision, recall, f1) of one prediction against its reference.
    pub fn calculate_rouge_l(
        &self,
        predicted: &str,
        reference: &str,
        language: Option<Language>,
    ) -> (f64, f64, f64) {
        let language = language.or(self.language);
        let pred_tokens = rouge_tokens(predicted, language);
        let ref_tokens = rouge_tokens(reference, language);

        if ref_tokens.is_empty() || pred_tokens.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let lcs_len = self.lcs_length(&pred_tokens, &ref_tokens);
        let precision = lcs_len as f64 / pred_tokens.len() as f64;
        let recall = lcs_len as f64 / ref_tokens.len() as f64;

        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        (precision, recall, f1)
    }
}
