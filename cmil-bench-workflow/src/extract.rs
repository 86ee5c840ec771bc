//! Answer extraction: reduces a raw generation to the comparable answer form
//! of its task.

use cmil_bench_core::{AnswerFormat, TaskKind, CLASSIFICATION_LABELS};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Normalized answer and whether a pattern matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub answer: String,
    pub extracted: bool,
}

impl Extraction {
    fn hit(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            extracted: true,
        }
    }

    fn miss(raw: &str) -> Self {
        Self {
            answer: raw.trim().to_string(),
            extracted: false,
        }
    }
}

// Option letters are A–F in either case after a cue; cues capture a letter
// group such as `A`, `a、c` or `BD`.
static CHINESE_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:正确答案|答案应该是|答案|我选择|应该选|选择|选项|选)\s*(?:是|为|应为)?\s*[：:]?\s*([A-Fa-f](?:\s*[、,，和与及]?\s*[A-Fa-f])*)(?:[^A-Za-z]|$)",
    )
    .expect("valid regex")
});

static ENGLISH_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i:answer|option|choice)\s*(?i:is|would be|should be)?\s*[:：]?\s*\(?([A-F](?:\s*(?:,|/|&|(?i:and))\s*[A-F])*)\)?(?:[^A-Za-z]|$)",
    )
    .expect("valid regex")
});

// Lowercase letters after an English cue only count when punctuation or the
// end of the text follows, so "answer a question" is not option A.
static ENGLISH_CUE_LOWERCASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i:answer|option|choice)\s*(?i:is|would be|should be)?\s*[:：]?\s*\(?([a-f](?:\s*(?:,|/|&|and)\s*[a-f])*)\)?\s*(?:[.。,，;；!！)）]|$)",
    )
    .expect("valid regex")
});

static LETTER_IS_CORRECT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z])([A-Fa-f])\s*(?:选项)?\s*(?:是正确|正确|是对的)").expect("valid regex")
});

static SEPARATED_LETTERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9])([A-F](?:\s*[、,，和与及]\s*[A-F]|\s+[A-F])+)(?:[^A-Za-z0-9]|$)")
        .expect("valid regex")
});

static CONSECUTIVE_LETTERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9])([A-F]{2,6})(?:[^A-Za-z0-9]|$)").expect("valid regex")
});

static SINGLE_LETTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9])([A-F])(?:[^A-Za-z0-9]|$)").expect("valid regex")
});

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"));

static ECHOED_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?i:translation)|翻译|译文|(?i:tibetan|mongolian|uyghur|chinese|english)|藏语|蒙古语|维吾尔语|汉语|中文|英语)\s*[:：]\s*",
    )
    .expect("valid regex")
});

/// Deduplicated, sorted option letters of a matched group.
fn letter_set(group: &str) -> String {
    let mut letters: Vec<char> = group
        .chars()
        .map(|c| c.to_ascii_uppercase())
        .filter(|c| ('A'..='F').contains(c))
        .collect();
    letters.sort_unstable();
    letters.dedup();
    letters.into_iter().collect()
}

fn last_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
}

/// Option letters from a choice answer.
///
/// Cues (`答案是X`, `answer is X`, `X是正确`, …) win, the last one when several
/// appear; then explicit multi-letter answers; then the first standalone
/// letter.
pub fn extract_choice(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    let cue = [&*CHINESE_CUE, &*ENGLISH_CUE, &*ENGLISH_CUE_LOWERCASE, &*LETTER_IS_CORRECT]
        .iter()
        .filter_map(|re| {
            re.captures_iter(text)
                .last()
                .and_then(|c| c.get(1))
                .map(|m| (m.start(), m.as_str().to_string()))
        })
        .max_by_key(|(start, _)| *start)
        .map(|(_, group)| group);

    cue.or_else(|| last_capture(&SEPARATED_LETTERS, text))
        .or_else(|| first_capture(&CONSECUTIVE_LETTERS, text))
        .or_else(|| first_capture(&SINGLE_LETTER, text))
        .map(|group| letter_set(&group))
        .filter(|letters| !letters.is_empty())
}

/// First category label mentioned, in the form it was written.
///
/// English names match case-insensitively and come back in canonical case.
pub fn extract_category(raw: &str) -> Option<String> {
    let lower = raw.to_lowercase();
    CLASSIFICATION_LABELS
        .iter()
        .flat_map(|(zh, en)| {
            let zh_hit = raw.find(zh).map(|pos| (pos, zh.to_string()));
            let en_hit = lower.find(&en.to_lowercase()).map(|pos| (pos, en.to_string()));
            [zh_hit, en_hit]
        })
        .flatten()
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, label)| label)
}

/// Converts an extracted category to the label language of the gold answer.
pub fn align_category(answer: &str, gold: &str) -> String {
    let gold = gold.trim();
    let gold_is_zh = CLASSIFICATION_LABELS.iter().any(|(zh, _)| *zh == gold);
    let gold_is_en = CLASSIFICATION_LABELS.iter().any(|(_, en)| en.eq_ignore_ascii_case(gold));
    for (zh, en) in CLASSIFICATION_LABELS {
        if gold_is_zh && en.eq_ignore_ascii_case(answer) {
            return zh.to_string();
        }
        if gold_is_en && zh == answer {
            return en.to_string();
        }
    }
    answer.to_string()
}

/// First number in the text.
pub fn extract_number(raw: &str) -> Option<String> {
    NUMBER.find(raw).map(|m| m.as_str().to_string())
}

/// Translation with echoed instruction prefixes removed.
pub fn strip_translation_prefix(raw: &str) -> String {
    let mut text = raw.trim();
    while let Some(m) = ECHOED_PREFIX.find(text) {
        if m.end() == 0 {
            break;
        }
        text = text[m.end()..].trim_start();
    }
    text.trim().to_string()
}

/// Extracts the answer of a raw generation for a task kind.
///
/// On a miss the answer is the trimmed raw text.
pub fn extract(kind: TaskKind, raw: &str) -> Extraction {
    let found = match kind.answer_format() {
        AnswerFormat::Choice => extract_choice(raw),
        AnswerFormat::Category => extract_category(raw),
        AnswerFormat::Numeric => extract_number(raw),
        AnswerFormat::FreeText => Some(raw.trim().to_string()).filter(|s| !s.is_empty()),
        AnswerFormat::Translation => Some(strip_translation_prefix(raw)).filter(|s| !s.is_empty()),
    };
    match found {
        Some(answer) => Extraction::hit(answer),
        None => Extraction::miss(raw),
    }
}
