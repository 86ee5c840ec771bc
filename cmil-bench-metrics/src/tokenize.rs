//! Language-aware tokenization for the overlap metrics.
//!
//! Tibetan and Chinese have no reliable word delimiter in the benchmark data,
//! so they are compared character by character; Mongolian and Uyghur (Cyrillic
//! or Arabic script) are whitespace delimited.

use cmil_bench_core::Language;

/// CJK ideographs plus CJK/fullwidth punctuation.
pub fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x3000..=0x303F
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xF900..=0xFAFF
        | 0xFF00..=0xFFEF
        | 0x20000..=0x2A6DF)
}

fn is_punct(c: char) -> bool {
    c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace() && !is_mark(c))
}

/// Combining marks (vowel signs in Tibetan and Arabic script) stay attached.
fn is_mark(c: char) -> bool {
    matches!(c as u32,
        0x0300..=0x036F
        | 0x064B..=0x065F
        | 0x0670
        | 0x06D6..=0x06ED
        | 0x0F18..=0x0F19
        | 0x0F35 | 0x0F37 | 0x0F39
        | 0x0F71..=0x0F84
        | 0x0F86..=0x0F87
        | 0x0F8D..=0x0FBC
        | 0x180B..=0x180D
        | 0x18A9)
}

pub fn char_tokens(text: &str) -> Vec<String> {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_string())
        .collect()
}

pub fn whitespace_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}

/// Tokens used by ROUGE-L for the given evaluation language.
pub fn rouge_tokens(text: &str, language: Option<Language>) -> Vec<String> {
    match language {
        Some(Language::Mn) | Some(Language::Ug) | Some(Language::En) => whitespace_tokens(text),
        Some(Language::Bo) | Some(Language::Zh) | None => char_tokens(text),
    }
}

/// Tokens used by BLEU: every CJK character and punctuation mark stands
/// alone, other runs split on whitespace.
pub fn bleu_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_whitespace() {
            flush(&mut current, &mut tokens);
        } else if is_cjk(c) || is_punct(c) {
            flush(&mut current, &mut tokens);
            tokens.push(c.to_string());
        } else {
            current.push(c);
        }
    }
    flush(&mut current, &mut tokens);
    tokens
}

fn flush(current: &mut String, tokens: &mut Vec<String>) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

/// Whitespace words with one leading or trailing punctuation mark split off,
/// as chrF++ word n-grams expect.
pub fn chrf_words(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for token in text.split_whitespace() {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() > 1 && is_punct(chars[chars.len() - 1]) {
            words.push(chars[..chars.len() - 1].iter().collect());
            words.push(chars[chars.len() - 1].to_string());
        } else if chars.len() > 1 && is_punct(chars[0]) {
            words.push(chars[0].to_string());
            words.push(chars[1..].iter().collect());
        } else {
            words.push(token.to_string());
        }
    }
    words
}

/// Characters with whitespace removed, for chrF character n-grams.
pub fn chrf_chars(text: &str) -> Vec<char> {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
