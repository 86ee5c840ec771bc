use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Bo,
    Mn,
    Ug,
    Zh,
    En,
}

impl Language {
    /// Languages the benchmark evaluates, in default catalog order.
    pub const EVALUATED: [Language; 3] = [Language::Bo, Language::Mn, Language::Ug];

    pub fn code(&self) -> &'static str {
        match self {
            Language::Bo => "bo",
            Language::Mn => "mn",
            Language::Ug => "ug",
            Language::Zh => "zh",
            Language::En => "en",
        }
    }

    pub fn english_name(&self) -> &'static str {
        match self {
            Language::Bo => "Tibetan",
            Language::Mn => "Mongolian",
            Language::Ug => "Uyghur",
            Language::Zh => "Chinese",
            Language::En => "English",
        }
    }

    pub fn chinese_name(&self) -> &'static str {
        match self {
            Language::Bo => "藏语",
            Language::Mn => "蒙古语",
            Language::Ug => "维吾尔语",
            Language::Zh => "汉语",
            Language::En => "英语",
        }
    }

    /// Display name in the language of the prompt template.
    pub fn name_in(&self, prompt_lang: PromptLang) -> &'static str {
        match prompt_lang {
            PromptLang::Zh => self.chinese_name(),
            PromptLang::En => self.english_name(),
        }
    }

    pub fn is_evaluated(&self) -> bool {
        Self::EVALUATED.contains(self)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bo" => Ok(Language::Bo),
            "mn" => Ok(Language::Mn),
            "ug" => Ok(Language::Ug),
            "zh" => Ok(Language::Zh),
            "en" => Ok(Language::En),
            other => Err(CoreError::Config(format!("unknown language code: {}", other))),
        }
    }
}

/// Language of the instruction template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptLang {
    #[default]
    Zh,
    En,
}

impl PromptLang {
    pub fn code(&self) -> &'static str {
        match self {
            PromptLang::Zh => "zh",
            PromptLang::En => "en",
        }
    }
}

impl fmt::Display for PromptLang {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PromptLang {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zh" => Ok(PromptLang::Zh),
            "en" => Ok(PromptLang::En),
            other => Err(CoreError::Config(format!("unknown prompt language: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_follow_prompt_language() {
        assert_eq!(Language::Mn.name_in(PromptLang::En), "Mongolian");
        assert_eq!(Language::Mn.name_in(PromptLang::Zh), "蒙古语");
    }

    #[test]
    fn test_parse_codes() {
        assert_eq!("UG".parse::<Language>().unwrap(), Language::Ug);
        assert!("kk".parse::<Language>().is_err());
        assert_eq!("en".parse::<PromptLang>().unwrap(), PromptLang::En);
    }
}
