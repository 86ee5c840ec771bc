use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

use super::ids::ExampleId;
use super::language::{Language, PromptLang};
use super::spec::TaskSpec;
use super::task::TaskKind;

/// Text classification label set as `(zh, en)` pairs, in prompt order.
pub const CLASSIFICATION_LABELS: [(&str, &str); 7] = [
    ("体育", "Sports"),
    ("健康", "Health"),
    ("地理", "Geography"),
    ("娱乐", "Entertainment"),
    ("政治", "Politics"),
    ("旅游", "Travel"),
    ("科技", "Technology"),
];

/// Entailment labels as stored in the datasets, with their Chinese rendering.
pub const ENTAILMENT_LABELS: [(&str, &str); 3] = [
    ("contradiction", "矛盾"),
    ("entailment", "蕴含"),
    ("neutral", "中立"),
];

/// A dataset item with its normalized id and gold answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Example {
    pub id: ExampleId,
    pub gold: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    pub fields: Map<String, Value>,
}

impl Example {
    /// Builds an example from one raw dataset record for the given spec.
    pub fn from_record(record: Value, spec: &TaskSpec) -> Result<Self> {
        let Value::Object(raw) = record else {
            return Err(CoreError::Validation("dataset record is not a JSON object".to_string()));
        };
        let kind = spec.kind();
        let fields: Map<String, Value> = raw
            .into_iter()
            .map(|(k, v)| {
                let v = match (kind, v) {
                    (TaskKind::Entailment, Value::String(s)) => Value::String(s.trim().to_string()),
                    (_, v) => v,
                };
                (k.trim().to_string(), v)
            })
            .collect();

        let id_value = match kind {
            TaskKind::ReadingComprehension => fields.get("query_id").or_else(|| fields.get("id")),
            _ => fields.get("id"),
        };
        let id = id_value
            .and_then(ExampleId::from_value)
            .ok_or_else(|| CoreError::Validation("dataset record has no usable id".to_string()))?;

        let gold = derive_gold(kind, &fields, spec)
            .ok_or_else(|| CoreError::Validation(format!("record {} has no gold answer", id)))?;

        let metadata = fields.get("metadata").and_then(Value::as_object);
        let category = fields
            .get("category")
            .or_else(|| metadata.and_then(|m| m.get("category")))
            .and_then(value_to_text);
        let subcategory = metadata
            .and_then(|m| m.get("subcategory"))
            .and_then(value_to_text);

        Ok(Self {
            id,
            gold,
            category,
            subcategory,
            fields,
        })
    }

    /// String view of a field; numbers are rendered, other types ignored.
    pub fn text(&self, key: &str) -> Option<String> {
        self.fields.get(key).and_then(value_to_text)
    }

    pub fn text_or_empty(&self, key: &str) -> String {
        self.text(key).unwrap_or_default()
    }

    /// Candidate options from `option` or `options`.
    pub fn options(&self) -> Vec<String> {
        self.fields
            .get("option")
            .or_else(|| self.fields.get("options"))
            .and_then(Value::as_array)
            .map(|opts| opts.iter().filter_map(value_to_text).collect())
            .unwrap_or_default()
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.fields.get("metadata").and_then(Value::as_object)
    }

    /// Free-form language name from `metadata.language`, overriding the
    /// evaluation language in instructions.
    pub fn metadata_language(&self) -> Option<String> {
        self.metadata()
            .and_then(|m| m.get("language"))
            .and_then(value_to_text)
            .filter(|s| !s.is_empty())
    }

    pub fn metadata_type(&self) -> Option<String> {
        self.metadata().and_then(|m| m.get("type")).and_then(value_to_text)
    }

    /// `task.domain` / `task.sub_domain` annotation of professional questions.
    pub fn domain(&self) -> (Option<String>, Option<String>) {
        let task = self.fields.get("task").and_then(Value::as_object);
        let get = |key: &str| task.and_then(|t| t.get(key)).and_then(value_to_text);
        (get("domain"), get("sub_domain"))
    }
}

fn derive_gold(kind: TaskKind, fields: &Map<String, Value>, spec: &TaskSpec) -> Option<String> {
    let answer = fields.get("answer").and_then(value_to_text);
    match kind {
        TaskKind::Translation => spec
            .tgt_lang
            .and_then(|tgt| fields.get(tgt.code()))
            .and_then(value_to_text),
        TaskKind::TextClassification => {
            let label = fields.get("label").and_then(value_to_text)?;
            match spec.prompt_lang {
                PromptLang::En => Some(
                    CLASSIFICATION_LABELS
                        .iter()
                        .find(|(zh, _)| *zh == label)
                        .map(|(_, en)| en.to_string())
                        .unwrap_or(label),
                ),
                PromptLang::Zh => Some(label),
            }
        }
        TaskKind::CorefResolution | TaskKind::Entailment => {
            if answer.is_some() {
                return answer;
            }
            let label = match fields.get("label")? {
                Value::Bool(b) => b.to_string(),
                other => value_to_text(other)?,
            };
            let options: Vec<String> = fields
                .get("option")
                .and_then(Value::as_array)
                .map(|opts| opts.iter().filter_map(value_to_text).collect())
                .unwrap_or_default();
            match options.iter().position(|o| o.eq_ignore_ascii_case(&label)) {
                Some(idx) => Some(option_letter(idx).to_string()),
                None => Some(label),
            }
        }
        _ => answer,
    }
}

/// `0 → 'A'`, `1 → 'B'`, …
pub fn option_letter(index: usize) -> char {
    char::from(b'A' + (index % 26) as u8)
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(value_to_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(""))
            }
        }
        _ => None,
    }
}

/// Localized language label used inside instructions.
///
/// `metadata.language` wins; a bare language code there is expanded to its
/// display name.
pub fn language_label(example: &Example, lang: Language, prompt_lang: PromptLang) -> String {
    match example.metadata_language() {
        Some(raw) => raw
            .parse::<Language>()
            .map(|l| l.name_in(prompt_lang).to_string())
            .unwrap_or(raw),
        None => lang.name_in(prompt_lang).to_string(),
    }
}
