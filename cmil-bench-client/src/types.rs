//! Request and response bodies of the OpenAI-compatible API.

use crate::error::{ClientError, ClientResult};
use cmil_bench_core::ChatMessage;
use serde::{Deserialize, Serialize};

/// `POST /chat/completions` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.0,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: usize,
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatResponse {
    /// Content of the first choice.
    pub fn content(&self) -> ClientResult<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| ClientError::InvalidResponse("chat response has no content".to_string()))
    }
}

/// `POST /completions` request carrying a whole batch of prompts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: Vec<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: Vec<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            prompt,
            max_tokens,
            temperature: 0.0,
            stop: Vec::new(),
        }
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletionChoice {
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    /// Choice texts ordered by `index`, one per prompt.
    ///
    /// Servers may return choices in completion order; every index in
    /// `0..expected` must be present exactly once.
    pub fn into_ordered_texts(self, expected: usize) -> ClientResult<Vec<String>> {
        let mut slots: Vec<Option<String>> = vec![None; expected];
        for choice in self.choices {
            match slots.get_mut(choice.index) {
                Some(slot) if slot.is_none() => *slot = Some(choice.text),
                Some(_) => {
                    return Err(ClientError::InvalidResponse(format!(
                        "duplicate completion index {}",
                        choice.index
                    )))
                }
                None => {
                    return Err(ClientError::InvalidResponse(format!(
                        "completion index {} out of range for {} prompts",
                        choice.index, expected
                    )))
                }
            }
        }
        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| ClientError::InvalidResponse(format!("missing completion index {i}")))
            })
            .collect()
    }
}

/// `GET /models` response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelList {
    pub data: Vec<ModelInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub owned_by: Option<String>,
}

impl ModelList {
    pub fn contains(&self, model: &str) -> bool {
        self.data.iter().any(|m| m.id == model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn choice(index: usize, text: &str) -> CompletionChoice {
        CompletionChoice {
            index,
            text: text.to_string(),
            finish_reason: None,
        }
    }

    #[test]
    fn test_completions_reordered_by_index() {
        let response = CompletionResponse {
            id: None,
            choices: vec![choice(2, "c"), choice(0, "a"), choice(1, "b")],
        };
        assert_eq!(response.into_ordered_texts(3).unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_index_is_invalid() {
        let response = CompletionResponse {
            id: None,
            choices: vec![choice(0, "a")],
        };
        assert!(matches!(
            response.into_ordered_texts(2),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_chat_request_serializes_messages() {
        let request = ChatRequest::new("m", vec![ChatMessage::user("hi")]).with_max_tokens(16);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 16);
        assert_eq!(json["temperature"], 0.0);
    }
}
