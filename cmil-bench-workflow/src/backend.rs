pub mod local;
pub mod remote;

pub use local::*;
pub use remote::*;

use async_trait::async_trait;
use cmil_bench_core::{Prompt, Result};
use serde::{Deserialize, Serialize};

/// How a backend consumes prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Plain-text batches against a locally served engine.
    LocalGenerate,
    /// One single-turn chat request per example.
    RemoteChat,
}

/// Outcome of generating for one prompt.
///
/// Recoverable failures are carried here rather than returned as errors, so a
/// failed example is still persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    pub succeeded: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

impl Generation {
    pub fn success(text: impl Into<String>, attempts: u32) -> Self {
        Self {
            text: text.into(),
            succeeded: true,
            attempts,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            text: String::new(),
            succeeded: false,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// A text generation endpoint.
///
/// Only fatal conditions (model load, out of memory, authentication) are
/// returned as errors.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn capability(&self) -> Capability;

    async fn generate_one(&self, prompt: &Prompt, max_new_tokens: u32) -> Result<Generation>;

    /// Generations in exactly the order of `prompts`.
    async fn generate_batch(&self, prompts: &[Prompt], max_new_tokens: u32) -> Result<Vec<Generation>> {
        let mut generations = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            generations.push(self.generate_one(prompt, max_new_tokens).await?);
        }
        Ok(generations)
    }
}
