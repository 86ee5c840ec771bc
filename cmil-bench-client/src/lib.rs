//! CMiL-Bench HTTP client
//!
//! A small client for OpenAI-compatible servers, used by the harness for
//! three things: batched text completion against a locally served engine,
//! one-at-a-time chat completion against hosted models, and chat calls to
//! the judge model.
//!
//! # Features
//!
//! - **Batched completions**: one `/completions` request per batch, choices
//!   re-associated with their prompts by `index`
//! - **Automatic retries**: bounded exponential backoff with jitter for
//!   timeouts, connection failures and 5xx responses
//! - **Rate limiting**: 429 responses wait for `Retry-After`
//! - **Error taxonomy**: authentication and out-of-memory failures convert
//!   into fatal harness errors, everything else into transient ones
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use cmil_bench_client::{ChatRequest, ClientConfig, HttpClient};
//! use cmil_bench_core::ChatMessage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("https://api.openai.com/v1")
//!         .with_api_key(Some("your-api-key"))
//!         .with_max_retries(5);
//!     let client = HttpClient::new(config)?;
//!
//!     let request = ChatRequest::new("gpt-4o", vec![ChatMessage::user("你好")]);
//!     let reply = client.chat(&request).await?;
//!     println!("{} (after {} attempts)", reply.value.content()?, reply.attempts);
//!     Ok(())
//! }
//! ```
//!
//! # Error Handling
//!
//! ```rust,no_run
//! use cmil_bench_client::{ClientError, HttpClient};
//!
//! async fn models(client: &HttpClient) {
//!     match client.list_models().await {
//!         Ok(list) => println!("{} models", list.value.data.len()),
//!         Err(e) if e.error.is_auth_failure() => eprintln!("bad credentials"),
//!         Err(e) => eprintln!("gave up after {} attempts: {}", e.attempts, e.error),
//!     }
//! }
//! ```

mod client;
mod config;
mod error;
pub mod retry;
mod types;

pub use client::{HttpClient, RetryResult};
pub use config::{AuthConfig, ClientConfig};
pub use error::{ClientError, ClientResult, DEFAULT_RETRY_AFTER_SECS};
pub use retry::{Attempted, RetryConfig, RetryError};
pub use types::{
    ChatChoice, ChatRequest, ChatResponse, CompletionChoice, CompletionRequest, CompletionResponse,
    ModelInfo, ModelList, ResponseMessage,
};
