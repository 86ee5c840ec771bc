use async_trait::async_trait;
use cmil_bench_client::{ChatRequest, ClientConfig, HttpClient};
use cmil_bench_core::{Prompt, RemoteBackendConfig, Result};
use std::time::Duration;
use tokio::time::sleep;

use super::{Capability, Generation, GenerationBackend};

/// Hosted chat model, called one example at a time.
pub struct RemoteBackend {
    config: RemoteBackendConfig,
    client: HttpClient,
}

impl RemoteBackend {
    pub fn new(config: RemoteBackendConfig) -> Result<Self> {
        let client_config = ClientConfig::new(config.base_url.clone())
            .with_api_key(config.api_key.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_max_retries(config.max_retries);
        let client = HttpClient::new(client_config)?;
        Ok(Self { config, client })
    }

    /// Uses a prepared client, e.g. one with a custom retry schedule.
    pub fn with_client(config: RemoteBackendConfig, client: HttpClient) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &RemoteBackendConfig {
        &self.config
    }
}

#[async_trait]
impl GenerationBackend for RemoteBackend {
    fn capability(&self) -> Capability {
        Capability::RemoteChat
    }

    async fn generate_one(&self, prompt: &Prompt, max_new_tokens: u32) -> Result<Generation> {
        let request = ChatRequest::new(self.config.model.clone(), prompt.to_messages())
            .with_max_tokens(max_new_tokens);

        let outcome = self.client.chat(&request).await;
        sleep(self.config.inter_call_delay()).await;

        match outcome {
            Ok(reply) => match reply.value.content() {
                Ok(text) => Ok(Generation::success(text.trim(), reply.attempts)),
                Err(e) => Ok(Generation::failure(e.to_string(), reply.attempts)),
            },
            Err(e) if e.error.is_auth_failure() => Err(e.into()),
            Err(e) => {
                tracing::warn!(
                    model = %self.config.model,
                    attempts = e.attempts,
                    error = %e.error,
                    "chat request failed"
                );
                Ok(Generation::failure(e.error.to_string(), e.attempts))
            }
        }
    }
}
