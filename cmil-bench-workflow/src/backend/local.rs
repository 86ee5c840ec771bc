//! Locally served batched engine behind an OpenAI-compatible completions
//! endpoint, optionally launched as a child process.

use async_trait::async_trait;
use cmil_bench_client::{ClientConfig, ClientError, CompletionRequest, HttpClient};
use cmil_bench_core::{CoreError, FatalKind, LocalBackendConfig, Prompt, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use super::{Capability, Generation, GenerationBackend};

const SPECIAL_TOKENS: [&str; 5] = ["<pad>", "<s>", "</s>", "<unk>", "<extra_id_0>"];

const READINESS_POLL: Duration = Duration::from_secs(2);

/// Strips special tokens and keeps the first non-empty line.
pub fn clean_generation(raw: &str) -> String {
    let mut text = raw.to_string();
    for token in SPECIAL_TOKENS {
        text = text.replace(token, "");
    }
    text.trim().lines().next().unwrap_or_default().trim().to_string()
}

pub struct LocalBackend {
    config: LocalBackendConfig,
    client: HttpClient,
    child: Mutex<Option<Child>>,
}

impl LocalBackend {
    pub fn new(config: LocalBackendConfig) -> Result<Self> {
        let client_config = ClientConfig::new(config.base_url.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
            .with_max_retries(2);
        let client = HttpClient::new(client_config)?;
        Ok(Self {
            config,
            client,
            child: Mutex::new(None),
        })
    }

    /// Builds the backend, launches the engine when a command is configured,
    /// and waits until the model is served.
    pub async fn start(config: LocalBackendConfig) -> Result<Self> {
        let backend = Self::new(config)?;
        if backend.config.launch_command.is_some() {
            backend.launch().await?;
        }
        backend.wait_ready().await?;
        Ok(backend)
    }

    pub fn config(&self) -> &LocalBackendConfig {
        &self.config
    }

    /// Engine command line with memory and parallelism settings appended.
    pub fn launch_args(&self) -> Option<Vec<String>> {
        let command = self.config.launch_command.as_deref()?;
        let mut args: Vec<String> = command.split_whitespace().map(str::to_string).collect();
        if args.is_empty() {
            return None;
        }
        args.extend([
            "--served-model-name".to_string(),
            self.config.model.clone(),
            "--gpu-memory-utilization".to_string(),
            self.config.gpu_memory_utilization.to_string(),
            "--tensor-parallel-size".to_string(),
            self.config.tensor_parallel_size.to_string(),
        ]);
        Some(args)
    }

    async fn launch(&self) -> Result<()> {
        let Some(args) = self.launch_args() else {
            return Err(CoreError::Config("launch command is empty".to_string()));
        };
        tracing::info!(model = %self.config.model, command = %args.join(" "), "launching local engine");
        let child = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CoreError::fatal(FatalKind::ModelLoad, format!("cannot start engine: {}", e)))?;
        *self.child.lock().await = Some(child);
        Ok(())
    }

    /// Polls the model list until the configured model is served.
    pub async fn wait_ready(&self) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(self.config.startup_timeout_secs);
        loop {
            if let Some(child) = self.child.lock().await.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(CoreError::fatal(
                        FatalKind::ModelLoad,
                        format!("engine exited during startup with {}", status),
                    ));
                }
            }

            match self.client.list_models().await {
                Ok(models) if models.value.contains(&self.config.model) => {
                    tracing::info!(model = %self.config.model, "local engine ready");
                    return Ok(());
                }
                Ok(models) => {
                    let served: Vec<&str> = models.value.data.iter().map(|m| m.id.as_str()).collect();
                    return Err(CoreError::fatal(
                        FatalKind::ModelLoad,
                        format!("model {} is not served (serving: {})", self.config.model, served.join(", ")),
                    ));
                }
                Err(e) if e.error.is_auth_failure() => return Err(e.into()),
                Err(e) => {
                    if Instant::now() >= deadline {
                        return Err(CoreError::fatal(
                            FatalKind::ModelLoad,
                            format!("engine not ready after {}s: {}", self.config.startup_timeout_secs, e),
                        ));
                    }
                    tracing::debug!(error = %e, "engine not ready yet");
                    sleep(READINESS_POLL).await;
                }
            }
        }
    }

    /// Stops a launched engine.
    pub async fn shutdown(&self) -> Result<()> {
        if let Some(mut child) = self.child.lock().await.take() {
            tracing::info!(model = %self.config.model, "stopping local engine");
            child.kill().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GenerationBackend for LocalBackend {
    fn capability(&self) -> Capability {
        Capability::LocalGenerate
    }

    async fn generate_one(&self, prompt: &Prompt, max_new_tokens: u32) -> Result<Generation> {
        let mut generations = self
            .generate_batch(std::slice::from_ref(prompt), max_new_tokens)
            .await?;
        generations
            .pop()
            .ok_or_else(|| CoreError::Internal("empty batch result".to_string()))
    }

    async fn generate_batch(&self, prompts: &[Prompt], max_new_tokens: u32) -> Result<Vec<Generation>> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }
        let texts = prompts.iter().map(|p| p.text.clone()).collect();
        let request = CompletionRequest::new(self.config.model.clone(), texts, max_new_tokens);

        match self.client.completions(&request).await {
            Ok(reply) => Ok(reply
                .value
                .iter()
                .map(|raw| Generation::success(clean_generation(raw), reply.attempts))
                .collect()),
            Err(e) => {
                if let ClientError::NotFound(message) = &e.error {
                    return Err(CoreError::fatal(
                        FatalKind::ModelLoad,
                        format!("model {} not found: {}", self.config.model, message),
                    ));
                }
                if matches!(e.error, ClientError::OutOfMemory(_)) || e.error.is_auth_failure() {
                    return Err(e.into());
                }
                tracing::warn!(
                    model = %self.config.model,
                    batch = prompts.len(),
                    attempts = e.attempts,
                    error = %e.error,
                    "batch generation failed"
                );
                let message = e.error.to_string();
                Ok(prompts
                    .iter()
                    .map(|_| Generation::failure(message.clone(), e.attempts))
                    .collect())
            }
        }
    }
}
