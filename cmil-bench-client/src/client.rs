//! HTTP client implementation
//!
//! Retries transient failures with bounded exponential backoff, honours
//! `Retry-After` on 429 responses, and logs requests at debug level.

use crate::config::{AuthConfig, ClientConfig};
use crate::error::{ClientError, ClientResult};
use crate::retry::{retry, Attempted, ExponentialBackoff, RetryError};
use crate::types::{ChatRequest, ChatResponse, CompletionRequest, CompletionResponse, ModelList};
use reqwest::{header, Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a call that may have been retried
pub type RetryResult<T> = Result<Attempted<T>, RetryError<ClientError>>;

/// The HTTP client for OpenAI-compatible endpoints
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: Arc<ClientConfig>,
    policy: Arc<ExponentialBackoff>,
}

impl HttpClient {
    /// Create a new HTTP client with the given configuration
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        for (name, value) in &config.custom_headers {
            if let (Ok(name), Ok(value)) = (
                header::HeaderName::try_from(name.as_str()),
                header::HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, value);
            }
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(ClientError::NetworkError)?;

        let policy = ExponentialBackoff::new(config.retry.clone());

        Ok(Self {
            client,
            config: Arc::new(config),
            policy: Arc::new(policy),
        })
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build the full URL for an endpoint
    pub fn url(&self, path: &str) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        format!("{}/{}", base, path)
    }

    /// Single-turn chat completion
    pub async fn chat(&self, request: &ChatRequest) -> RetryResult<ChatResponse> {
        self.execute_with_retry(Method::POST, "chat/completions", Some(request))
            .await
    }

    /// Batched text completion; choices come back in prompt order
    pub async fn completions(&self, request: &CompletionRequest) -> RetryResult<Vec<String>> {
        let expected = request.prompt.len();
        let response: Attempted<CompletionResponse> = self
            .execute_with_retry(Method::POST, "completions", Some(request))
            .await?;
        let attempts = response.attempts;
        response
            .value
            .into_ordered_texts(expected)
            .map(|value| Attempted { value, attempts })
            .map_err(|error| RetryError { error, attempts })
    }

    /// Models served by the endpoint
    pub async fn list_models(&self) -> RetryResult<ModelList> {
        self.execute_with_retry::<ModelList, ()>(Method::GET, "models", None)
            .await
    }

    /// Execute a request with retry logic
    async fn execute_with_retry<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> RetryResult<T> {
        let url = self.url(path);
        let body_json = match body.map(serde_json::to_string).transpose() {
            Ok(json) => json,
            Err(e) => {
                return Err(RetryError {
                    error: ClientError::SerializationError(e),
                    attempts: 0,
                })
            }
        };

        retry(self.policy.as_ref(), || {
            self.execute_once(method.clone(), &url, body_json.as_deref())
        })
        .await
    }

    async fn execute_once<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
    ) -> ClientResult<T> {
        let mut request = self.add_auth(self.client.request(method.clone(), url));

        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        if self.config.enable_logging {
            debug!("Request: {} {}", method, url);
            if let Some(body) = body {
                debug!("Request body: {}", body);
            }
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(self.config.timeout.as_secs())
            } else {
                ClientError::NetworkError(e)
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await.map_err(ClientError::NetworkError)?;

        if self.config.enable_logging {
            debug!("Response ({}): {}", status, text);
        }

        if status.is_success() {
            serde_json::from_str(&text).map_err(ClientError::SerializationError)
        } else {
            Err(ClientError::from_response(status.as_u16(), &text, retry_after))
        }
    }

    /// Add authentication to a request
    fn add_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            AuthConfig::None => request,
            AuthConfig::ApiKey(key) => request.header("X-API-Key", key.as_str()),
            AuthConfig::BearerToken(token) => {
                request.header(header::AUTHORIZATION, format!("Bearer {}", token))
            }
        }
    }
}
