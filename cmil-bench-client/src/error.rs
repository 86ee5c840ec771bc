//! Client error types
//!
//! HTTP-level failures, their retryability, and how they map onto the
//! harness error taxonomy.

use crate::retry::{RetryError, Retryable};
use cmil_bench_core::{CoreError, FatalKind};
use std::time::Duration;
use thiserror::Error;

/// Fallback wait when a 429 response carries no usable `Retry-After`
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Errors that can occur when talking to a generation endpoint
#[derive(Error, Debug)]
pub enum ClientError {
    /// API returned an error response
    #[error("API error ({status}): {message}")]
    ApiError {
        status: u16,
        message: String,
        error_code: Option<String>,
    },

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Request timeout
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Authorization failed
    #[error("Authorization failed: {0}")]
    AuthorizationError(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// The serving engine ran out of memory
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// Server error
    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Invalid response shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Error body returned by OpenAI-compatible servers.
///
/// Both `{"error": {"message": ..}}` and the flat `{"message": ..}` shape
/// used by some local engines are accepted.
#[derive(Debug, serde::Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    error: Option<ApiErrorBody>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(untagged)]
enum ApiErrorBody {
    Detailed {
        message: String,
        #[serde(default)]
        code: Option<serde_json::Value>,
        #[serde(default, rename = "type")]
        kind: Option<String>,
    },
    Plain(String),
}

impl ApiErrorResponse {
    fn into_parts(self) -> (Option<String>, Option<String>) {
        let code_text = |code: Option<serde_json::Value>| {
            code.map(|c| match c {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
        };
        match self.error {
            Some(ApiErrorBody::Detailed { message, code, kind }) => {
                (Some(message), code_text(code).or(kind))
            }
            Some(ApiErrorBody::Plain(message)) => (Some(message), code_text(self.code)),
            None => (self.message, code_text(self.code)),
        }
    }
}

fn is_out_of_memory(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("out of memory") || lower.contains("outofmemory")
}

impl ClientError {
    /// Create an API error from a non-success response
    pub fn from_response(status: u16, body: &str, retry_after: Option<u64>) -> Self {
        let (message, error_code) = serde_json::from_str::<ApiErrorResponse>(body)
            .map(ApiErrorResponse::into_parts)
            .unwrap_or((None, None));
        let message = message.unwrap_or_else(|| body.trim().to_string());

        if is_out_of_memory(&message) {
            return ClientError::OutOfMemory(message);
        }

        match status {
            401 => ClientError::AuthenticationError(message),
            403 => ClientError::AuthorizationError(message),
            404 => ClientError::NotFound(message),
            429 => ClientError::RateLimited {
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER_SECS),
            },
            500..=599 => ClientError::ServerError { status, message },
            _ => ClientError::ApiError {
                status,
                message,
                error_code,
            },
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::NetworkError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClientError::Timeout(_)
            | ClientError::RateLimited { .. }
            | ClientError::ServerError { .. } => true,
            _ => false,
        }
    }

    /// Get the HTTP status code if available
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::ApiError { status, .. } => Some(*status),
            ClientError::ServerError { status, .. } => Some(*status),
            ClientError::RateLimited { .. } => Some(429),
            ClientError::AuthenticationError(_) => Some(401),
            ClientError::AuthorizationError(_) => Some(403),
            ClientError::NotFound(_) => Some(404),
            ClientError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Whether the failure concerns credentials rather than the request
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            ClientError::AuthenticationError(_) | ClientError::AuthorizationError(_)
        )
    }
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        ClientError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimited { retry_after } => Some(Duration::from_secs(*retry_after)),
            _ => None,
        }
    }
}

impl From<ClientError> for CoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::AuthenticationError(_) | ClientError::AuthorizationError(_) => {
                CoreError::fatal(FatalKind::Authentication, err.to_string())
            }
            ClientError::OutOfMemory(_) => CoreError::fatal(FatalKind::OutOfMemory, err.to_string()),
            ClientError::ConfigurationError(_) | ClientError::UrlError(_) => {
                CoreError::Config(err.to_string())
            }
            other => CoreError::BackendTransient(other.to_string()),
        }
    }
}

impl From<RetryError<ClientError>> for CoreError {
    fn from(err: RetryError<ClientError>) -> Self {
        CoreError::from(err.error)
    }
}
