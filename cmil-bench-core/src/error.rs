use std::fmt;

use thiserror::Error;

/// Reason a backend cannot continue serving the current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    ModelLoad,
    OutOfMemory,
    Authentication,
}

impl fmt::Display for FatalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalKind::ModelLoad => write!(f, "model load failure"),
            FatalKind::OutOfMemory => write!(f, "out of memory"),
            FatalKind::Authentication => write!(f, "authentication failure"),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Backend fatal error ({kind}): {message}")]
    BackendFatal { kind: FatalKind, message: String },

    #[error("Backend transient error: {0}")]
    BackendTransient(String),

    #[error("Backend unavailable: {consecutive_failed_batches} consecutive batches failed")]
    BackendUnavailable { consecutive_failed_batches: usize },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn fatal(kind: FatalKind, message: impl Into<String>) -> Self {
        CoreError::BackendFatal {
            kind,
            message: message.into(),
        }
    }

    /// True when the current job cannot make further progress.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::Config(_)
                | CoreError::BackendFatal { .. }
                | CoreError::BackendUnavailable { .. }
        )
    }

    /// True when no later job of the same run can succeed either.
    pub fn stops_run(&self) -> bool {
        matches!(
            self,
            CoreError::BackendUnavailable { .. }
                | CoreError::BackendFatal {
                    kind: FatalKind::Authentication,
                    ..
                }
        )
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CoreError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoreError::Config(err.to_string())
    }
}
