use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CoreError, Result};

use super::ids::ExampleId;

/// Lifecycle of one TaskSpec × model job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    LoadingCheckpoint,
    Running,
    Flushing,
    Done,
    Failed,
}

impl JobState {
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, LoadingCheckpoint)
                | (Pending, Failed)
                | (LoadingCheckpoint, Running)
                | (LoadingCheckpoint, Failed)
                | (Running, Flushing)
                | (Running, Failed)
                | (Flushing, Running)
                | (Flushing, Done)
                | (Flushing, Failed)
        )
    }

    /// Validated transition.
    pub fn transition(self, next: JobState) -> Result<JobState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidState(format!(
                "cannot transition job from {} to {}",
                self, next
            )))
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "PENDING",
            JobState::LoadingCheckpoint => "LOADING_CHECKPOINT",
            JobState::Running => "RUNNING",
            JobState::Flushing => "FLUSHING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Compact resume index of a job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    pub spec_fingerprint: String,
    pub model: String,
    pub completed_ids: Vec<ExampleId>,
    pub records_flushed: usize,
    pub last_processed_index: usize,
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(spec_fingerprint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            spec_fingerprint: spec_fingerprint.into(),
            model: model.into(),
            completed_ids: Vec::new(),
            records_flushed: 0,
            last_processed_index: 0,
            state: JobState::Pending,
            updated_at: Utc::now(),
        }
    }

    /// Checkpoint belongs to this task spec and model.
    pub fn matches(&self, fingerprint: &str, model: &str) -> bool {
        self.spec_fingerprint == fingerprint && self.model == model
    }

    pub fn record_flush<'a>(
        &mut self,
        ids: impl IntoIterator<Item = &'a ExampleId>,
        last_processed_index: usize,
        state: JobState,
    ) {
        for id in ids {
            self.completed_ids.push(id.clone());
        }
        self.records_flushed = self.completed_ids.len();
        self.last_processed_index = last_processed_index;
        self.state = state;
        self.updated_at = Utc::now();
    }
}
