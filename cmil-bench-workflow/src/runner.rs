//! Checkpointed job runner: drives one TaskSpec × model job through
//! `PENDING → LOADING_CHECKPOINT → RUNNING ⇄ FLUSHING → DONE`.

use cmil_bench_core::{
    Checkpoint, CoreError, Example, ExampleId, InferenceResult, JobState, Result, RunConfig,
    TaskSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use crate::backend::GenerationBackend;
use crate::dataset::{
    append_jsonl, load_examples, load_exemplars, load_results, read_json, remove_if_exists,
    write_json_atomic, ErrorLog,
};
use crate::prompt::PromptFormatter;

/// Progress of the running job, broadcast after every batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub label: String,
    pub processed: usize,
    pub pending: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Summary of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobReport {
    pub label: String,
    pub output_file: std::path::PathBuf,
    pub state: JobState,
    /// Examples after the `max_test_example_num` cap.
    pub total: usize,
    /// Examples already completed by an earlier run.
    pub skipped: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub flushes: usize,
    pub cancelled: bool,
    pub elapsed_secs: f64,
}

/// A job that ended with an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobFailure {
    pub label: String,
    pub error: String,
    pub fatal: bool,
}

/// Outcome of a sequential run over many specs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub reports: Vec<JobReport>,
    pub failures: Vec<JobFailure>,
    /// Why the run stopped before the last spec, if it did.
    pub stopped: Option<String>,
}

impl RunSummary {
    pub fn has_fatal(&self) -> bool {
        self.failures.iter().any(|f| f.fatal)
    }
}

/// Mutable state of one job between flushes.
struct JobContext {
    state: JobState,
    checkpoint: Checkpoint,
    buffer: Vec<InferenceResult>,
    failures: Vec<(ExampleId, String)>,
    batches_since_flush: usize,
    last_flush: Instant,
    last_index: usize,
    flushes: usize,
    errors: ErrorLog,
}

pub struct JobRunner {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    config: RunConfig,
    cancel: CancellationToken,
    progress_tx: Option<broadcast::Sender<JobProgress>>,
}

impl JobRunner {
    pub fn new(backend: Arc<dyn GenerationBackend>, model: impl Into<String>, config: RunConfig) -> Self {
        Self {
            backend,
            model: model.into(),
            config,
            cancel: CancellationToken::new(),
            progress_tx: None,
        }
    }

    /// Shares a cancellation token, e.g. one cancelled on Ctrl-C.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Enable progress tracking
    pub fn enable_progress_tracking(&mut self) -> broadcast::Receiver<JobProgress> {
        let (tx, rx) = broadcast::channel(100);
        self.progress_tx = Some(tx);
        rx
    }

    fn report_progress(&self, progress: JobProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress);
        }
    }

    /// Runs specs one after another in the given order.
    ///
    /// Configuration and backend-fatal errors end the current job only;
    /// an unavailable backend, rejected credentials or cancellation end the
    /// run.
    pub async fn run_all(&self, specs: &[TaskSpec]) -> RunSummary {
        let mut summary = RunSummary::default();
        for spec in specs {
            if self.cancel.is_cancelled() {
                summary.stopped = Some("cancelled".to_string());
                break;
            }
            match self.run(spec).await {
                Ok(report) => {
                    let cancelled = report.cancelled;
                    summary.reports.push(report);
                    if cancelled {
                        summary.stopped = Some("cancelled".to_string());
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(task = %spec.label(), model = %self.model, error = %e, "job failed");
                    summary.failures.push(JobFailure {
                        label: spec.label(),
                        error: e.to_string(),
                        fatal: e.is_fatal(),
                    });
                    if e.stops_run() {
                        summary.stopped = Some(e.to_string());
                        break;
                    }
                }
            }
        }
        summary
    }

    /// Runs one job to completion, resuming from earlier output.
    pub async fn run(&self, spec: &TaskSpec) -> Result<JobReport> {
        let started = Instant::now();
        self.config.validate()?;
        spec.validate_spec()?;
        let label = spec.label();

        let mut state = JobState::Pending.transition(JobState::LoadingCheckpoint)?;
        let checkpoint = self.load_checkpoint(spec).await?;
        let completed: HashSet<ExampleId> = checkpoint.completed_ids.iter().cloned().collect();

        let mut examples = load_examples(spec).await?;
        let mut seen = HashSet::new();
        let before = examples.len();
        examples.retain(|ex| seen.insert(ex.id.clone()));
        if examples.len() < before {
            tracing::warn!(
                task = %label,
                duplicates = before - examples.len(),
                "duplicate example ids in input, keeping the first of each"
            );
        }
        if let Some(cap) = self.config.example_cap() {
            examples.truncate(cap);
        }
        let total = examples.len();
        let pending: Vec<(usize, Example)> = examples
            .into_iter()
            .enumerate()
            .filter(|(_, ex)| !completed.contains(&ex.id))
            .collect();
        let skipped = total - pending.len();

        let exemplars = load_exemplars(spec).await?;
        let formatter = PromptFormatter::new(spec, &exemplars);

        state = state.transition(JobState::Running)?;
        tracing::info!(
            task = %label,
            model = %self.model,
            total,
            skipped,
            pending = pending.len(),
            "starting job"
        );

        let mut ctx = JobContext {
            state,
            checkpoint,
            buffer: Vec::new(),
            failures: Vec::new(),
            batches_since_flush: 0,
            last_flush: Instant::now(),
            last_index: 0,
            flushes: 0,
            errors: ErrorLog::for_spec(spec),
        };
        let (mut processed, mut succeeded, mut failed) = (0usize, 0usize, 0usize);
        let mut consecutive_failed_batches = 0usize;
        let mut cancelled = false;

        for (batch_no, chunk) in pending.chunks(self.config.batch_size).enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(task = %label, "cancellation requested, stopping after flush");
                cancelled = true;
                break;
            }

            let prompts: Vec<_> = chunk.iter().map(|(_, ex)| formatter.format(ex)).collect();
            let generations = match self.backend.generate_batch(&prompts, spec.max_new_tokens).await {
                Ok(generations) => generations,
                Err(e) => {
                    tracing::error!(task = %label, batch = batch_no, error = %e, "backend failed fatally");
                    self.flush_after_failure(spec, &mut ctx).await;
                    return Err(e);
                }
            };
            if generations.len() != chunk.len() {
                self.flush_after_failure(spec, &mut ctx).await;
                return Err(CoreError::Internal(format!(
                    "backend returned {} generations for {} prompts",
                    generations.len(),
                    chunk.len()
                )));
            }

            let mut batch_succeeded = 0usize;
            for ((index, example), generation) in chunk.iter().zip(generations) {
                if self.config.print_results {
                    tracing::info!(id = %example.id, pred = %generation.text, gold = %example.gold, "result");
                }
                if generation.succeeded {
                    batch_succeeded += 1;
                } else {
                    ctx.failures.push((
                        example.id.clone(),
                        generation.error.clone().unwrap_or_else(|| "generation failed".to_string()),
                    ));
                }
                ctx.buffer.push(InferenceResult {
                    id: example.id.clone(),
                    pred: generation.text,
                    gold: example.gold.clone(),
                    succeeded: generation.succeeded,
                    attempts: generation.attempts,
                    error: generation.error,
                    category: example.category.clone(),
                });
                ctx.last_index = *index;
            }

            processed += chunk.len();
            succeeded += batch_succeeded;
            failed += chunk.len() - batch_succeeded;
            ctx.batches_since_flush += 1;
            tracing::debug!(task = %label, batch = batch_no, size = chunk.len(), ok = batch_succeeded, "batch done");
            self.report_progress(JobProgress {
                label: label.clone(),
                processed,
                pending: pending.len(),
                succeeded,
                failed,
            });

            if batch_succeeded == 0 {
                consecutive_failed_batches += 1;
                if consecutive_failed_batches >= self.config.unavailable_after {
                    self.flush_after_failure(spec, &mut ctx).await;
                    return Err(CoreError::BackendUnavailable {
                        consecutive_failed_batches,
                    });
                }
            } else {
                consecutive_failed_batches = 0;
            }

            if ctx.batches_since_flush >= self.config.save_frequency
                || ctx.last_flush.elapsed() >= self.config.save_interval()
            {
                self.flush(spec, &mut ctx, JobState::Running).await?;
            }
        }

        let final_state = if cancelled { JobState::Running } else { JobState::Done };
        self.flush(spec, &mut ctx, final_state).await?;

        let report = JobReport {
            label: label.clone(),
            output_file: spec.output_file.clone(),
            state: ctx.state,
            total,
            skipped,
            processed,
            succeeded,
            failed,
            flushes: ctx.flushes,
            cancelled,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        tracing::info!(
            task = %label,
            model = %self.model,
            processed,
            succeeded,
            failed,
            state = %report.state,
            "job finished"
        );
        Ok(report)
    }

    /// Loads the checkpoint and reconciles it with the output file.
    async fn load_checkpoint(&self, spec: &TaskSpec) -> Result<Checkpoint> {
        let fingerprint = spec.fingerprint();
        let existing: Vec<InferenceResult> = load_results(&spec.output_file).await?;

        let stored = match read_json::<Checkpoint>(&spec.checkpoint_path()).await {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(task = %spec.label(), error = %e, "unreadable checkpoint, rebuilding");
                None
            }
        };

        match stored {
            Some(cp) if cp.matches(&fingerprint, &self.model) && cp.records_flushed == existing.len() => {
                tracing::debug!(task = %spec.label(), records = cp.records_flushed, "resuming from checkpoint");
                return Ok(cp);
            }
            Some(cp) if !cp.matches(&fingerprint, &self.model) => {
                tracing::warn!(task = %spec.label(), "checkpoint belongs to a different spec or model, discarding");
            }
            Some(cp) => {
                tracing::warn!(
                    task = %spec.label(),
                    checkpoint = cp.records_flushed,
                    output = existing.len(),
                    "checkpoint out of step with output, rebuilding from output"
                );
            }
            None => {}
        }

        let mut rebuilt = Checkpoint::new(fingerprint, self.model.clone());
        let mut seen = HashSet::new();
        for record in &existing {
            if seen.insert(record.id.clone()) {
                rebuilt.completed_ids.push(record.id.clone());
            }
        }
        rebuilt.records_flushed = existing.len();
        Ok(rebuilt)
    }

    /// Flushes on the way out of a failed job; a flush error is logged so the
    /// caller can still return the error that ended the job.
    async fn flush_after_failure(&self, spec: &TaskSpec, ctx: &mut JobContext) {
        if let Err(e) = self.flush(spec, ctx, JobState::Failed).await {
            tracing::error!(task = %spec.label(), error = %e, "flush after failure failed");
        }
    }

    /// Appends the buffer, records failures and rewrites the checkpoint.
    ///
    /// Reaching `Done` deletes the checkpoint instead.
    async fn flush(&self, spec: &TaskSpec, ctx: &mut JobContext, next: JobState) -> Result<()> {
        ctx.state = ctx.state.transition(JobState::Flushing)?;

        append_jsonl(&spec.output_file, &ctx.buffer).await?;
        ctx.errors.record("推理失败", &ctx.failures).await?;

        let lines = ctx.checkpoint.records_flushed + ctx.buffer.len();
        let ids: Vec<ExampleId> = ctx.buffer.iter().map(|r| r.id.clone()).collect();
        ctx.checkpoint.record_flush(ids.iter(), ctx.last_index, next);
        // Counts output lines, which may include duplicates from older runs.
        ctx.checkpoint.records_flushed = lines;
        if next == JobState::Done {
            remove_if_exists(&spec.checkpoint_path()).await?;
        } else {
            write_json_atomic(&spec.checkpoint_path(), &ctx.checkpoint).await?;
        }

        tracing::debug!(
            task = %spec.label(),
            records = ctx.buffer.len(),
            failures = ctx.failures.len(),
            next = %next,
            "flushed"
        );
        ctx.buffer.clear();
        ctx.failures.clear();
        ctx.batches_since_flush = 0;
        ctx.last_flush = Instant::now();
        ctx.flushes += 1;
        ctx.state = ctx.state.transition(next)?;
        Ok(())
    }
}

/// Deletes a job's output and side files before a fresh run.
pub async fn clear_outputs(spec: &TaskSpec) -> Result<()> {
    for path in [
        spec.output_file.clone(),
        spec.checkpoint_path(),
        spec.error_log_path(),
        spec.error_ids_path(),
    ] {
        remove_if_exists(&path).await?;
    }
    Ok(())
}
