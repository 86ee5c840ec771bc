use async_trait::async_trait;
use cmil_bench_core::*;
use cmil_bench_workflow::*;
use mockall::mock;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ===== Helpers =====

fn math_spec(dir: &Path, n: usize) -> TaskSpec {
    let input = dir.join("data/Foundation_Tasks/Math_Reasoning/bo.json");
    std::fs::create_dir_all(input.parent().unwrap()).unwrap();
    let records: Vec<serde_json::Value> = (1..=n)
        .map(|i| serde_json::json!({"id": i, "question": format!("<<q-{}>>", i), "answer": i.to_string()}))
        .collect();
    std::fs::write(&input, serde_json::to_string(&records).unwrap()).unwrap();

    TaskSpec {
        task: BenchmarkTask::MathReasoning,
        eval_lang: Language::Bo,
        prompt_lang: PromptLang::Zh,
        input_file: input,
        output_file: dir.join("out/m/Math_Reasoning/bo/zh-prompt_test.jsonl"),
        exemplar_file: None,
        num_exemplar: 0,
        max_passage_len: None,
        src_lang: None,
        tgt_lang: None,
        max_new_tokens: 200,
    }
}

fn read_output(path: &Path) -> Vec<InferenceResult> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn config(batch_size: usize) -> RunConfig {
    RunConfig::default().with_batch_size(batch_size).with_save_frequency(1)
}

/// Echoes the prompt back, so each prediction names the question it answered.
struct EchoBackend {
    batches: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl EchoBackend {
    fn new() -> Self {
        Self {
            batches: AtomicUsize::new(0),
            cancel_after: None,
        }
    }

    fn cancelling_after(batches: usize, token: CancellationToken) -> Self {
        Self {
            batches: AtomicUsize::new(0),
            cancel_after: Some((batches, token)),
        }
    }
}

#[async_trait]
impl GenerationBackend for EchoBackend {
    fn capability(&self) -> Capability {
        Capability::LocalGenerate
    }

    async fn generate_one(&self, prompt: &Prompt, _max_new_tokens: u32) -> Result<Generation> {
        Ok(Generation::success(prompt.text.clone(), 1))
    }

    async fn generate_batch(&self, prompts: &[Prompt], _max_new_tokens: u32) -> Result<Vec<Generation>> {
        let done = self.batches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if done >= *limit {
                token.cancel();
            }
        }
        Ok(prompts.iter().map(|p| Generation::success(p.text.clone(), 1)).collect())
    }
}

/// Fails every example without a fatal error.
struct DeadBackend {
    batches: AtomicUsize,
}

#[async_trait]
impl GenerationBackend for DeadBackend {
    fn capability(&self) -> Capability {
        Capability::RemoteChat
    }

    async fn generate_one(&self, _prompt: &Prompt, _max_new_tokens: u32) -> Result<Generation> {
        Ok(Generation::failure("connection refused", 3))
    }

    async fn generate_batch(&self, prompts: &[Prompt], max_new_tokens: u32) -> Result<Vec<Generation>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::new();
        for prompt in prompts {
            out.push(self.generate_one(prompt, max_new_tokens).await?);
        }
        Ok(out)
    }
}

mock! {
    pub Backend {}

    #[async_trait]
    impl GenerationBackend for Backend {
        fn capability(&self) -> Capability;
        async fn generate_one(&self, prompt: &Prompt, max_new_tokens: u32) -> Result<Generation>;
        async fn generate_batch(&self, prompts: &[Prompt], max_new_tokens: u32) -> Result<Vec<Generation>>;
    }
}

// ===== Full Runs =====

#[tokio::test]
async fn test_run_writes_every_example_in_order() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 10);
    let runner = JobRunner::new(Arc::new(EchoBackend::new()), "m", config(3));

    let report = runner.run(&spec).await.unwrap();

    assert_eq!(report.state, JobState::Done);
    assert_eq!(report.total, 10);
    assert_eq!(report.processed, 10);
    assert_eq!(report.succeeded, 10);
    assert!(!spec.checkpoint_path().exists());

    let records = read_output(&spec.output_file);
    let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
    let expected: Vec<String> = (1..=10).map(|i| i.to_string()).collect();
    assert_eq!(ids, expected);
    for record in &records {
        assert!(record.pred.contains(&format!("<<q-{}>>", record.id)));
        assert_eq!(record.gold, record.id.to_string());
    }
}

#[tokio::test]
async fn test_example_cap_limits_the_run() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 10);
    let runner = JobRunner::new(
        Arc::new(EchoBackend::new()),
        "m",
        config(4).with_max_test_example_num(5),
    );

    let report = runner.run(&spec).await.unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(read_output(&spec.output_file).len(), 5);
}

#[tokio::test]
async fn test_progress_is_broadcast_per_batch() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 5);
    let mut runner = JobRunner::new(Arc::new(EchoBackend::new()), "m", config(2));
    let mut rx = runner.enable_progress_tracking();

    runner.run(&spec).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        seen.push(progress.processed);
    }
    assert_eq!(seen, vec![2, 4, 5]);
}

#[tokio::test]
async fn test_duplicate_input_ids_are_generated_once() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 2);
    let records = serde_json::json!([
        {"id": 1, "question": "<<q-1>>", "answer": "1"},
        {"id": 1, "question": "<<q-1-again>>", "answer": "1"},
        {"id": 2, "question": "<<q-2>>", "answer": "2"}
    ]);
    std::fs::write(&spec.input_file, records.to_string()).unwrap();
    let runner = JobRunner::new(Arc::new(EchoBackend::new()), "m", config(2));

    let report = runner.run(&spec).await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.processed, 2);
    let output = read_output(&spec.output_file);
    let ids: Vec<String> = output.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert!(output[0].pred.contains("<<q-1>>"));
}

// ===== Resume =====

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 7);
    let runner = JobRunner::new(Arc::new(EchoBackend::new()), "m", config(3));

    runner.run(&spec).await.unwrap();
    let before = std::fs::read_to_string(&spec.output_file).unwrap();
    let report = runner.run(&spec).await.unwrap();

    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 7);
    assert_eq!(std::fs::read_to_string(&spec.output_file).unwrap(), before);
}

#[tokio::test]
async fn test_resume_after_crash_yields_exactly_one_record_per_example() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 10);

    let first = JobRunner::new(Arc::new(EchoBackend::new()), "m", config(2).with_max_test_example_num(4));
    first.run(&spec).await.unwrap();

    // A crash mid-write leaves a partial last line.
    let mut content = std::fs::read_to_string(&spec.output_file).unwrap();
    content.push_str("{\"id\": \"5\", \"pred\": \"<<q-");
    std::fs::write(&spec.output_file, content).unwrap();

    let second = JobRunner::new(Arc::new(EchoBackend::new()), "m", config(2));
    let report = second.run(&spec).await.unwrap();

    assert_eq!(report.skipped, 4);
    assert_eq!(report.processed, 6);
    let records = read_output(&spec.output_file);
    assert_eq!(records.len(), 10);
    let unique: HashSet<String> = records.iter().map(|r| r.id.to_string()).collect();
    assert_eq!(unique.len(), 10);
}

#[tokio::test]
async fn test_checkpoint_of_another_model_is_discarded() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 3);
    let stale = Checkpoint::new("not-this-spec".to_string(), "other".to_string());
    std::fs::create_dir_all(spec.output_file.parent().unwrap()).unwrap();
    std::fs::write(spec.checkpoint_path(), serde_json::to_string(&stale).unwrap()).unwrap();

    let runner = JobRunner::new(Arc::new(EchoBackend::new()), "m", config(2));
    let report = runner.run(&spec).await.unwrap();

    assert_eq!(report.processed, 3);
    assert!(!spec.checkpoint_path().exists());
}

// ===== Cancellation =====

#[tokio::test]
async fn test_cancel_flushes_and_keeps_checkpoint() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 9);
    let token = CancellationToken::new();
    let backend = EchoBackend::cancelling_after(1, token.clone());
    let runner = JobRunner::new(Arc::new(backend), "m", config(3)).with_cancellation(token);

    let report = runner.run(&spec).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed, 3);
    assert_eq!(read_output(&spec.output_file).len(), 3);
    let checkpoint: Checkpoint =
        serde_json::from_str(&std::fs::read_to_string(spec.checkpoint_path()).unwrap()).unwrap();
    assert_eq!(checkpoint.completed_ids.len(), 3);
    assert_eq!(checkpoint.records_flushed, 3);

    let resumed = JobRunner::new(Arc::new(EchoBackend::new()), "m", config(3));
    let report = resumed.run(&spec).await.unwrap();
    assert_eq!(report.skipped, 3);
    assert_eq!(report.state, JobState::Done);
    assert_eq!(read_output(&spec.output_file).len(), 9);
    assert!(!spec.checkpoint_path().exists());
}

// ===== Failures =====

#[tokio::test]
async fn test_failed_examples_are_persisted_and_logged() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 2);
    let runner = JobRunner::new(
        Arc::new(DeadBackend {
            batches: AtomicUsize::new(0),
        }),
        "m",
        config(2),
    );

    let report = runner.run(&spec).await.unwrap();

    assert_eq!(report.failed, 2);
    let records = read_output(&spec.output_file);
    assert!(records.iter().all(|r| !r.succeeded && r.attempts == 3));
    let log = std::fs::read_to_string(spec.error_log_path()).unwrap();
    assert!(log.contains("connection refused"));
    let ids: Vec<String> = serde_json::from_str(&std::fs::read_to_string(spec.error_ids_path()).unwrap()).unwrap();
    assert_eq!(ids, vec!["1", "2"]);
}

#[tokio::test]
async fn test_backend_unavailable_after_consecutive_failed_batches() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 20);
    let backend = Arc::new(DeadBackend {
        batches: AtomicUsize::new(0),
    });
    let runner = JobRunner::new(backend.clone(), "m", config(2).with_unavailable_after(3));

    let err = runner.run(&spec).await.unwrap_err();

    assert!(matches!(err, CoreError::BackendUnavailable { .. }));
    assert!(err.stops_run());
    assert_eq!(backend.batches.load(Ordering::SeqCst), 3);
    assert_eq!(read_output(&spec.output_file).len(), 6);
    assert!(spec.checkpoint_path().exists());
}

#[tokio::test]
async fn test_fatal_backend_error_aborts_job() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 4);
    let mut backend = MockBackend::new();
    backend
        .expect_generate_batch()
        .times(1)
        .returning(|_, _| Err(CoreError::fatal(FatalKind::OutOfMemory, "CUDA out of memory")));

    let runner = JobRunner::new(Arc::new(backend), "m", config(2));
    let err = runner.run(&spec).await.unwrap_err();

    assert!(matches!(err, CoreError::BackendFatal { kind: FatalKind::OutOfMemory, .. }));
    assert!(!err.stops_run());
}

#[tokio::test]
async fn test_fatal_error_survives_a_failing_flush() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 4);
    // A non-empty directory where the checkpoint goes makes the final rename fail.
    let blocker = spec.checkpoint_path();
    std::fs::create_dir_all(&blocker).unwrap();
    std::fs::write(blocker.join("keep"), "x").unwrap();

    let mut backend = MockBackend::new();
    backend
        .expect_generate_batch()
        .times(1)
        .returning(|_, _| Err(CoreError::fatal(FatalKind::OutOfMemory, "CUDA out of memory")));

    let runner = JobRunner::new(Arc::new(backend), "m", config(2));
    let err = runner.run(&spec).await.unwrap_err();

    assert!(matches!(err, CoreError::BackendFatal { kind: FatalKind::OutOfMemory, .. }));
}

#[tokio::test]
async fn test_run_all_continues_after_model_load_failure_but_stops_on_auth() {
    let dir = TempDir::new().unwrap();
    let first = math_spec(&dir.path().join("a"), 2);
    let second = math_spec(&dir.path().join("b"), 2);
    let third = math_spec(&dir.path().join("c"), 2);

    let calls = Arc::new(Mutex::new(0usize));
    let counter = calls.clone();
    let mut backend = MockBackend::new();
    backend.expect_generate_batch().returning(move |_, _| {
        let mut n = counter.lock().unwrap();
        *n += 1;
        match *n {
            1 => Err(CoreError::fatal(FatalKind::ModelLoad, "weights missing")),
            _ => Err(CoreError::fatal(FatalKind::Authentication, "invalid key")),
        }
    });

    let runner = JobRunner::new(Arc::new(backend), "m", config(2));
    let summary = runner.run_all(&[first, second, third]).await;

    assert_eq!(summary.failures.len(), 2);
    assert!(summary.has_fatal());
    assert!(summary.stopped.is_some());
    assert_eq!(*calls.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_clear_outputs_removes_side_files() {
    let dir = TempDir::new().unwrap();
    let spec = math_spec(dir.path(), 2);
    let runner = JobRunner::new(
        Arc::new(DeadBackend {
            batches: AtomicUsize::new(0),
        }),
        "m",
        config(1),
    );
    runner.run(&spec).await.unwrap();

    clear_outputs(&spec).await.unwrap();

    let paths: Vec<PathBuf> = vec![spec.output_file.clone(), spec.error_log_path(), spec.error_ids_path()];
    assert!(paths.iter().all(|p| !p.exists()));
}
