use approx::assert_relative_eq;
use async_trait::async_trait;
use cmil_bench_core::*;
use cmil_bench_workflow::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

// ===== Helpers =====

fn write_jsonl(path: &Path, records: &[serde_json::Value]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body: String = records.iter().map(|r| format!("{}\n", r)).collect();
    std::fs::write(path, body).unwrap();
}

fn write_extracted(root: &Path, model: &str, task: &str, lang: &str, answers: &[(&str, &str, bool)]) {
    let path = root.join(model).join(task).join(lang).join("zh-prompt_test.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let records: Vec<ExtractedAnswer> = answers
        .iter()
        .enumerate()
        .map(|(i, (answer, gold, ok))| ExtractedAnswer {
            id: ExampleId::from(i as u64 + 1),
            gold: gold.to_string(),
            pred: answer.to_string(),
            answer: answer.to_string(),
            extraction_success: *ok,
            category: None,
        })
        .collect();
    std::fs::write(path, serde_json::to_string(&records).unwrap()).unwrap();
}

fn score_of(outcome: &EvaluationOutcome, model: &str, score_type: ScoreType) -> Option<f64> {
    outcome
        .scores
        .iter()
        .find(|s| s.context.model == model)
        .and_then(|s| s.primary_record(score_type))
        .and_then(|r| r.score)
}

// ===== End To End =====

#[tokio::test]
async fn test_results_to_rankings() {
    let dir = TempDir::new().unwrap();
    let results = dir.path().join("results");
    let extracted = dir.path().join("extracted");
    let reports = dir.path().join("reports");

    let records: Vec<serde_json::Value> = (1..=5)
        .map(|i| {
            let pred = if i <= 3 { "The answer is A." } else { "I cannot determine" };
            json!({"id": i, "pred": pred, "gold": "A"})
        })
        .collect();
    write_jsonl(&results.join("m1/General_Domain_Competence/bo/zh-prompt_test.jsonl"), &records);

    let summary = ExtractionPass::new(&results, &extracted).run().await.unwrap();
    assert_eq!(summary.failed_items(), 2);

    let outcome = EvaluationPass::new(&extracted, &reports).run().await.unwrap();

    assert!(outcome.gaps.is_empty());
    assert_relative_eq!(score_of(&outcome, "m1", ScoreType::Success).unwrap(), 1.0);
    assert_relative_eq!(score_of(&outcome, "m1", ScoreType::All).unwrap(), 0.6);
    assert_relative_eq!(outcome.scores[0].success_rate(), 0.6);
    assert_eq!(outcome.rankings.overall.len(), 1);
    assert_eq!(outcome.rankings.overall[0].overall_rank, 1);

    for artifact in [
        "evaluation_summary.json",
        "task_ranking.json",
        "model_overall_ranking.json",
        "partial_models.json",
        "aggregation_gaps.json",
        "ranking_report.txt",
    ] {
        assert!(reports.join(artifact).is_file(), "{} missing", artifact);
    }

    let summary_rows: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(reports.join("evaluation_summary.json")).unwrap()).unwrap();
    assert_eq!(summary_rows[0]["Model"], json!("m1"));
    assert_eq!(summary_rows[0]["Language"], json!("Tibetan"));
    assert_eq!(summary_rows[0]["Metric"], json!("Accuracy"));
}

/// Answers every math question with its expected number except the second one.
struct SecondExampleFails;

#[async_trait]
impl GenerationBackend for SecondExampleFails {
    fn capability(&self) -> Capability {
        Capability::RemoteChat
    }

    async fn generate_one(&self, prompt: &Prompt, _max_new_tokens: u32) -> Result<Generation> {
        if prompt.text.contains("<<q-2>>") {
            Ok(Generation::failure("HTTP 500", 3))
        } else {
            Ok(Generation::success("答案：7", 1))
        }
    }

    async fn generate_batch(&self, prompts: &[Prompt], max_new_tokens: u32) -> Result<Vec<Generation>> {
        let mut out = Vec::new();
        for prompt in prompts {
            out.push(self.generate_one(prompt, max_new_tokens).await?);
        }
        Ok(out)
    }
}

#[tokio::test]
async fn test_runner_side_files_are_not_read_as_results() {
    let dir = TempDir::new().unwrap();
    let results = dir.path().join("results");
    let extracted = dir.path().join("extracted");
    let input = dir.path().join("data/Foundation_Tasks/Math_Reasoning/bo.json");
    std::fs::create_dir_all(input.parent().unwrap()).unwrap();
    let examples: Vec<serde_json::Value> = (1..=3)
        .map(|i| json!({"id": i, "question": format!("<<q-{}>>", i), "answer": "7"}))
        .collect();
    std::fs::write(&input, serde_json::to_string(&examples).unwrap()).unwrap();
    let spec = TaskSpec {
        task: BenchmarkTask::MathReasoning,
        eval_lang: Language::Bo,
        prompt_lang: PromptLang::Zh,
        input_file: input,
        output_file: results.join("m1/Math_Reasoning/bo/zh-prompt_test.jsonl"),
        exemplar_file: None,
        num_exemplar: 0,
        max_passage_len: None,
        src_lang: None,
        tgt_lang: None,
        max_new_tokens: 200,
    };

    let runner = JobRunner::new(Arc::new(SecondExampleFails), "m1", RunConfig::default().with_batch_size(3));
    let report = runner.run(&spec).await.unwrap();
    assert_eq!(report.failed, 1);
    assert!(spec.error_ids_path().is_file());
    // Leftovers of an interrupted run sit next to the output as well.
    std::fs::write(spec.checkpoint_path(), "{}").unwrap();
    std::fs::write(spec.output_file.with_extension("jsonl.tmp"), "").unwrap();

    let summary = ExtractionPass::new(&results, &extracted).run().await.unwrap();

    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.files[0].stats.file_name, "zh-prompt_test.jsonl");
    assert_eq!(summary.files[0].stats.invalid_items, 0);
    assert!(summary.skipped.is_empty());
    let lang_dir = extracted.join("m1/Math_Reasoning/bo");
    let mut written: Vec<String> = std::fs::read_dir(&lang_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    written.sort();
    assert_eq!(written, vec!["zh-prompt_test.json"]);

    let outcome = EvaluationPass::new(&extracted, dir.path().join("reports")).run().await.unwrap();

    assert!(outcome.gaps.is_empty(), "unexpected gaps: {:?}", outcome.gaps);
    assert_eq!(outcome.scores.len(), 1);
    assert_relative_eq!(score_of(&outcome, "m1", ScoreType::All).unwrap(), 2.0 / 3.0, epsilon = 1e-9);
}

// ===== Ranking =====

#[tokio::test]
async fn test_models_ranked_per_task_and_overall() {
    let dir = TempDir::new().unwrap();
    let extracted = dir.path().join("extracted");
    write_extracted(&extracted, "strong", "Math_Reasoning", "bo", &[("1", "1", true), ("2", "2", true)]);
    write_extracted(&extracted, "weak", "Math_Reasoning", "bo", &[("1", "1", true), ("9", "2", true)]);
    write_extracted(&extracted, "strong", "Natural_Language_Inference", "ug", &[("A", "B", true)]);
    write_extracted(&extracted, "weak", "Natural_Language_Inference", "ug", &[("B", "B", true)]);

    let outcome = EvaluationPass::new(&extracted, dir.path().join("reports")).score().await.unwrap();

    assert_eq!(
        outcome.rankings.canonical_keys(),
        vec!["Math_Reasoning_bo_zh-prompt", "Natural_Language_Inference_ug_zh-prompt"]
    );
    let math = &outcome.rankings.per_task.values().next().unwrap();
    assert_eq!(math[0].model, "strong");
    assert_eq!(math[1].model, "weak");

    let overall: Vec<(&str, f64, usize)> = outcome
        .rankings
        .overall
        .iter()
        .map(|e| (e.model.as_str(), e.average_rank, e.total_score))
        .collect();
    assert_eq!(overall.len(), 2);
    assert!(overall.iter().all(|(_, avg, total)| (*avg - 1.5).abs() < 1e-9 && *total == 3));
    assert!(outcome.rankings.partial.is_empty());
}

#[tokio::test]
async fn test_model_missing_a_task_is_partial() {
    let dir = TempDir::new().unwrap();
    let extracted = dir.path().join("extracted");
    write_extracted(&extracted, "full", "Math_Reasoning", "bo", &[("1", "1", true)]);
    write_extracted(&extracted, "full", "Math_Reasoning", "mn", &[("1", "1", true)]);
    write_extracted(&extracted, "half", "Math_Reasoning", "bo", &[("1", "1", true)]);

    let outcome = EvaluationPass::new(&extracted, dir.path().join("reports")).score().await.unwrap();

    assert_eq!(outcome.rankings.overall.len(), 1);
    assert_eq!(outcome.rankings.overall[0].model, "full");
    assert_eq!(outcome.rankings.partial[0].model, "half");
    assert_eq!(outcome.rankings.partial[0].tasks_missing, vec!["Math_Reasoning_mn_zh-prompt"]);
    assert!(outcome.render_report().contains("未完整评估的模型:"));
}

#[tokio::test]
async fn test_file_without_successful_extraction_is_unranked() {
    let dir = TempDir::new().unwrap();
    let extracted = dir.path().join("extracted");
    write_extracted(&extracted, "m", "Math_Reasoning", "bo", &[("none", "1", false)]);

    let outcome = EvaluationPass::new(&extracted, dir.path().join("reports")).score().await.unwrap();

    assert_eq!(outcome.scores.len(), 1);
    assert_eq!(score_of(&outcome, "m", ScoreType::Success), None);
    assert_eq!(outcome.rankings.unranked.len(), 1);
    assert!(outcome.rankings.overall.is_empty());
}

// ===== Judge Scores =====

#[tokio::test]
async fn test_judged_task_without_artifact_is_a_gap() {
    let dir = TempDir::new().unwrap();
    let extracted = dir.path().join("extracted");
    write_extracted(&extracted, "m", "Minority_Culture_QA", "bo", &[("答", "参考", true)]);

    let without_dir = EvaluationPass::new(&extracted, dir.path().join("r1")).score().await.unwrap();
    assert_eq!(without_dir.gaps[0].reason, "judge directory not configured");

    let outcome = EvaluationPass::new(&extracted, dir.path().join("r2"))
        .with_judge_dir(dir.path().join("judge"))
        .score()
        .await
        .unwrap();

    assert!(outcome.scores.is_empty());
    assert_eq!(outcome.gaps.len(), 1);
    assert_eq!(outcome.gaps[0].language, "Tibetan");
    assert!(outcome.gaps[0].reason.starts_with("judge artifact missing"));
    assert!(outcome.render_report().contains("缺失的评估结果:"));
}

#[tokio::test]
async fn test_judged_task_scored_from_artifact() {
    let dir = TempDir::new().unwrap();
    let extracted = dir.path().join("extracted");
    let judge = dir.path().join("judge");
    write_extracted(
        &extracted,
        "m",
        "Minority_Culture_QA",
        "bo",
        &[("a1", "r1", true), ("a2", "r2", true), ("a3", "r3", true)],
    );
    let artifact = evaluation_path(&judge, "m", BenchmarkTask::MinorityCultureQa, Language::Bo);
    std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    std::fs::write(
        &artifact,
        json!([
            {"id": "1", "final_score": 4.0},
            {"id": 2, "final_score": 2.0},
            {"id": "3", "final_score": 0.0, "summary": "评估不成功"}
        ])
        .to_string(),
    )
    .unwrap();

    let outcome = EvaluationPass::new(&extracted, dir.path().join("reports"))
        .with_judge_dir(&judge)
        .score()
        .await
        .unwrap();

    assert!(outcome.gaps.is_empty());
    assert_eq!(outcome.scores[0].primary, MetricName::LlmScore);
    assert_relative_eq!(score_of(&outcome, "m", ScoreType::All).unwrap(), 2.0);
    assert_relative_eq!(score_of(&outcome, "m", ScoreType::Success).unwrap(), 3.0);
}

#[tokio::test]
async fn test_load_judge_scores_keeps_only_successes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bo_evaluation.json");
    std::fs::write(
        &path,
        json!([{"id": "a", "final_score": 5.0}, {"id": "b", "final_score": null}]).to_string(),
    )
    .unwrap();

    let scores = load_judge_scores(&path).await.unwrap().unwrap();

    assert_eq!(scores.len(), 1);
    assert_eq!(scores.get(&ExampleId::from("a")), Some(&5.0));
    assert!(load_judge_scores(&dir.path().join("absent.json")).await.unwrap().is_none());
}

// ===== Filters =====

#[tokio::test]
async fn test_filter_restricts_models_and_languages() {
    let dir = TempDir::new().unwrap();
    let extracted = dir.path().join("extracted");
    write_extracted(&extracted, "a", "Math_Reasoning", "bo", &[("1", "1", true)]);
    write_extracted(&extracted, "a", "Math_Reasoning", "ug", &[("1", "1", true)]);
    write_extracted(&extracted, "b", "Math_Reasoning", "bo", &[("1", "1", true)]);

    let outcome = EvaluationPass::new(&extracted, dir.path().join("reports"))
        .with_filter(EvaluationFilter {
            models: vec!["a".to_string()],
            tasks: vec![],
            languages: vec![Language::Ug],
        })
        .score()
        .await
        .unwrap();

    assert_eq!(outcome.scores.len(), 1);
    assert_eq!(outcome.scores[0].context.language, Language::Ug);
}
