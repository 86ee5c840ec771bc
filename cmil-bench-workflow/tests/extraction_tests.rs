use cmil_bench_core::*;
use cmil_bench_workflow::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use std::path::Path;
use tempfile::TempDir;

// ===== Helpers =====

fn write_jsonl(path: &Path, records: &[serde_json::Value]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body: String = records.iter().map(|r| format!("{}\n", r)).collect();
    std::fs::write(path, body).unwrap();
}

fn read_answers(path: &Path) -> Vec<ExtractedAnswer> {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// ===== Single Records =====

#[rstest]
#[case(TaskKind::Safety, "经过分析，答案是C。", "C", true)]
#[case(TaskKind::EthnicDomainKnowledge, "正确答案：A、D", "AD", true)]
#[case(TaskKind::MathReasoning, "答案：42 个苹果", "42", true)]
#[case(TaskKind::MathReasoning, "无法计算", "无法计算", false)]
#[case(TaskKind::TextGeneration, "  自由回答  ", "自由回答", true)]
#[case(TaskKind::Translation, "译文：你好", "你好", true)]
fn test_extract_record(
    #[case] kind: TaskKind,
    #[case] pred: &str,
    #[case] answer: &str,
    #[case] extracted: bool,
) {
    let result = InferenceResult::success(ExampleId::from(1u64), pred, "x");

    let record = extract_record(kind, &result);

    assert_eq!(record.answer, answer);
    assert_eq!(record.extraction_success, extracted);
    assert_eq!(record.pred, pred);
}

#[test]
fn test_backend_failure_is_never_extracted() {
    let result = InferenceResult::failure(ExampleId::from("7"), "A", "timeout");

    let record = extract_record(TaskKind::Safety, &result);

    assert_eq!(record.answer, "");
    assert!(!record.extraction_success);
}

#[test]
fn test_english_category_aligned_to_english_gold() {
    let result = InferenceResult::success(ExampleId::from("1"), "类别：科技", "Technology");

    let record = extract_record(TaskKind::TextClassification, &result);

    assert_eq!(record.answer, "Technology");
}

// ===== Extraction Pass =====

#[tokio::test]
async fn test_pass_mirrors_tree_and_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("results");
    let output = dir.path().join("extracted");
    write_jsonl(
        &input.join("qwen/General_Domain_Competence/bo/zh-prompt_test.jsonl"),
        &[
            json!({"id": 1, "pred": "答案是B", "gold": "B"}),
            json!({"id": 2, "pred": "不知道", "gold": "A"}),
            json!({"pred": "A"}),
        ],
    );
    write_jsonl(
        &input.join("qwen/Math_Reasoning/ug/en-prompt_test.jsonl"),
        &[json!({"id": "m1", "pred": "The result is 12", "gold": 12})],
    );

    let summary = ExtractionPass::new(&input, &output).run().await.unwrap();

    assert_eq!(summary.files.len(), 2);
    assert_eq!(summary.total_items(), 4);
    assert_eq!(summary.failed_items(), 1);

    let choice = read_answers(&output.join("qwen/General_Domain_Competence/bo/zh-prompt_test.json"));
    assert_eq!(choice.len(), 2);
    assert_eq!(choice[0].answer, "B");
    assert!(!choice[1].extraction_success);

    let math = read_answers(&output.join("qwen/Math_Reasoning/ug/en-prompt_test.json"));
    assert_eq!(math[0].gold, "12");
    assert_eq!(math[0].answer, "12");

    for artifact in [
        "processed_files_map.json",
        "extraction_failed_ids.json",
        "extraction_statistics.json",
        "extraction_report.txt",
    ] {
        assert!(output.join(artifact).is_file(), "{} missing", artifact);
    }

    let failed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output.join("extraction_failed_ids.json")).unwrap()).unwrap();
    assert_eq!(
        failed["qwen"]["General_Domain_Competence"]["bo"]["zh-prompt_test.jsonl"],
        json!(["2"])
    );

    let stats: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output.join("extraction_statistics.json")).unwrap()).unwrap();
    assert_eq!(stats["by_model"]["qwen"]["total_items"], json!(4));
    assert_eq!(stats["by_model"]["qwen"]["invalid_items"], json!(1));

    let report = std::fs::read_to_string(output.join("extraction_report.txt")).unwrap();
    assert!(report.starts_with("提取统计报告"));
    assert!(report.contains("提取失败详情:"));
}

#[tokio::test]
async fn test_pass_reads_json_array_results() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("results");
    let path = input.join("m/Natural_Language_Inference/mn/zh-prompt_test.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        json!([{"id": 1, "pred": "选C", "gold": "C"}, {"id": 2, "pred": "A", "gold": "B"}]).to_string(),
    )
    .unwrap();

    let summary = ExtractionPass::new(&input, dir.path().join("out")).run().await.unwrap();

    assert_eq!(summary.files[0].stats.processed_items, 2);
    assert_eq!(summary.files[0].stats.extraction_failed_items, 0);
}

#[tokio::test]
async fn test_pass_skips_unknown_directories() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("results");
    write_jsonl(
        &input.join("m/Poetry_Writing/bo/zh-prompt_test.jsonl"),
        &[json!({"id": 1, "pred": "x", "gold": "y"})],
    );
    write_jsonl(
        &input.join("m/Math_Reasoning/kk/zh-prompt_test.jsonl"),
        &[json!({"id": 1, "pred": "1", "gold": "1"})],
    );

    let summary = ExtractionPass::new(&input, dir.path().join("out")).run().await.unwrap();

    assert!(summary.files.is_empty());
    assert_eq!(summary.skipped.len(), 2);
    assert!(summary.render_report().contains("跳过的文件:"));
}

#[tokio::test]
async fn test_pass_requires_input_directory() {
    let dir = TempDir::new().unwrap();

    let err = ExtractionPass::new(dir.path().join("absent"), dir.path().join("out"))
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::NotFound(_)));
}

#[test]
fn test_discovery_is_sorted_and_typed() {
    let dir = TempDir::new().unwrap();
    for rel in [
        "b/Math_Reasoning/bo/zh-prompt_test.jsonl",
        "a/Math_Reasoning/ug/zh-prompt_test.jsonl",
        "a/Minority_Machine_Translation/mn/zh-prompt_zh2mn_test.jsonl",
        "a/Math_Reasoning/ug/notes.txt",
    ] {
        write_jsonl(&dir.path().join(rel), &[]);
    }

    let (files, unknown) = discover_result_files(dir.path());

    assert!(unknown.is_empty());
    let found: Vec<(String, BenchmarkTask, Language)> =
        files.iter().map(|f| (f.model.clone(), f.task, f.language)).collect();
    assert_eq!(
        found,
        vec![
            ("a".to_string(), BenchmarkTask::MathReasoning, Language::Ug),
            ("a".to_string(), BenchmarkTask::MinorityMachineTranslation, Language::Mn),
            ("b".to_string(), BenchmarkTask::MathReasoning, Language::Bo),
        ]
    );
}
