use approx::assert_relative_eq;
use cmil_bench_core::{BenchmarkTask, ExampleId, ExtractedAnswer, Language, MetricName, ScoreType};
use cmil_bench_metrics::{score_file, FileContext, JudgeScores, MetricPlan};
use pretty_assertions::assert_eq;

fn answer(id: u64, gold: &str, answer: &str, ok: bool) -> ExtractedAnswer {
    ExtractedAnswer {
        id: ExampleId::from(id),
        gold: gold.to_string(),
        pred: answer.to_string(),
        answer: answer.to_string(),
        extraction_success: ok,
        category: None,
    }
}

fn ctx(task: BenchmarkTask, file: &str) -> FileContext {
    FileContext::new("model-a", task, Language::Bo, file)
}

#[test]
fn test_five_example_choice_scenario() {
    // three "The answer is A." extractions, two "I cannot determine" fallbacks
    let answers = vec![
        answer(1, "A", "A", true),
        answer(2, "A", "A", true),
        answer(3, "A", "A", true),
        answer(4, "A", "I cannot determine", false),
        answer(5, "A", "I cannot determine", false),
    ];
    let score = score_file(&answers, &ctx(BenchmarkTask::CoreferenceResolution, "zh-prompt_test.jsonl"), None)
        .unwrap();

    assert_eq!(score.primary, MetricName::Accuracy);
    assert_relative_eq!(score.primary_all().unwrap(), 0.6);
    assert_relative_eq!(score.primary_success().unwrap(), 1.0);
    assert_relative_eq!(score.success_rate(), 0.6);

    let all = score.primary_record(ScoreType::All).unwrap();
    assert_eq!(all.sample_count, 5);
    assert_eq!(all.success_count, 3);
    assert_eq!(all.language, "Tibetan");
    assert_eq!(all.task, "Coreference_Resolution");
}

#[test]
fn test_no_extracted_answers_gives_undefined_success() {
    let answers = vec![answer(1, "A", "???", false), answer(2, "B", "", false)];
    let score = score_file(&answers, &ctx(BenchmarkTask::ValueAlignmentAssessment, "zh-prompt_test.jsonl"), None)
        .unwrap();
    assert_eq!(score.primary_all(), Some(0.0));
    assert_eq!(score.primary_success(), None);
}

#[test]
fn test_empty_file_is_a_gap() {
    let gap = score_file(&[], &ctx(BenchmarkTask::MathReasoning, "zh-prompt_test.jsonl"), None).unwrap_err();
    assert_eq!(gap.reason, "no records");
    assert_eq!(gap.task, "Math_Reasoning");
}

#[test]
fn test_translation_scores_both_metrics_with_direction_primary() {
    let answers = vec![
        answer(1, "我爱北京", "我爱北京", true),
        answer(2, "你好", "", false),
    ];
    let to_zh = score_file(&answers, &ctx(BenchmarkTask::MinorityMachineTranslation, "zh-prompt_bo2zh_test.jsonl"), None)
        .unwrap();
    assert_eq!(to_zh.primary, MetricName::Bleu);
    assert_relative_eq!(to_zh.primary_success().unwrap(), 100.0, epsilon = 1e-9);
    assert_relative_eq!(to_zh.primary_all().unwrap(), 50.0, epsilon = 1e-9);
    assert!(to_zh.records.iter().any(|r| r.is_metric(MetricName::ChrfPlusPlus)));

    let from_zh = score_file(&answers, &ctx(BenchmarkTask::MinorityMachineTranslation, "zh-prompt_zh2bo_test.jsonl"), None)
        .unwrap();
    assert_eq!(from_zh.primary, MetricName::ChrfPlusPlus);
}

#[test]
fn test_reading_comprehension_rouge_with_failures() {
    let answers = vec![answer(1, "ཀཁ", "ཀཁ", true), answer(2, "ཀཁ", "", false)];
    let score = score_file(&answers, &ctx(BenchmarkTask::MachineReadingComprehension, "zh-prompt_test.jsonl"), None)
        .unwrap();
    assert_eq!(score.primary, MetricName::RougeL);
    assert_relative_eq!(score.primary_all().unwrap(), 0.5);
    assert_relative_eq!(score.primary_success().unwrap(), 1.0);
}

#[test]
fn test_llm_score_requires_judge_artifact() {
    let answers = vec![answer(1, "ref", "text", true), answer(2, "ref", "text", true)];
    let context = ctx(BenchmarkTask::MinorityCultureQa, "zh-prompt_test.jsonl");
    let gap = score_file(&answers, &context, None).unwrap_err();
    assert_eq!(gap.reason, "judge scores missing");

    let mut judge = JudgeScores::new();
    judge.insert(ExampleId::from(1u64), 4.0);
    let score = score_file(&answers, &context, Some(&judge)).unwrap();
    assert_eq!(score.primary, MetricName::LlmScore);
    assert_relative_eq!(score.primary_all().unwrap(), 2.0);
    assert_relative_eq!(score.primary_success().unwrap(), 4.0);
    assert_relative_eq!(score.success_rate(), 0.5);
}

#[test]
fn test_safety_per_category_accuracy() {
    let mut answers = vec![
        answer(1, "A", "A", true),
        answer(2, "B", "A", true),
        answer(3, "C", "C", true),
    ];
    answers[0].category = Some("偏见".to_string());
    answers[1].category = Some("偏见".to_string());
    answers[2].category = Some("隐私".to_string());

    let score = score_file(&answers, &ctx(BenchmarkTask::DiscriminationDetection, "zh-prompt_test.jsonl"), None)
        .unwrap();
    let bias = score
        .records
        .iter()
        .find(|r| r.metric == "偏见_Accuracy" && r.score_type == ScoreType::All)
        .unwrap();
    assert_relative_eq!(bias.score.unwrap(), 0.5);
    assert_eq!(bias.sample_count, 2);
    assert_eq!(score.records.len(), 6);
}

#[test]
fn test_metric_plan_and_variant() {
    let context = ctx(BenchmarkTask::MinorityMachineTranslation, "en-prompt_zh2bo_test.jsonl");
    assert_eq!(context.variant(), "en-prompt_zh2bo");
    let plan = MetricPlan::for_file(&context);
    assert_eq!(plan.metrics, vec![MetricName::ChrfPlusPlus, MetricName::Bleu]);
}
