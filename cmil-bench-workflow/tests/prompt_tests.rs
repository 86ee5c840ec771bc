use cmil_bench_core::*;
use cmil_bench_workflow::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::json;
use std::path::PathBuf;

// ===== Helpers =====

fn spec(task: BenchmarkTask, lang: Language, prompt_lang: PromptLang) -> TaskSpec {
    TaskSpec {
        task,
        eval_lang: lang,
        prompt_lang,
        input_file: PathBuf::from("in.json"),
        output_file: PathBuf::from("out.jsonl"),
        exemplar_file: None,
        num_exemplar: 0,
        max_passage_len: task.default_max_passage_len(),
        src_lang: None,
        tgt_lang: None,
        max_new_tokens: task.default_max_new_tokens(),
    }
}

fn example(spec: &TaskSpec, record: serde_json::Value) -> Example {
    Example::from_record(record, spec).unwrap()
}

// ===== Templates =====

#[rstest]
#[case(
    PromptLang::Zh,
    "解决以下藏语数学问题，并只提供最终的数字答案。\n问题：2+3=?\n答案："
)]
#[case(
    PromptLang::En,
    "Solve the following Tibetan math problem and provide only the final numerical answer.\nProblem: 2+3=?\nAnswer: "
)]
fn test_math_template(#[case] prompt_lang: PromptLang, #[case] expected: &str) {
    let spec = spec(BenchmarkTask::MathReasoning, Language::Bo, prompt_lang);
    let ex = example(&spec, json!({"id": 1, "question": "2+3=?", "answer": "5"}));

    assert_eq!(format_prompt(&spec, &[], &ex).text, expected);
}

#[test]
fn test_entailment_template_localizes_options() {
    let spec = spec(BenchmarkTask::NaturalLanguageInference, Language::Ug, PromptLang::Zh);
    let ex = example(
        &spec,
        json!({
            "id": "n1",
            "sentence1": "s1",
            "sentence2": "s2",
            "option": ["contradiction", "entailment", "neutral"],
            "label": "neutral"
        }),
    );

    assert_eq!(ex.gold, "C");
    assert_eq!(
        format_prompt(&spec, &[], &ex).text,
        "请判断以下两个维吾尔语句子之间的关系。\n句子1：s1\n句子2：s2\n选项：A. 矛盾 B. 蕴含 C. 中立 \n答案（只需提供选项字母，如A、B、C）："
    );
}

#[test]
fn test_classification_truncates_passage_and_lists_labels() {
    let mut spec = spec(BenchmarkTask::TextClassification, Language::Bo, PromptLang::En);
    spec.max_passage_len = Some(5);
    let ex = example(&spec, json!({"id": 3, "text": "abcdefghij", "label": "体育"}));

    assert_eq!(ex.gold, "Sports");
    assert_eq!(
        format_prompt(&spec, &[], &ex).text,
        "Please classify the following Tibetan text.\nText: abcde\nCandidate categories: Sports, Health, Geography, Entertainment, Politics, Travel, Technology\nCategory: "
    );
}

#[test]
fn test_metadata_language_overrides_eval_language() {
    let spec = spec(BenchmarkTask::MinorityCultureQa, Language::Bo, PromptLang::Zh);
    let ex = example(
        &spec,
        json!({"id": 1, "question": "q", "answer": "a", "metadata": {"language": "ug"}}),
    );

    assert_eq!(format_prompt(&spec, &[], &ex).text, "请回答以下维吾尔语问题。\n问题：q\n答案：");
}

#[test]
fn test_professional_question_carries_domain() {
    let spec = spec(BenchmarkTask::GeneralDomainCompetence, Language::Mn, PromptLang::Zh);
    let ex = example(
        &spec,
        json!({
            "id": 9,
            "question": "q",
            "options": ["x", "y"],
            "answer": "A",
            "task": {"domain": "医学", "sub_domain": "药理"}
        }),
    );

    let text = format_prompt(&spec, &[], &ex).text;
    assert!(text.starts_with("请回答以下蒙古语专业知识问题（领域：医学，子领域：药理），选择正确的选项。\n"));
    assert!(text.ends_with("选项：A. x B. y \n答案（只需提供选项字母，如A、B、C等）："));
}

#[test]
fn test_multi_choice_domain_question_uses_multi_cue() {
    let spec = spec(BenchmarkTask::MinorityDomainCompetence, Language::Bo, PromptLang::En);
    let ex = example(
        &spec,
        json!({"id": 1, "question": "q", "options": ["a", "b", "c"], "answer": "AC", "metadata": {"type": "Multiple Choice"}}),
    );

    let text = format_prompt(&spec, &[], &ex).text;
    assert!(text.contains("multiple-choice question"));
    assert!(text.ends_with("Answer (provide all correct option letters, e.g. A, BC, ABC, etc.): "));
}

// ===== Translation =====

#[test]
fn test_translation_into_mongolian_adds_script_note() {
    let mut spec = spec(BenchmarkTask::MinorityMachineTranslation, Language::Mn, PromptLang::Zh);
    spec.src_lang = Some(Language::Zh);
    spec.tgt_lang = Some(Language::Mn);
    let ex = example(&spec, json!({"id": 1, "zh": "你好", "mn": "ᠰᠠᠶᠢᠨ"}));

    assert_eq!(ex.gold, "ᠰᠠᠶᠢᠨ");
    assert_eq!(
        format_prompt(&spec, &[], &ex).text,
        "请将下面的汉语文本翻译成蒙古语。请使用传统蒙古文(竖写蒙古文)进行翻译。\n汉语：你好\n蒙古语："
    );
}

#[test]
fn test_translation_into_chinese_has_no_note() {
    let mut spec = spec(BenchmarkTask::MinorityMachineTranslation, Language::Mn, PromptLang::En);
    spec.src_lang = Some(Language::Mn);
    spec.tgt_lang = Some(Language::Zh);
    let ex = example(&spec, json!({"id": 1, "zh": "你好", "mn": "ᠰᠠᠶᠢᠨ"}));

    assert_eq!(
        format_prompt(&spec, &[], &ex).text,
        "Please translate the following Mongolian text into Chinese. \nMongolian: ᠰᠠᠶᠢᠨ\nChinese: "
    );
}

// ===== Exemplars =====

#[test]
fn test_exemplars_prefix_in_file_order() {
    let mut spec = spec(BenchmarkTask::MathReasoning, Language::Bo, PromptLang::Zh);
    spec.exemplar_file = Some(PathBuf::from("shots.json"));
    spec.num_exemplar = 2;
    let shots: Vec<Example> = (1..=3)
        .map(|i| example(&spec, json!({"id": i, "question": format!("e{}", i), "answer": i.to_string()})))
        .collect();
    let target = example(&spec, json!({"id": 10, "question": "t", "answer": "0"}));

    let block = |q: &str| format!("解决以下藏语数学问题，并只提供最终的数字答案。\n问题：{}\n答案：", q);
    let expected = format!("{}1\n\n{}2\n\n{}", block("e1"), block("e2"), block("t"));

    let formatter = PromptFormatter::new(&spec, &shots);
    assert_eq!(formatter.format(&target).text, expected);
}

#[test]
fn test_exemplars_ignored_without_exemplar_file() {
    let mut spec = spec(BenchmarkTask::MathReasoning, Language::Bo, PromptLang::Zh);
    spec.num_exemplar = 3;
    let shot = example(&spec, json!({"id": 1, "question": "e", "answer": "1"}));
    let target = example(&spec, json!({"id": 2, "question": "t", "answer": "2"}));

    let text = format_prompt(&spec, &[shot], &target).text;
    assert!(text.starts_with("解决以下藏语数学问题"));
    assert!(!text.contains("问题：e"));
}

#[test]
fn test_prompt_is_deterministic() {
    let spec = spec(BenchmarkTask::ServiceSafetyEvaluation, Language::Ug, PromptLang::En);
    let ex = example(&spec, json!({"id": 1, "question": "q", "options": ["a", "b"], "answer": "B"}));

    assert_eq!(format_prompt(&spec, &[], &ex), format_prompt(&spec, &[], &ex));
}
