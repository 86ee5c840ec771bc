use cmil_bench_core::*;
use cmil_bench_workflow::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ===== Helpers =====

fn seed_datasets(root: &Path, tasks: &[BenchmarkTask], langs: &[Language]) {
    for &task in tasks {
        for &lang in langs {
            let path = dataset_path(root, task, lang);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "[]").unwrap();
        }
    }
}

fn catalog(dir: &TempDir) -> TaskCatalog {
    TaskCatalog::new(CatalogConfig::new(
        dir.path().join("data"),
        dir.path().join("out"),
        "qwen-7b",
    ))
}

// ===== Expansion =====

#[test]
fn test_expand_orders_languages_then_tasks() {
    let dir = TempDir::new().unwrap();
    seed_datasets(
        &dir.path().join("data"),
        &[BenchmarkTask::CoreferenceResolution, BenchmarkTask::MathReasoning],
        &[Language::Bo, Language::Ug],
    );
    let selection = CatalogSelection {
        languages: vec![Language::Ug, Language::Bo],
        tasks: vec![BenchmarkTask::MathReasoning, BenchmarkTask::CoreferenceResolution],
    };

    let specs = catalog(&dir).expand(&selection).unwrap();

    let labels: Vec<String> = specs.iter().map(TaskSpec::label).collect();
    assert_eq!(
        labels,
        vec![
            "Coreference_Resolution/ug",
            "Math_Reasoning/ug",
            "Coreference_Resolution/bo",
            "Math_Reasoning/bo",
        ]
    );
    assert_eq!(
        specs[1].output_file,
        dir.path().join("out/qwen-7b/Math_Reasoning/ug/zh-prompt_test.jsonl")
    );
    assert_eq!(specs[1].max_new_tokens, 200);
    assert_eq!(specs[0].max_new_tokens, 50);
}

#[test]
fn test_translation_expands_both_directions() {
    let dir = TempDir::new().unwrap();
    seed_datasets(
        &dir.path().join("data"),
        &[BenchmarkTask::MinorityMachineTranslation],
        &[Language::Mn],
    );
    let selection = CatalogSelection {
        languages: vec![Language::Mn],
        tasks: vec![BenchmarkTask::MinorityMachineTranslation],
    };

    let specs = catalog(&dir).expand(&selection).unwrap();

    assert_eq!(specs.len(), 2);
    assert_eq!((specs[0].src_lang, specs[0].tgt_lang), (Some(Language::Zh), Some(Language::Mn)));
    assert_eq!((specs[1].src_lang, specs[1].tgt_lang), (Some(Language::Mn), Some(Language::Zh)));
    assert!(specs[0].output_file.ends_with("zh-prompt_zh2mn_test.jsonl"));
    assert!(specs[1].output_file.ends_with("zh-prompt_mn2zh_test.jsonl"));
    assert_eq!(specs[0].input_file, specs[1].input_file);
    assert_eq!(specs[0].max_new_tokens, 300);
}

#[test]
fn test_classification_gets_passage_limit() {
    let dir = TempDir::new().unwrap();
    seed_datasets(&dir.path().join("data"), &[BenchmarkTask::TextClassification], &[Language::Bo]);
    let selection = CatalogSelection {
        languages: vec![Language::Bo],
        tasks: vec![BenchmarkTask::TextClassification],
    };

    let specs = catalog(&dir).expand(&selection).unwrap();

    assert_eq!(specs[0].max_passage_len, Some(CLASSIFICATION_MAX_PASSAGE_LEN));
}

#[test]
fn test_missing_dataset_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let selection = CatalogSelection {
        languages: vec![Language::Bo],
        tasks: vec![BenchmarkTask::MathReasoning],
    };

    let err = catalog(&dir).expand(&selection).unwrap_err();

    assert!(matches!(err, CoreError::Config(msg) if msg.contains("dataset file not found")));
}

#[test]
fn test_skip_missing_drops_absent_tasks() {
    let dir = TempDir::new().unwrap();
    seed_datasets(&dir.path().join("data"), &[BenchmarkTask::MathReasoning], &[Language::Bo]);
    let config = CatalogConfig::new(dir.path().join("data"), dir.path().join("out"), "m").with_skip_missing(true);
    let selection = CatalogSelection {
        languages: vec![Language::Bo],
        tasks: vec![BenchmarkTask::MathReasoning, BenchmarkTask::TextClassification],
    };

    let specs = TaskCatalog::new(config).expand(&selection).unwrap();

    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].task, BenchmarkTask::MathReasoning);
}

#[test]
fn test_exemplar_root_sets_exemplar_files() {
    let dir = TempDir::new().unwrap();
    seed_datasets(&dir.path().join("data"), &[BenchmarkTask::MathReasoning], &[Language::Ug]);
    let config = CatalogConfig::new(dir.path().join("data"), dir.path().join("out"), "m")
        .with_exemplar_root(dir.path().join("dev"))
        .with_num_exemplar(2);
    let selection = CatalogSelection {
        languages: vec![Language::Ug],
        tasks: vec![BenchmarkTask::MathReasoning],
    };

    let specs = TaskCatalog::new(config).expand(&selection).unwrap();

    assert_eq!(
        specs[0].exemplar_file,
        Some(dir.path().join("dev/Foundation_Tasks/Math_Reasoning/ug.json"))
    );
    assert_eq!(specs[0].num_exemplar, 2);
}

#[test]
fn test_duplicate_output_paths_rejected() {
    let spec = TaskSpec {
        task: BenchmarkTask::MathReasoning,
        eval_lang: Language::Bo,
        prompt_lang: PromptLang::Zh,
        input_file: PathBuf::from("a.json"),
        output_file: PathBuf::from("out/same.jsonl"),
        exemplar_file: None,
        num_exemplar: 0,
        max_passage_len: None,
        src_lang: None,
        tgt_lang: None,
        max_new_tokens: 200,
    };

    let err = validate_specs(&[spec.clone(), spec]).unwrap_err();

    assert!(matches!(err, CoreError::Config(msg) if msg.contains("duplicate output path")));
}

// ===== Task Lists =====

#[tokio::test]
async fn test_task_list_written_then_loaded() {
    let dir = TempDir::new().unwrap();
    seed_datasets(
        &dir.path().join("data"),
        &[BenchmarkTask::MathReasoning, BenchmarkTask::MinorityMachineTranslation],
        &[Language::Bo],
    );
    let specs = catalog(&dir).expand(&CatalogSelection {
        languages: vec![Language::Bo],
        tasks: vec![BenchmarkTask::MathReasoning, BenchmarkTask::MinorityMachineTranslation],
    })
    .unwrap();
    let list = dir.path().join("tasks.json");

    write_task_list(&list, &specs).await.unwrap();
    let loaded = load_task_list(&list).await.unwrap();

    assert_eq!(loaded, specs);
}

#[tokio::test]
async fn test_hand_written_task_list_fills_token_budget() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bo.json");
    std::fs::write(&input, "[]").unwrap();
    let list = dir.path().join("tasks.json");
    std::fs::write(
        &list,
        serde_json::json!([{
            "task": "math_reasoning",
            "eval_lang": "bo",
            "prompt_lang": "en",
            "input_file": input,
            "output_file": dir.path().join("out.jsonl"),
        }])
        .to_string(),
    )
    .unwrap();

    let specs = load_task_list(&list).await.unwrap();

    assert_eq!(specs[0].task, BenchmarkTask::MathReasoning);
    assert_eq!(specs[0].prompt_lang, PromptLang::En);
    assert_eq!(specs[0].max_new_tokens, 200);
}

#[tokio::test]
async fn test_task_list_with_missing_input_fails() {
    let dir = TempDir::new().unwrap();
    let list = dir.path().join("tasks.json");
    std::fs::write(
        &list,
        serde_json::json!([{
            "task": "Math_Reasoning",
            "eval_lang": "bo",
            "prompt_lang": "zh",
            "input_file": dir.path().join("absent.json"),
            "output_file": dir.path().join("out.jsonl"),
        }])
        .to_string(),
    )
    .unwrap();

    assert!(matches!(load_task_list(&list).await, Err(CoreError::Config(_))));
}

// ===== Properties =====

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_output_paths_unique(
        task_mask in proptest::collection::vec(any::<bool>(), BenchmarkTask::ALL.len()),
        lang_mask in proptest::collection::vec(any::<bool>(), Language::EVALUATED.len()),
    ) {
        let tasks: Vec<BenchmarkTask> = BenchmarkTask::ALL
            .iter()
            .zip(&task_mask)
            .filter(|(_, on)| **on)
            .map(|(t, _)| *t)
            .collect();
        let languages: Vec<Language> = Language::EVALUATED
            .iter()
            .zip(&lang_mask)
            .filter(|(_, on)| **on)
            .map(|(l, _)| *l)
            .collect();

        let dir = TempDir::new().unwrap();
        seed_datasets(&dir.path().join("data"), &tasks, &languages);
        let specs = catalog(&dir).expand(&CatalogSelection { languages: languages.clone(), tasks: tasks.clone() }).unwrap();

        let per_lang: usize = tasks
            .iter()
            .map(|t| if t.kind() == TaskKind::Translation { 2 } else { 1 })
            .sum();
        prop_assert_eq!(specs.len(), per_lang * languages.len());
        let unique: HashSet<&PathBuf> = specs.iter().map(|s| &s.output_file).collect();
        prop_assert_eq!(unique.len(), specs.len());
    }
}
