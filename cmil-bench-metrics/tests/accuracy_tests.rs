use cmil_bench_core::TaskKind;
use cmil_bench_metrics::calculators::{normalize_choice, AccuracyCalculator, ComparisonMode};
use rstest::rstest;

// ===== Choice Letter Tests =====

#[rstest]
#[case("BA", "AB", true)]
#[case("A, C", "CA", true)]
#[case("a", "A", true)]
#[case("A", "AB", false)]
#[case("B", "A", false)]
#[case("", "A", false)]
fn test_choice_letters(#[case] predicted: &str, #[case] gold: &str, #[case] expected: bool) {
    let calculator = AccuracyCalculator::new(ComparisonMode::ChoiceLetters);
    assert_eq!(calculator.is_correct(predicted, gold), expected);
}

#[test]
fn test_empty_gold_never_matches() {
    let calculator = AccuracyCalculator::new(ComparisonMode::ChoiceLetters);
    assert!(!calculator.is_correct("", ""));
}

#[test]
fn test_normalize_choice_dedups_and_sorts() {
    assert_eq!(normalize_choice("C、A、C"), "AC");
    assert_eq!(normalize_choice("d b"), "BD");
}

// ===== Numeric Tests =====

#[rstest]
#[case("3.0000001", "3", true)]
#[case("3", "3.0", true)]
#[case("3.1", "3", false)]
#[case("abc", "abc", true)]
#[case("12", "twelve", false)]
fn test_numeric(#[case] predicted: &str, #[case] gold: &str, #[case] expected: bool) {
    let calculator = AccuracyCalculator::new(ComparisonMode::Numeric);
    assert_eq!(calculator.is_correct(predicted, gold), expected);
}

// ===== Mode Selection =====

#[rstest]
#[case(TaskKind::Safety, ComparisonMode::ChoiceLetters)]
#[case(TaskKind::EthnicDomainKnowledge, ComparisonMode::ChoiceLetters)]
#[case(TaskKind::MathReasoning, ComparisonMode::Numeric)]
#[case(TaskKind::TextClassification, ComparisonMode::CaseInsensitive)]
#[case(TaskKind::ReadingComprehension, ComparisonMode::ExactMatch)]
fn test_mode_for_task(#[case] kind: TaskKind, #[case] mode: ComparisonMode) {
    assert_eq!(ComparisonMode::for_task(kind), mode);
}

#[test]
fn test_classification_ignores_case() {
    let calculator = AccuracyCalculator::for_task(TaskKind::TextClassification);
    assert!(calculator.is_correct("sports ", "Sports"));
    assert!(calculator.is_correct("体育", "体育"));
}

// ===== Exact Match =====

#[test]
fn test_exact_match_trims_both_sides() {
    let calculator = AccuracyCalculator::new(ComparisonMode::ExactMatch);
    assert!(calculator.is_correct("hello", " hello "));
    assert!(!calculator.is_correct("hello", "Hello"));
}
