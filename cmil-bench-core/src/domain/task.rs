use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

use super::language::Language;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskCategory {
    #[serde(rename = "Foundation_Tasks")]
    Foundation,
    #[serde(rename = "Chinese_Minority_Knowledge_Tasks")]
    MinorityKnowledge,
    #[serde(rename = "Safety_Alignment_Tasks")]
    SafetyAlignment,
}

impl TaskCategory {
    pub fn dir_name(&self) -> &'static str {
        match self {
            TaskCategory::Foundation => "Foundation_Tasks",
            TaskCategory::MinorityKnowledge => "Chinese_Minority_Knowledge_Tasks",
            TaskCategory::SafetyAlignment => "Safety_Alignment_Tasks",
        }
    }
}

/// Prompting and extraction family of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CorefResolution,
    ProfessionalSkills,
    ReadingComprehension,
    MathReasoning,
    Entailment,
    TextClassification,
    TraditionalCulture,
    EthnicDomainKnowledge,
    EthnicVocabulary,
    TextGeneration,
    EthnicLanguageUnderstanding,
    Translation,
    Safety,
}

/// How a raw generation is reduced to a comparable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerFormat {
    Choice,
    Category,
    Numeric,
    FreeText,
    Translation,
}

impl TaskKind {
    pub fn answer_format(&self) -> AnswerFormat {
        match self {
            TaskKind::CorefResolution
            | TaskKind::ProfessionalSkills
            | TaskKind::Entailment
            | TaskKind::EthnicDomainKnowledge
            | TaskKind::EthnicVocabulary
            | TaskKind::EthnicLanguageUnderstanding
            | TaskKind::Safety => AnswerFormat::Choice,
            TaskKind::TextClassification => AnswerFormat::Category,
            TaskKind::MathReasoning => AnswerFormat::Numeric,
            TaskKind::ReadingComprehension
            | TaskKind::TraditionalCulture
            | TaskKind::TextGeneration => AnswerFormat::FreeText,
            TaskKind::Translation => AnswerFormat::Translation,
        }
    }

    /// Answers are graded by an external judge model.
    pub fn is_judged(&self) -> bool {
        matches!(self, TaskKind::TraditionalCulture | TaskKind::TextGeneration)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::CorefResolution => "coref_resolution",
            TaskKind::ProfessionalSkills => "professional_skills",
            TaskKind::ReadingComprehension => "reading_comprehension",
            TaskKind::MathReasoning => "math_reasoning",
            TaskKind::Entailment => "entailment",
            TaskKind::TextClassification => "text_classification",
            TaskKind::TraditionalCulture => "traditional_culture",
            TaskKind::EthnicDomainKnowledge => "ethnic_domain_knowledge",
            TaskKind::EthnicVocabulary => "ethnic_vocabulary",
            TaskKind::TextGeneration => "text_generation",
            TaskKind::EthnicLanguageUnderstanding => "ethnic_language_understanding",
            TaskKind::Translation => "translation",
            TaskKind::Safety => "safety",
        };
        f.write_str(name)
    }
}

/// The seventeen benchmark task directories, in catalog declaration order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BenchmarkTask {
    #[serde(rename = "Coreference_Resolution")]
    CoreferenceResolution,
    #[serde(rename = "General_Domain_Competence")]
    GeneralDomainCompetence,
    #[serde(rename = "Machine_Reading_Comprehension")]
    MachineReadingComprehension,
    #[serde(rename = "Math_Reasoning")]
    MathReasoning,
    #[serde(rename = "Natural_Language_Inference")]
    NaturalLanguageInference,
    #[serde(rename = "Text_Classification")]
    TextClassification,
    #[serde(rename = "Minority_Culture_QA")]
    MinorityCultureQa,
    #[serde(rename = "Minority_Domain_Competence")]
    MinorityDomainCompetence,
    #[serde(rename = "Minority_Language_Expressions")]
    MinorityLanguageExpressions,
    #[serde(rename = "Minority_Language_Instruction_QA")]
    MinorityLanguageInstructionQa,
    #[serde(rename = "Minority_Language_Understanding")]
    MinorityLanguageUnderstanding,
    #[serde(rename = "Minority_Machine_Translation")]
    MinorityMachineTranslation,
    #[serde(rename = "Commercial_Compliance_Check")]
    CommercialComplianceCheck,
    #[serde(rename = "Discrimination_Detection")]
    DiscriminationDetection,
    #[serde(rename = "Rights_Protection_Evaluation")]
    RightsProtectionEvaluation,
    #[serde(rename = "Service_Safety_Evaluation")]
    ServiceSafetyEvaluation,
    #[serde(rename = "Value_Alignment_Assessment")]
    ValueAlignmentAssessment,
}

/// Token budget for tasks a catalog does not know about.
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 512;

/// Passage limit applied to text classification inputs.
pub const CLASSIFICATION_MAX_PASSAGE_LEN: usize = 512;

impl BenchmarkTask {
    pub const ALL: [BenchmarkTask; 17] = [
        BenchmarkTask::CoreferenceResolution,
        BenchmarkTask::GeneralDomainCompetence,
        BenchmarkTask::MachineReadingComprehension,
        BenchmarkTask::MathReasoning,
        BenchmarkTask::NaturalLanguageInference,
        BenchmarkTask::TextClassification,
        BenchmarkTask::MinorityCultureQa,
        BenchmarkTask::MinorityDomainCompetence,
        BenchmarkTask::MinorityLanguageExpressions,
        BenchmarkTask::MinorityLanguageInstructionQa,
        BenchmarkTask::MinorityLanguageUnderstanding,
        BenchmarkTask::MinorityMachineTranslation,
        BenchmarkTask::CommercialComplianceCheck,
        BenchmarkTask::DiscriminationDetection,
        BenchmarkTask::RightsProtectionEvaluation,
        BenchmarkTask::ServiceSafetyEvaluation,
        BenchmarkTask::ValueAlignmentAssessment,
    ];

    pub fn dir_name(&self) -> &'static str {
        match self {
            BenchmarkTask::CoreferenceResolution => "Coreference_Resolution",
            BenchmarkTask::GeneralDomainCompetence => "General_Domain_Competence",
            BenchmarkTask::MachineReadingComprehension => "Machine_Reading_Comprehension",
            BenchmarkTask::MathReasoning => "Math_Reasoning",
            BenchmarkTask::NaturalLanguageInference => "Natural_Language_Inference",
            BenchmarkTask::TextClassification => "Text_Classification",
            BenchmarkTask::MinorityCultureQa => "Minority_Culture_QA",
            BenchmarkTask::MinorityDomainCompetence => "Minority_Domain_Competence",
            BenchmarkTask::MinorityLanguageExpressions => "Minority_Language_Expressions",
            BenchmarkTask::MinorityLanguageInstructionQa => "Minority_Language_Instruction_QA",
            BenchmarkTask::MinorityLanguageUnderstanding => "Minority_Language_Understanding",
            BenchmarkTask::MinorityMachineTranslation => "Minority_Machine_Translation",
            BenchmarkTask::CommercialComplianceCheck => "Commercial_Compliance_Check",
            BenchmarkTask::DiscriminationDetection => "Discrimination_Detection",
            BenchmarkTask::RightsProtectionEvaluation => "Rights_Protection_Evaluation",
            BenchmarkTask::ServiceSafetyEvaluation => "Service_Safety_Evaluation",
            BenchmarkTask::ValueAlignmentAssessment => "Value_Alignment_Assessment",
        }
    }

    pub fn category(&self) -> TaskCategory {
        use BenchmarkTask::*;
        match self {
            CoreferenceResolution
            | GeneralDomainCompetence
            | MachineReadingComprehension
            | MathReasoning
            | NaturalLanguageInference
            | TextClassification => TaskCategory::Foundation,
            MinorityCultureQa
            | MinorityDomainCompetence
            | MinorityLanguageExpressions
            | MinorityLanguageInstructionQa
            | MinorityLanguageUnderstanding
            | MinorityMachineTranslation => TaskCategory::MinorityKnowledge,
            CommercialComplianceCheck
            | DiscriminationDetection
            | RightsProtectionEvaluation
            | ServiceSafetyEvaluation
            | ValueAlignmentAssessment => TaskCategory::SafetyAlignment,
        }
    }

    pub fn kind(&self) -> TaskKind {
        use BenchmarkTask::*;
        match self {
            CoreferenceResolution => TaskKind::CorefResolution,
            GeneralDomainCompetence => TaskKind::ProfessionalSkills,
            MachineReadingComprehension => TaskKind::ReadingComprehension,
            MathReasoning => TaskKind::MathReasoning,
            NaturalLanguageInference => TaskKind::Entailment,
            TextClassification => TaskKind::TextClassification,
            MinorityCultureQa => TaskKind::TraditionalCulture,
            MinorityDomainCompetence => TaskKind::EthnicDomainKnowledge,
            MinorityLanguageExpressions => TaskKind::EthnicVocabulary,
            MinorityLanguageInstructionQa => TaskKind::TextGeneration,
            MinorityLanguageUnderstanding => TaskKind::EthnicLanguageUnderstanding,
            MinorityMachineTranslation => TaskKind::Translation,
            CommercialComplianceCheck
            | DiscriminationDetection
            | RightsProtectionEvaluation
            | ServiceSafetyEvaluation
            | ValueAlignmentAssessment => TaskKind::Safety,
        }
    }

    pub fn default_max_new_tokens(&self) -> u32 {
        match self.kind() {
            TaskKind::CorefResolution | TaskKind::Entailment => 50,
            TaskKind::TextClassification => 100,
            TaskKind::ReadingComprehension
            | TaskKind::MathReasoning
            | TaskKind::TraditionalCulture => 200,
            TaskKind::Translation => 300,
            TaskKind::TextGeneration => 1000,
            TaskKind::ProfessionalSkills
            | TaskKind::EthnicDomainKnowledge
            | TaskKind::EthnicVocabulary
            | TaskKind::EthnicLanguageUnderstanding
            | TaskKind::Safety => 20,
        }
    }

    pub fn default_max_passage_len(&self) -> Option<usize> {
        match self {
            BenchmarkTask::TextClassification => Some(CLASSIFICATION_MAX_PASSAGE_LEN),
            _ => None,
        }
    }

    /// Metric used for ranking this task. Translation depends on direction.
    pub fn primary_metric(&self, direction: Option<TranslationDirection>) -> MetricName {
        match self.kind() {
            TaskKind::Translation => match direction {
                Some(TranslationDirection::ToChinese) => MetricName::Bleu,
                _ => MetricName::ChrfPlusPlus,
            },
            TaskKind::ReadingComprehension => MetricName::RougeL,
            TaskKind::TraditionalCulture | TaskKind::TextGeneration => MetricName::LlmScore,
            _ => MetricName::Accuracy,
        }
    }
}

impl fmt::Display for BenchmarkTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for BenchmarkTask {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        BenchmarkTask::ALL
            .iter()
            .copied()
            .find(|t| t.dir_name().eq_ignore_ascii_case(needle) || t.kind().to_string() == needle)
            .ok_or_else(|| CoreError::Config(format!("unknown task: {}", needle)))
    }
}

/// Direction of a translation file relative to Chinese.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TranslationDirection {
    /// zh → minority language
    FromChinese,
    /// minority language → zh
    ToChinese,
}

impl TranslationDirection {
    pub fn between(src: Language, tgt: Language) -> Option<Self> {
        match (src, tgt) {
            (Language::Zh, t) if t != Language::Zh => Some(TranslationDirection::FromChinese),
            (s, Language::Zh) if s != Language::Zh => Some(TranslationDirection::ToChinese),
            _ => None,
        }
    }

    /// Reads the direction from a result file name such as
    /// `zh-prompt_zh2bo_test.jsonl`.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.contains("_zh2") {
            Some(TranslationDirection::FromChinese)
        } else if name.contains("2zh_") || name.contains("2zh.") {
            Some(TranslationDirection::ToChinese)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricName {
    #[serde(rename = "Accuracy")]
    Accuracy,
    #[serde(rename = "BLEU")]
    Bleu,
    #[serde(rename = "chrF++")]
    ChrfPlusPlus,
    #[serde(rename = "ROUGE-L")]
    RougeL,
    #[serde(rename = "LLM-Score")]
    LlmScore,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::Accuracy => "Accuracy",
            MetricName::Bleu => "BLEU",
            MetricName::ChrfPlusPlus => "chrF++",
            MetricName::RougeL => "ROUGE-L",
            MetricName::LlmScore => "LLM-Score",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
