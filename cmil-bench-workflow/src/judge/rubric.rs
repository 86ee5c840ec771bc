//! Chinese grading rubrics for judged tasks and parsing of judge replies.

use cmil_bench_core::{CoreError, Language, Prompt, Result, TaskKind};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

const SCORING_CRITERIA: &str = "评分标准（1-5分）：
- 5分：优秀 - 完全符合要求，表现卓越
- 4分：良好 - 基本符合要求，表现较好，有轻微不足
- 3分：一般 - 部分符合要求，表现中等，有明显不足
- 2分：较差 - 少部分符合要求，表现不佳，问题较多
- 1分：很差 - 不符合要求，表现很差，问题严重";

pub const LANGUAGE_USAGE: &str = "语言使用准确性";

/// Culture QA dimensions with their headline and criterion.
const CULTURE_DIMENSIONS: [(&str, &str, &str); 5] = [
    ("知识准确性", "文化知识是否准确", "评估回答中文化知识点的准确性和可靠性"),
    ("文化理解深度", "对文化内涵的理解程度", "评估对文化背景、内涵和意义的深入理解"),
    ("语言表达适切性", "语言使用是否得体", "评估语言表达是否符合文化语境和表达习惯"),
    ("内容完整性", "回答是否全面完整", "评估回答的完整性和全面性"),
    ("内部视角真实性", "是否体现该文化的内部视角", "评估是否真实反映了该文化群体的内部观点和认知"),
];

fn dimension_definition(dimension: &str) -> Option<&'static str> {
    let definition = match dimension {
        "事实正确性" => "回答中提供的信息是否准确无误，是否基于可信的事实和数据",
        "满足用户需求" => "回答是否满足了用户提出问题的目的和需求，是否对问题进行了全面而恰当的回应",
        "清晰度" => "回答是否表达清晰、易懂，是否使用了简洁的语言和结构，以便用户可以轻松理解",
        "完备性" => "回答是否提供了足够的信息和细节，以满足用户的需求，是否遗漏了重要的方面",
        "创造性" => "回答是否具有创新性或独特性，是否提供了新颖的见解或解决方法",
        "逻辑连贯性" => "回答是否在整体上保持一致，是否在不同部分之间保持逻辑连贯性，避免了自相矛盾",
        "公平与可负责程度" => "回答是否考虑了不同观点和立场，是否提供了公正的信息或建议，不携带私人的观点或者偏见，不偏袒某一方，提供的建议或信息是否可行，是否负有一定的责任，是否考虑了潜在风险和后果",
        "丰富度" => "回答包含丰富的信息、深度、上下文考虑、多样性、详细解释和实例，以满足用户需求并提供全面理解",
        _ => return None,
    };
    Some(definition)
}

fn language_usage_definition(language: Language) -> String {
    format!(
        "评估回答是否使用了正确的目标语言（{}），是否存在语言混用或使用错误语言的情况",
        language.chinese_name()
    )
}

/// Answer type of an instruction QA item, chosen by its subcategory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerType {
    FactExplanation,
    LogicalReasoning,
    Generation,
    Advice,
}

impl AnswerType {
    /// Unknown or missing subcategories grade as generation.
    pub fn from_subcategory(subcategory: Option<&str>) -> Self {
        match subcategory.map(str::trim) {
            Some("观点表达" | "寻求建议") => AnswerType::Advice,
            Some(
                "翻译" | "实用文体写作" | "创意文体写作" | "专业文体写作" | "其他写作类" | "现实生活类" | "游戏娱乐类"
                | "功能类" | "现实名人类" | "（虚拟）恋爱类",
            ) => AnswerType::Generation,
            Some("证明" | "推理" | "初等数学" | "高等数学" | "应用数学") => AnswerType::LogicalReasoning,
            Some(
                "常识知识" | "阅读理解" | "文本分类" | "信息抽取" | "字词理解" | "文化理解" | "物理" | "化学" | "计算机"
                | "生物医学" | "经济" | "天文" | "历史" | "音乐" | "法律" | "体育" | "地理" | "文学" | "其他",
            ) => AnswerType::FactExplanation,
            _ => AnswerType::Generation,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnswerType::FactExplanation => "事实与解释型回答",
            AnswerType::LogicalReasoning => "逻辑推理型回答",
            AnswerType::Generation => "生成型回答",
            AnswerType::Advice => "建议型回答",
        }
    }

    fn dimensions(&self) -> &'static [&'static str] {
        match self {
            AnswerType::FactExplanation => &["事实正确性", "满足用户需求", "清晰度", "完备性"],
            AnswerType::LogicalReasoning => &["事实正确性", "满足用户需求", "逻辑连贯性", "完备性"],
            AnswerType::Generation => &["事实正确性", "满足用户需求", "逻辑连贯性", "创造性", "丰富度"],
            AnswerType::Advice => &["事实正确性", "满足用户需求", "公平与可负责程度", "创造性"],
        }
    }
}

/// Graded dimensions, in prompt order; language usage is always last.
pub fn judge_dimensions(kind: TaskKind, subcategory: Option<&str>) -> Vec<&'static str> {
    let mut dimensions: Vec<&'static str> = match kind {
        TaskKind::TraditionalCulture => CULTURE_DIMENSIONS.iter().map(|(name, _, _)| *name).collect(),
        _ => AnswerType::from_subcategory(subcategory).dimensions().to_vec(),
    };
    dimensions.push(LANGUAGE_USAGE);
    dimensions
}

/// One item to grade.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeInput<'a> {
    pub language: Language,
    pub question: &'a str,
    pub reference: &'a str,
    pub prediction: &'a str,
    pub subcategory: Option<&'a str>,
}

/// Builds the grading prompt of a judged task kind.
pub fn build_judge_prompt(kind: TaskKind, input: &JudgeInput<'_>) -> Result<Prompt> {
    let lang = input.language.chinese_name();
    let text = match kind {
        TaskKind::TraditionalCulture => {
            let mut lines: Vec<String> = CULTURE_DIMENSIONS
                .iter()
                .enumerate()
                .map(|(i, (name, headline, criterion))| format!("{}. {}（{}）：{}", i + 1, name, headline, criterion))
                .collect();
            lines.push(format!(
                "6. {}（是否使用正确的目标语言）：{}",
                LANGUAGE_USAGE,
                language_usage_definition(input.language)
            ));
            let format_lines = output_format(&judge_dimensions(kind, None));
            format!(
                "请你作为一个专业的{lang}传统文化专家，对以下模型回答进行全面评分。\n\n\
                 任务语言：{lang}\n\n\
                 问题：\n{question}\n\n\
                 参考答案：\n{reference}\n\n\
                 模型回答：\n{prediction}\n\n\
                 {criteria}\n\n\
                 请从以下6个维度对回答质量进行评分（每个维度1-5分）：\n\n\
                 {dimensions}\n\n\
                 请严格按照以下格式输出评分结果：\n\
                 {format_lines}\n\
                 分析总结：[简要分析回答在文化理解和知识表达方面的优缺点，100-200字]\n\
                 最终分数：[六个维度的平均分，保留两位小数]",
                lang = lang,
                question = input.question,
                reference = input.reference,
                prediction = input.prediction,
                criteria = SCORING_CRITERIA,
                dimensions = lines.join("\n"),
                format_lines = format_lines,
            )
        }
        TaskKind::TextGeneration => {
            let answer_type = AnswerType::from_subcategory(input.subcategory);
            let dimensions = judge_dimensions(kind, input.subcategory);
            let lines: Vec<String> = dimensions
                .iter()
                .enumerate()
                .map(|(i, dim)| {
                    let definition = dimension_definition(dim)
                        .map(str::to_string)
                        .unwrap_or_else(|| language_usage_definition(input.language));
                    format!("{}. {}：{}", i + 1, dim, definition)
                })
                .collect();
            format!(
                "请你作为一个专业的{lang}文本生成质量评估专家，对以下模型生成的文本进行全面评分。\n\n\
                 任务语言：{lang}\n\
                 子类别：{subcategory}\n\
                 评估类型：{answer_type}\n\n\
                 问题/提示：\n{question}\n\n\
                 参考答案：\n{reference}\n\n\
                 模型生成文本：\n{prediction}\n\n\
                 {criteria}\n\n\
                 请从以下{count}个维度对生成文本质量进行评分（每个维度1-5分）：\n\n\
                 {dimensions}\n\n\
                 请严格按照以下格式输出评分结果：\n\
                 {format_lines}\n\
                 分析总结：[简要分析生成文本的优缺点和质量特点，100-200字]\n\
                 最终分数：[{count}个维度的平均分，保留两位小数]",
                lang = lang,
                subcategory = input.subcategory.unwrap_or("未指定"),
                answer_type = answer_type.label(),
                question = input.question,
                reference = input.reference,
                prediction = input.prediction,
                criteria = SCORING_CRITERIA,
                count = dimensions.len(),
                dimensions = lines.join("\n"),
                format_lines = output_format(&dimensions),
            )
        }
        other => {
            return Err(CoreError::Validation(format!("task kind {} is not judged", other)));
        }
    };
    Ok(Prompt::new(text))
}

fn output_format(dimensions: &[&str]) -> String {
    dimensions
        .iter()
        .map(|dim| format!("{}：[1-5的数字]", dim))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parsed judge reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeVerdict {
    pub dimension_scores: BTreeMap<String, f64>,
    pub summary: String,
    pub final_score: Option<f64>,
}

impl JudgeVerdict {
    pub fn is_success(&self) -> bool {
        matches!(self.final_score, Some(s) if in_range(s))
    }
}

static SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)分析总结[：:]\s*(.+?)\s*(?:最终分数[：:]|$)").expect("valid regex"));
static FINAL_SCORE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"最终分数[：:]\s*\[?(\d+(?:\.\d+)?)\]?").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").expect("valid regex"));

fn in_range(score: f64) -> bool {
    (1.0..=5.0).contains(&score)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_matches(['[', ']']).parse().ok(),
        _ => None,
    }
}

fn parse_json_reply(reply: &str, dimensions: &[&str]) -> Option<JudgeVerdict> {
    let body = CODE_FENCE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map_or(reply, |m| m.as_str());
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(body) else {
        return None;
    };
    let scores = object
        .get("dimension_scores")
        .and_then(Value::as_object)
        .unwrap_or(&object);

    let mut verdict = JudgeVerdict::default();
    for dim in dimensions {
        if let Some(score) = scores.get(*dim).and_then(number).filter(|s| in_range(*s)) {
            verdict.dimension_scores.insert(dim.to_string(), score);
        }
    }
    verdict.summary = ["分析总结", "summary"]
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .trim()
        .to_string();
    verdict.final_score = ["最终分数", "final_score"]
        .iter()
        .find_map(|key| object.get(*key).and_then(number))
        .filter(|s| in_range(*s));
    Some(verdict)
}

fn parse_line_reply(reply: &str, dimensions: &[&str]) -> JudgeVerdict {
    let mut verdict = JudgeVerdict::default();
    for dim in dimensions {
        let pattern = format!(r"{}[：:]\s*\[?(\d+(?:\.\d+)?)\]?", regex::escape(dim));
        let Ok(re) = Regex::new(&pattern) else {
            continue;
        };
        let score = re
            .captures(reply)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|s| in_range(*s));
        if let Some(score) = score {
            verdict.dimension_scores.insert(dim.to_string(), score);
        }
    }
    if let Some(summary) = SUMMARY.captures(reply).and_then(|c| c.get(1)) {
        verdict.summary = WHITESPACE.replace_all(summary.as_str().trim(), " ").into_owned();
    }
    verdict.final_score = FINAL_SCORE
        .captures(reply)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|s| in_range(*s));
    verdict
}

/// Parses a judge reply, as a JSON object when it is one and line by line
/// otherwise.
///
/// Dimension scores outside 1–5 are dropped. Without a usable final score
/// the mean of the parsed dimensions is used.
pub fn parse_judge_reply(reply: &str, dimensions: &[&str]) -> JudgeVerdict {
    let reply = reply.trim();
    let mut verdict = parse_json_reply(reply, dimensions).unwrap_or_else(|| parse_line_reply(reply, dimensions));
    if verdict.final_score.is_none() && !verdict.dimension_scores.is_empty() {
        let sum: f64 = verdict.dimension_scores.values().sum();
        verdict.final_score = Some(round2(sum / verdict.dimension_scores.len() as f64));
    }
    verdict
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subcategory_answer_types() {
        assert_eq!(AnswerType::from_subcategory(Some("寻求建议")), AnswerType::Advice);
        assert_eq!(AnswerType::from_subcategory(Some("高等数学")), AnswerType::LogicalReasoning);
        assert_eq!(AnswerType::from_subcategory(Some("历史")), AnswerType::FactExplanation);
        assert_eq!(AnswerType::from_subcategory(Some("未知类别")), AnswerType::Generation);
        assert_eq!(AnswerType::from_subcategory(None), AnswerType::Generation);
    }

    #[test]
    fn test_language_usage_is_always_last() {
        let dims = judge_dimensions(TaskKind::TextGeneration, Some("推理"));
        assert_eq!(dims, vec!["事实正确性", "满足用户需求", "逻辑连贯性", "完备性", LANGUAGE_USAGE]);
        assert_eq!(judge_dimensions(TaskKind::TraditionalCulture, None).len(), 6);
    }

    #[test]
    fn test_non_judged_kind_is_rejected() {
        let input = JudgeInput {
            language: Language::Bo,
            question: "q",
            reference: "r",
            prediction: "p",
            subcategory: None,
        };
        assert!(build_judge_prompt(TaskKind::MathReasoning, &input).is_err());
    }

    #[test]
    fn test_out_of_range_dimension_dropped_and_mean_used() {
        let dims = ["事实正确性", "满足用户需求", LANGUAGE_USAGE];
        let verdict = parse_judge_reply("事实正确性：4\n满足用户需求：[9]\n语言使用准确性：3\n分析总结：尚可", &dims);
        assert_eq!(verdict.dimension_scores.len(), 2);
        assert_eq!(verdict.final_score, Some(3.5));
        assert_eq!(verdict.summary, "尚可");
    }

    #[test]
    fn test_json_reply() {
        let dims = ["知识准确性", LANGUAGE_USAGE];
        let reply = "```json\n{\"知识准确性\": 5, \"语言使用准确性\": \"4\", \"分析总结\": \"好\", \"最终分数\": 4.5}\n```";
        let verdict = parse_judge_reply(reply, &dims);
        assert_eq!(verdict.final_score, Some(4.5));
        assert_eq!(verdict.dimension_scores["语言使用准确性"], 4.0);
        assert!(verdict.is_success());
    }

    #[test]
    fn test_unparseable_reply_fails() {
        let verdict = parse_judge_reply("I cannot grade this.", &["知识准确性"]);
        assert_eq!(verdict.final_score, None);
        assert!(!verdict.is_success());
    }
}
