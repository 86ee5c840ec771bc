//! Prompt formatter: renders the instruction template of a task kind in the
//! prompt language, optionally preceded by worked exemplars.

use cmil_bench_core::{
    language_label, option_letter, Example, Language, Prompt, PromptLang, TaskKind, TaskSpec,
    CLASSIFICATION_LABELS, ENTAILMENT_LABELS,
};

/// Whether a block is a worked exemplar (answer appended) or the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockRole {
    Exemplar,
    Target,
}

/// Instruction lines plus the answer cue that closes a block.
struct Block {
    lines: Vec<String>,
    cue: String,
}

impl Block {
    fn render(&self, out: &mut String) {
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&self.cue);
    }
}

/// Picks the Chinese or English text.
fn pick<'a>(pl: PromptLang, zh: &'a str, en: &'a str) -> &'a str {
    match pl {
        PromptLang::Zh => zh,
        PromptLang::En => en,
    }
}

/// `标签：value` or `Label: value`.
fn field(pl: PromptLang, zh: &str, en: &str, value: &str) -> String {
    match pl {
        PromptLang::Zh => format!("{}：{}", zh, value),
        PromptLang::En => format!("{}: {}", en, value),
    }
}

fn cue(pl: PromptLang, zh: &str, en: &str) -> String {
    pick(pl, zh, en).to_string()
}

/// Keeps the first `max_len` characters when a limit is set.
pub fn truncate_passage(text: &str, max_len: Option<usize>) -> String {
    match max_len {
        Some(n) => text.chars().take(n).collect(),
        None => text.to_string(),
    }
}

/// `A. opt B. opt ` with entailment labels localized.
pub fn render_options(options: &[String], kind: TaskKind, pl: PromptLang) -> String {
    options
        .iter()
        .enumerate()
        .map(|(i, opt)| {
            let text = match (kind, pl) {
                (TaskKind::Entailment, PromptLang::Zh) => ENTAILMENT_LABELS
                    .iter()
                    .find(|(en, _)| en.eq_ignore_ascii_case(opt))
                    .map(|(_, zh)| zh.to_string())
                    .unwrap_or_else(|| opt.clone()),
                _ => opt.clone(),
            };
            format!("{}. {} ", option_letter(i), text)
        })
        .collect()
}

fn is_multi_choice(example: &Example) -> bool {
    matches!(
        example.metadata_type().as_deref(),
        Some("Multiple Choice") | Some("多选题")
    )
}

/// Traditional-script reminder for Mongolian targets.
fn mongolian_note(kind: TaskKind, lang: Language, pl: PromptLang) -> &'static str {
    if lang != Language::Mn {
        return "";
    }
    match kind {
        TaskKind::Translation => pick(
            pl,
            "请使用传统蒙古文(竖写蒙古文)进行翻译。",
            "Please translate into traditional Mongolian script (vertical Mongolian script).",
        ),
        TaskKind::TraditionalCulture => pick(
            pl,
            "请使用传统蒙古语回答。",
            "Please answer in traditional Mongolian script.",
        ),
        TaskKind::TextGeneration => pick(
            pl,
            "请使用传统蒙古语。",
            "Please answer in traditional Mongolian script.",
        ),
        _ => "",
    }
}

fn domain_note(example: &Example, pl: PromptLang) -> String {
    match example.domain() {
        (Some(domain), Some(sub)) if !sub.is_empty() => match pl {
            PromptLang::Zh => format!("（领域：{}，子领域：{}）", domain, sub),
            PromptLang::En => format!(" (Domain: {}, Sub-domain: {})", domain, sub),
        },
        (Some(domain), _) => match pl {
            PromptLang::Zh => format!("（领域：{}）", domain),
            PromptLang::En => format!(" (Domain: {})", domain),
        },
        _ => String::new(),
    }
}

const LETTER_CUE_ZH: &str = "答案（只需提供选项字母，如A、B、C等）：";
const LETTER_CUE_EN: &str = "Answer (just provide the letter of the option, e.g. A, B, C, etc.): ";

fn build_block(spec: &TaskSpec, example: &Example, role: BlockRole) -> Block {
    let pl = spec.prompt_lang;
    let kind = spec.kind();
    let lang = language_label(example, spec.eval_lang, pl);
    let q = example.text_or_empty("question");
    let options = render_options(&example.options(), kind, pl);

    let question_with_options = |intro: String, cue_zh: &str, cue_en: &str| Block {
        lines: vec![
            intro,
            field(pl, "问题", "Question", &q),
            field(pl, "选项", "Options", &options),
        ],
        cue: cue(pl, cue_zh, cue_en),
    };

    match kind {
        TaskKind::EthnicDomainKnowledge => {
            if is_multi_choice(example) {
                question_with_options(
                    match pl {
                        PromptLang::Zh => format!("请回答以下{}民族领域知识多选题，选择所有正确的选项。", lang),
                        PromptLang::En => format!(
                            "Please answer the following {} ethnic domain knowledge multiple-choice question by selecting the correct options.",
                            lang
                        ),
                    },
                    "答案（只需提供所有正确选项字母，如A、BC、ABC等，不需要提供额外的解释）：",
                    "Answer (provide all correct option letters, e.g. A, BC, ABC, etc.): ",
                )
            } else {
                question_with_options(
                    match pl {
                        PromptLang::Zh => format!("请回答以下{}民族领域知识单选题，选择正确的选项。", lang),
                        PromptLang::En => format!(
                            "Please answer the following {} ethnic domain knowledge single-choice question by selecting the correct option.",
                            lang
                        ),
                    },
                    "答案（只需提供选项字母，如A、B、C等，不需要提供额外的解释）：",
                    LETTER_CUE_EN,
                )
            }
        }
        TaskKind::Translation => {
            let src = spec.src_lang.unwrap_or(Language::Zh);
            let tgt = spec.tgt_lang.unwrap_or(spec.eval_lang);
            let (src_name, tgt_name) = (src.name_in(pl), tgt.name_in(pl));
            let note = mongolian_note(kind, tgt, pl);
            let intro = match pl {
                PromptLang::Zh => format!("请将下面的{}文本翻译成{}。{}", src_name, tgt_name, note),
                PromptLang::En => format!(
                    "Please translate the following {} text into {}. {}",
                    src_name, tgt_name, note
                ),
            };
            let source = example.text_or_empty(src.code());
            Block {
                lines: vec![intro, field(pl, src_name, src_name, &source)],
                cue: match pl {
                    PromptLang::Zh => format!("{}：", tgt_name),
                    PromptLang::En => format!("{}: ", tgt_name),
                },
            }
        }
        TaskKind::CorefResolution => Block {
            lines: vec![
                match pl {
                    PromptLang::Zh => format!("请判断以下{}文本中的两个片段是否指代同一个实体。", lang),
                    PromptLang::En => format!(
                        "Please determine if the two spans in the following {} text refer to the same entity.",
                        lang
                    ),
                },
                field(pl, "文本", "Text", &example.text_or_empty("text")),
                field(pl, "片段1", "Span 1", &example.text_or_empty("span1_text")),
                field(pl, "片段2", "Span 2", &example.text_or_empty("span2_text")),
                field(pl, "选项", "Options", &options),
            ],
            cue: cue(
                pl,
                "答案（只需提供选项字母，如A、B）：",
                "Answer (just provide the letter of the option, e.g. A, B): ",
            ),
        },
        TaskKind::Entailment => Block {
            lines: vec![
                match pl {
                    PromptLang::Zh => format!("请判断以下两个{}句子之间的关系。", lang),
                    PromptLang::En => format!(
                        "Please determine the relationship between the following two {} sentences.",
                        lang
                    ),
                },
                field(pl, "句子1", "Sentence 1", &example.text_or_empty("sentence1")),
                field(pl, "句子2", "Sentence 2", &example.text_or_empty("sentence2")),
                field(pl, "选项", "Options", &options),
            ],
            cue: cue(
                pl,
                "答案（只需提供选项字母，如A、B、C）：",
                "Answer (just provide the letter of the option, e.g. A, B, C): ",
            ),
        },
        TaskKind::TextClassification => {
            let categories = match pl {
                PromptLang::Zh => CLASSIFICATION_LABELS.iter().map(|(zh, _)| *zh).collect::<Vec<_>>().join("、"),
                PromptLang::En => CLASSIFICATION_LABELS.iter().map(|(_, en)| *en).collect::<Vec<_>>().join(", "),
            };
            let text = truncate_passage(&example.text_or_empty("text"), spec.max_passage_len);
            Block {
                lines: vec![
                    match pl {
                        PromptLang::Zh => format!("请判断以下{}文本的类别：", lang),
                        PromptLang::En => format!("Please classify the following {} text.", lang),
                    },
                    field(pl, "文本", "Text", &text),
                    field(pl, "候选类别", "Candidate categories", &categories),
                ],
                cue: cue(pl, "类别：", "Category: "),
            }
        }
        TaskKind::ReadingComprehension => {
            let article = truncate_passage(&example.text_or_empty("context_text"), spec.max_passage_len);
            Block {
                lines: vec![
                    match pl {
                        PromptLang::Zh => format!("请根据以下{}文章用{}语回答问题。", lang, lang),
                        PromptLang::En => format!(
                            "Based on the following {} article, please answer the question in {} language.",
                            lang, lang
                        ),
                    },
                    field(pl, "文章", "Article", &article),
                    field(pl, "问题", "Question", &example.text_or_empty("query_text")),
                ],
                cue: cue(pl, "答案：", "Answer: "),
            }
        }
        TaskKind::Safety => question_with_options(
            match pl {
                PromptLang::Zh => format!("请回答以下{}问题，选择正确的选项。", lang),
                PromptLang::En => format!(
                    "Please answer the following {} question by selecting the correct option.",
                    lang
                ),
            },
            LETTER_CUE_ZH,
            LETTER_CUE_EN,
        ),
        TaskKind::ProfessionalSkills => {
            let note = match role {
                BlockRole::Target => domain_note(example, pl),
                BlockRole::Exemplar => String::new(),
            };
            question_with_options(
                match pl {
                    PromptLang::Zh => format!("请回答以下{}专业知识问题{}，选择正确的选项。", lang, note),
                    PromptLang::En => format!(
                        "Please answer the following {} professional knowledge question{} by selecting the correct option.",
                        lang, note
                    ),
                },
                LETTER_CUE_ZH,
                LETTER_CUE_EN,
            )
        }
        TaskKind::EthnicVocabulary => question_with_options(
            match pl {
                PromptLang::Zh => format!("请选择与问题中的词汇术语对应的{}术语。", lang),
                PromptLang::En => format!(
                    "Please select the Chinese term that corresponds to the {} ethnic vocabulary term in the question.",
                    lang
                ),
            },
            LETTER_CUE_ZH,
            LETTER_CUE_EN,
        ),
        TaskKind::EthnicLanguageUnderstanding => question_with_options(
            match pl {
                PromptLang::Zh => format!("请回答以下{}民族语言理解问题，选择正确的选项。", lang),
                PromptLang::En => format!(
                    "Please answer the following {} ethnic language understanding question by selecting the correct option.",
                    lang
                ),
            },
            "答案（只需提供选项字母，如A、B、C）：",
            "Answer (just provide the letter of the option, e.g. A, B, C): ",
        ),
        TaskKind::MathReasoning => Block {
            lines: vec![
                match pl {
                    PromptLang::Zh => format!("解决以下{}数学问题，并只提供最终的数字答案。", lang),
                    PromptLang::En => format!(
                        "Solve the following {} math problem and provide only the final numerical answer.",
                        lang
                    ),
                },
                field(pl, "问题", "Problem", &q),
            ],
            cue: cue(pl, "答案：", "Answer: "),
        },
        TaskKind::TraditionalCulture | TaskKind::TextGeneration => {
            let note = mongolian_note(kind, spec.eval_lang, pl);
            let zh_cue = if kind == TaskKind::TextGeneration { "回答：" } else { "答案：" };
            Block {
                lines: vec![
                    match pl {
                        PromptLang::Zh => format!("请回答以下{}问题。{}", lang, note),
                        PromptLang::En => format!("Please answer the following {} question. {}", lang, note),
                    },
                    field(pl, "问题", "Question", &q),
                ],
                cue: cue(pl, zh_cue, "Answer: "),
            }
        }
    }
}

/// Formats prompts for one TaskSpec; exemplar blocks are rendered once.
#[derive(Debug, Clone)]
pub struct PromptFormatter {
    spec: TaskSpec,
    prefix: String,
}

impl PromptFormatter {
    /// Uses the first `num_exemplar` exemplars in file order.
    pub fn new(spec: &TaskSpec, exemplars: &[Example]) -> Self {
        let mut prefix = String::new();
        let take = if spec.exemplar_file.is_some() { spec.num_exemplar as usize } else { 0 };
        for exemplar in exemplars.iter().take(take) {
            build_block(spec, exemplar, BlockRole::Exemplar).render(&mut prefix);
            prefix.push_str(&exemplar.gold);
            prefix.push_str("\n\n");
        }
        Self {
            spec: spec.clone(),
            prefix,
        }
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn format(&self, example: &Example) -> Prompt {
        let mut text = self.prefix.clone();
        build_block(&self.spec, example, BlockRole::Target).render(&mut text);
        Prompt::new(text)
    }
}

/// One-shot form of [`PromptFormatter`].
pub fn format_prompt(spec: &TaskSpec, exemplars: &[Example], example: &Example) -> Prompt {
    PromptFormatter::new(spec, exemplars).format(example)
}
