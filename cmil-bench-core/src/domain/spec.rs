use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::error::{CoreError, Result};

use super::language::{Language, PromptLang};
use super::task::{BenchmarkTask, TaskKind, TranslationDirection};

/// One evaluation unit: a task on one language with one prompt language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct TaskSpec {
    pub task: BenchmarkTask,
    pub eval_lang: Language,
    pub prompt_lang: PromptLang,
    pub input_file: PathBuf,
    pub output_file: PathBuf,
    #[serde(default)]
    pub exemplar_file: Option<PathBuf>,
    #[serde(default)]
    pub num_exemplar: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1))]
    pub max_passage_len: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_lang: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tgt_lang: Option<Language>,
    #[validate(range(min = 1))]
    pub max_new_tokens: u32,
}

impl TaskSpec {
    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    pub fn direction(&self) -> Option<TranslationDirection> {
        match (self.src_lang, self.tgt_lang) {
            (Some(src), Some(tgt)) => TranslationDirection::between(src, tgt),
            _ => None,
        }
    }

    /// Checks the invariants a runnable spec must hold.
    pub fn validate_spec(&self) -> Result<()> {
        self.validate()?;
        if self.kind() == TaskKind::Translation {
            match (self.src_lang, self.tgt_lang) {
                (Some(src), Some(tgt)) if src != tgt => {}
                (Some(_), Some(_)) => {
                    return Err(CoreError::Config(format!(
                        "translation spec {} has identical source and target language",
                        self.output_file.display()
                    )))
                }
                _ => {
                    return Err(CoreError::Config(format!(
                        "translation spec {} is missing src_lang/tgt_lang",
                        self.output_file.display()
                    )))
                }
            }
        }
        if self.output_file.as_os_str().is_empty() {
            return Err(CoreError::Config("task spec has an empty output_file".to_string()));
        }
        Ok(())
    }

    /// Stable digest of every field; a checkpoint is only valid for the spec
    /// that produced it.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        side_file(&self.output_file, "checkpoint.json")
    }

    pub fn error_log_path(&self) -> PathBuf {
        side_file(&self.output_file, "errors.log")
    }

    pub fn error_ids_path(&self) -> PathBuf {
        side_file(&self.output_file, "error_ids.json")
    }

    /// Label used in logs: `Task/lang[/src2tgt]`.
    pub fn label(&self) -> String {
        match (self.src_lang, self.tgt_lang) {
            (Some(src), Some(tgt)) => format!("{}/{}/{}2{}", self.task, self.eval_lang, src, tgt),
            _ => format!("{}/{}", self.task, self.eval_lang),
        }
    }
}

/// `dir/stem.ext` → `dir/stem_{suffix}`
pub fn side_file(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{}_{}", stem, suffix))
}
