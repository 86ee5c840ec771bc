//! Dataset loading and the on-disk artifact formats shared by every pass.
//!
//! Result files are append-only JSON Lines; side files (checkpoints, error id
//! lists, reports) are whole JSON documents replaced atomically.

use cmil_bench_core::{CoreError, Example, ExampleId, Result, TaskSpec};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Reads a JSON array file.
pub async fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::Io(format!("failed to read {}: {}", path.display(), e)))?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Array(items) => Ok(items),
        _ => Err(CoreError::Validation(format!(
            "{} is not a JSON array",
            path.display()
        ))),
    }
}

/// Loads the examples of a job's input file, in file order.
///
/// Records without a usable id or gold answer are skipped with a warning.
pub async fn load_examples(spec: &TaskSpec) -> Result<Vec<Example>> {
    let records = read_json_array(&spec.input_file).await?;
    let total = records.len();
    let mut examples = Vec::with_capacity(total);
    for (index, record) in records.into_iter().enumerate() {
        match Example::from_record(record, spec) {
            Ok(example) => examples.push(example),
            Err(e) => tracing::warn!(task = %spec.label(), index, error = %e, "skipping dataset record"),
        }
    }
    tracing::debug!(task = %spec.label(), total, usable = examples.len(), "loaded examples");
    Ok(examples)
}

/// Loads the first `num_exemplar` exemplars of a job; empty in zero-shot mode.
pub async fn load_exemplars(spec: &TaskSpec) -> Result<Vec<Example>> {
    let Some(path) = spec.exemplar_file.as_deref() else {
        return Ok(Vec::new());
    };
    if spec.num_exemplar == 0 {
        return Ok(Vec::new());
    }
    let records = read_json_array(path).await?;
    Ok(records
        .into_iter()
        .filter_map(|record| Example::from_record(record, spec).ok())
        .take(spec.num_exemplar as usize)
        .collect())
}

/// Records of a result file plus the byte length of its parseable prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRecords<T> {
    pub records: Vec<T>,
    pub valid_len: u64,
    /// A partial record follows `valid_len`.
    pub truncated_tail: bool,
    /// The last record is complete but lacks its trailing newline.
    pub missing_newline: bool,
}

/// Parses JSON Lines content, stopping at a damaged final line.
///
/// Only the last line may be damaged; a bad line followed by more content is
/// reported as an error.
pub fn parse_jsonl<T: DeserializeOwned>(content: &str) -> Result<ResultRecords<T>> {
    let mut parsed = ResultRecords {
        records: Vec::new(),
        valid_len: 0,
        truncated_tail: false,
        missing_newline: false,
    };
    let mut offset = 0usize;
    let mut lines = content.split_inclusive('\n').peekable();
    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            offset += line.len();
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => {
                parsed.records.push(record);
                offset += line.len();
                parsed.missing_newline = !line.ends_with('\n');
            }
            Err(e) if lines.peek().is_some() => {
                return Err(CoreError::Serialization(format!(
                    "corrupt record at byte {}: {}",
                    offset, e
                )));
            }
            Err(_) => {
                parsed.truncated_tail = true;
                break;
            }
        }
    }
    parsed.valid_len = offset as u64;
    Ok(parsed)
}

/// Loads a JSON Lines result file, cutting away a truncated last line.
///
/// A missing file is an empty result set.
pub async fn load_results<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let parsed: ResultRecords<T> = parse_jsonl(&content)?;
    if parsed.truncated_tail {
        tracing::warn!(
            path = %path.display(),
            kept = parsed.records.len(),
            "repairing truncated result file"
        );
        let file = OpenOptions::new().write(true).open(path).await?;
        file.set_len(parsed.valid_len).await?;
        file.sync_all().await?;
    } else if parsed.missing_newline {
        let mut file = OpenOptions::new().append(true).open(path).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
    }
    Ok(parsed.records)
}

/// Reads a result file written either as JSON Lines or as a JSON array.
pub async fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CoreError::Io(format!("failed to read {}: {}", path.display(), e)))?;
    if content.trim_start().starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&content) {
            return Ok(items);
        }
    }
    Ok(parse_jsonl::<Value>(&content)?.records)
}

/// Appends records to a JSON Lines file, creating it and its parents.
pub async fn append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut buffer = String::new();
    for record in records {
        buffer.push_str(&serde_json::to_string(record)?);
        buffer.push('\n');
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(buffer.as_bytes()).await?;
    file.flush().await?;
    file.sync_data().await?;
    Ok(())
}

/// Writes pretty JSON through a temp file and a rename.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_string_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp);
    tokio::fs::write(&tmp_path, data.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Reads a JSON document; `None` when the file does not exist.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Removes a file if it exists.
pub async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Error side files of one output: a human-readable log and a JSON id list.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    log_path: std::path::PathBuf,
    ids_path: std::path::PathBuf,
}

impl ErrorLog {
    pub fn new(log_path: impl Into<std::path::PathBuf>, ids_path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            ids_path: ids_path.into(),
        }
    }

    pub fn for_spec(spec: &TaskSpec) -> Self {
        Self::new(spec.error_log_path(), spec.error_ids_path())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn ids_path(&self) -> &Path {
        &self.ids_path
    }

    /// Appends one block per failure and merges the ids into the id list.
    pub async fn record(&self, message: &str, failures: &[(ExampleId, String)]) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let mut block = String::new();
        for (id, error) in failures {
            block.push_str(&format!(
                "=== {} ===\n错误信息: {} (id: {})\n异常: {}\n\n",
                timestamp, message, id, error
            ));
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(block.as_bytes()).await?;
        file.flush().await?;

        let mut ids: BTreeSet<ExampleId> = read_json::<Vec<ExampleId>>(&self.ids_path)
            .await?
            .unwrap_or_default()
            .into_iter()
            .collect();
        ids.extend(failures.iter().map(|(id, _)| id.clone()));
        let ids: Vec<ExampleId> = ids.into_iter().collect();
        write_json_atomic(&self.ids_path, &ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmil_bench_core::InferenceResult;

    #[test]
    fn test_parse_jsonl_cuts_truncated_tail() {
        let content = "{\"id\":1,\"pred\":\"A\",\"gold\":\"A\"}\n{\"id\":2,\"pr";
        let parsed: ResultRecords<InferenceResult> = parse_jsonl(content).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(parsed.truncated_tail);
        assert_eq!(parsed.valid_len as usize, content.find('\n').unwrap() + 1);
    }

    #[test]
    fn test_parse_jsonl_rejects_corruption_in_the_middle() {
        let content = "{\"id\":1,\"pred\":\"A\",\"gold\":\"A\"}\nnot json\n{\"id\":2,\"pred\":\"B\",\"gold\":\"B\"}\n";
        assert!(parse_jsonl::<InferenceResult>(content).is_err());
    }

    #[test]
    fn test_parse_jsonl_complete_record_without_newline() {
        let content = "{\"id\":1,\"pred\":\"A\",\"gold\":\"A\"}";
        let parsed: ResultRecords<InferenceResult> = parse_jsonl(content).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert!(!parsed.truncated_tail);
        assert!(parsed.missing_newline);
    }

    #[test]
    fn test_parse_jsonl_clean_file() {
        let content = "{\"id\":1,\"pred\":\"A\",\"gold\":\"A\"}\n\n{\"id\":2,\"pred\":\"B\",\"gold\":\"B\"}\n";
        let parsed: ResultRecords<InferenceResult> = parse_jsonl(content).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert!(!parsed.truncated_tail);
        assert_eq!(parsed.valid_len as usize, content.len());
    }
}
