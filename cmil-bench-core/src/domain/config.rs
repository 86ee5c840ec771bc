use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use super::language::{Language, PromptLang};
use super::task::BenchmarkTask;

// ===== Catalog Configuration =====

/// Inputs to catalog expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct CatalogConfig {
    pub dataset_root: PathBuf,
    pub output_root: PathBuf,
    #[validate(length(min = 1, max = 255))]
    pub model_name: String,
    #[serde(default)]
    pub prompt_lang: PromptLang,
    #[serde(default)]
    pub exemplar_root: Option<PathBuf>,
    #[serde(default = "default_num_exemplar")]
    pub num_exemplar: u32,
    /// Skip tasks whose input file is missing instead of failing.
    #[serde(default)]
    pub skip_missing: bool,
}

fn default_num_exemplar() -> u32 {
    3
}

impl CatalogConfig {
    pub fn new(
        dataset_root: impl Into<PathBuf>,
        output_root: impl Into<PathBuf>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            dataset_root: dataset_root.into(),
            output_root: output_root.into(),
            model_name: model_name.into(),
            prompt_lang: PromptLang::Zh,
            exemplar_root: None,
            num_exemplar: default_num_exemplar(),
            skip_missing: false,
        }
    }

    pub fn with_prompt_lang(mut self, prompt_lang: PromptLang) -> Self {
        self.prompt_lang = prompt_lang;
        self
    }

    pub fn with_exemplar_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.exemplar_root = Some(root.into());
        self
    }

    pub fn with_num_exemplar(mut self, n: u32) -> Self {
        self.num_exemplar = n;
        self
    }

    pub fn with_skip_missing(mut self, skip: bool) -> Self {
        self.skip_missing = skip;
        self
    }
}

/// Language and task selection for one catalog expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogSelection {
    pub languages: Vec<Language>,
    pub tasks: Vec<BenchmarkTask>,
}

impl Default for CatalogSelection {
    fn default() -> Self {
        Self {
            languages: Language::EVALUATED.to_vec(),
            tasks: BenchmarkTask::ALL.to_vec(),
        }
    }
}

// ===== Run Configuration =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct RunConfig {
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1))]
    pub batch_size: usize,
    /// Flush every N batches.
    #[serde(default = "default_save_frequency")]
    #[validate(range(min = 1))]
    pub save_frequency: usize,
    /// Flush when this many seconds passed since the last flush.
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,
    /// Negative means every example.
    #[serde(default = "default_max_test_example_num")]
    pub max_test_example_num: i64,
    #[serde(default)]
    pub print_results: bool,
    /// Consecutive all-failed batches before the backend is declared unavailable.
    #[serde(default = "default_unavailable_after")]
    #[validate(range(min = 1))]
    pub unavailable_after: usize,
}

fn default_batch_size() -> usize {
    8
}

fn default_save_frequency() -> usize {
    10
}

fn default_save_interval_secs() -> u64 {
    300
}

fn default_max_test_example_num() -> i64 {
    -1
}

fn default_unavailable_after() -> usize {
    3
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            save_frequency: default_save_frequency(),
            save_interval_secs: default_save_interval_secs(),
            max_test_example_num: default_max_test_example_num(),
            print_results: false,
            unavailable_after: default_unavailable_after(),
        }
    }
}

impl RunConfig {
    pub fn with_batch_size(mut self, n: usize) -> Self {
        self.batch_size = n;
        self
    }

    pub fn with_save_frequency(mut self, n: usize) -> Self {
        self.save_frequency = n;
        self
    }

    pub fn with_max_test_example_num(mut self, n: i64) -> Self {
        self.max_test_example_num = n;
        self
    }

    pub fn with_unavailable_after(mut self, n: usize) -> Self {
        self.unavailable_after = n;
        self
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }

    /// Number of leading examples to evaluate, if capped.
    pub fn example_cap(&self) -> Option<usize> {
        usize::try_from(self.max_test_example_num).ok()
    }
}

// ===== Backend Configuration =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct LocalBackendConfig {
    pub base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    /// Command that starts the serving engine; the engine is assumed to be
    /// running already when absent.
    #[serde(default)]
    pub launch_command: Option<String>,
    #[serde(default = "default_gpu_memory_utilization")]
    #[validate(range(min = 0.05, max = 1.0))]
    pub gpu_memory_utilization: f64,
    #[serde(default = "default_tensor_parallel_size")]
    #[validate(range(min = 1))]
    pub tensor_parallel_size: u32,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_local_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gpu_memory_utilization() -> f64 {
    0.9
}

fn default_tensor_parallel_size() -> u32 {
    1
}

fn default_startup_timeout_secs() -> u64 {
    600
}

fn default_local_timeout_secs() -> u64 {
    600
}

impl LocalBackendConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            launch_command: None,
            gpu_memory_utilization: default_gpu_memory_utilization(),
            tensor_parallel_size: default_tensor_parallel_size(),
            startup_timeout_secs: default_startup_timeout_secs(),
            timeout_secs: default_local_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct RemoteBackendConfig {
    pub base_url: String,
    #[validate(length(min = 1))]
    pub model: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_inter_call_delay_ms")]
    pub inter_call_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_inter_call_delay_ms() -> u64 {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_remote_timeout_secs() -> u64 {
    60
}

impl RemoteBackendConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key: None,
            inter_call_delay_ms: default_inter_call_delay_ms(),
            max_retries: default_max_retries(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }

    pub fn inter_call_delay(&self) -> Duration {
        Duration::from_millis(self.inter_call_delay_ms)
    }
}

// ===== Judge Configuration =====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
pub struct JudgeConfig {
    #[validate(length(min = 1))]
    pub model: String,
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_workers")]
    #[validate(range(min = 1, max = 64))]
    pub max_workers: usize,
    #[serde(default = "default_checkpoint_interval_items")]
    #[validate(range(min = 1))]
    pub checkpoint_interval_items: usize,
    #[serde(default = "default_checkpoint_interval_secs")]
    pub checkpoint_interval_secs: u64,
    #[serde(default)]
    pub sample_size: Option<usize>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_workers() -> usize {
    5
}

fn default_checkpoint_interval_items() -> usize {
    10
}

fn default_checkpoint_interval_secs() -> u64 {
    300
}

fn default_judge_max_tokens() -> u32 {
    1024
}

impl JudgeConfig {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key: None,
            max_workers: default_max_workers(),
            checkpoint_interval_items: default_checkpoint_interval_items(),
            checkpoint_interval_secs: default_checkpoint_interval_secs(),
            sample_size: None,
            max_retries: default_max_retries(),
            max_tokens: default_judge_max_tokens(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    pub fn with_checkpoint_interval_items(mut self, n: usize) -> Self {
        self.checkpoint_interval_items = n;
        self
    }

    pub fn with_sample_size(mut self, n: Option<usize>) -> Self {
        self.sample_size = n;
        self
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval_secs)
    }
}
