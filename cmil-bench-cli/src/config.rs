//! CLI configuration management

use anyhow::{Context as _, Result};
use cmil_bench_core::RunConfig;
use config::{Config as ConfigLoader, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of environment overrides, e.g. `CMIL_BENCH_REMOTE__API_KEY`.
pub const ENV_PREFIX: &str = "CMIL_BENCH";

/// Default local serving endpoint
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:8000/v1";

/// Default hosted chat endpoint
pub const DEFAULT_REMOTE_URL: &str = "https://api.openai.com/v1";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CliConfig {
    /// Presentation settings
    #[serde(default)]
    pub settings: Settings,

    /// Default directories
    #[serde(default)]
    pub paths: PathSettings,

    /// Job runner settings
    #[serde(default)]
    pub run: RunConfig,

    /// Local serving engine
    #[serde(default)]
    pub local: LocalSettings,

    /// Hosted chat backend
    #[serde(default)]
    pub remote: RemoteSettings,

    /// LLM judge
    #[serde(default)]
    pub judge: JudgeSettings,
}

impl CliConfig {
    /// Layers built-in defaults, the user config file, an explicit file and
    /// `CMIL_BENCH_*` environment variables, later sources winning.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigLoader::builder();

        if let Ok(path) = Self::config_path() {
            builder = builder.add_source(File::from(path).required(false));
        }

        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            builder = builder.add_source(File::from(path).required(true));
        }

        let loaded = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        loaded
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Write this configuration as TOML
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let content = self.to_toml()?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("org", "cmil-bench", "cmil-bench")
            .context("Could not determine config directory")?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

/// Presentation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Default output format
    #[serde(default = "default_output_format")]
    pub output_format: String,

    /// Enable colored output
    #[serde(default = "default_true")]
    pub color: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_format: default_output_format(),
            color: true,
        }
    }
}

/// Directories used when the matching flag is absent
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PathSettings {
    #[serde(default)]
    pub dataset_root: Option<PathBuf>,
    #[serde(default)]
    pub output_root: Option<PathBuf>,
    #[serde(default)]
    pub exemplar_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalSettings {
    #[serde(default = "default_local_url")]
    pub base_url: String,
    /// Command that starts the serving engine
    #[serde(default)]
    pub launch_command: Option<String>,
    #[serde(default = "default_gpu_memory_utilization")]
    pub gpu_memory_utilization: f64,
    #[serde(default = "default_one")]
    pub tensor_parallel_size: u32,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            base_url: default_local_url(),
            launch_command: None,
            gpu_memory_utilization: default_gpu_memory_utilization(),
            tensor_parallel_size: default_one(),
            startup_timeout_secs: default_startup_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteSettings {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_inter_call_delay")]
    pub inter_call_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            api_key: None,
            inter_call_delay_ms: default_inter_call_delay(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JudgeSettings {
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
}

impl Default for JudgeSettings {
    fn default() -> Self {
        Self {
            base_url: default_remote_url(),
            model: None,
            api_key: None,
            max_workers: default_max_workers(),
        }
    }
}

fn default_output_format() -> String {
    "table".to_string()
}

fn default_true() -> bool {
    true
}

fn default_local_url() -> String {
    DEFAULT_LOCAL_URL.to_string()
}

fn default_remote_url() -> String {
    DEFAULT_REMOTE_URL.to_string()
}

fn default_gpu_memory_utilization() -> f64 {
    0.9
}

fn default_one() -> u32 {
    1
}

fn default_startup_timeout() -> u64 {
    600
}

fn default_inter_call_delay() -> u64 {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout() -> u64 {
    60
}

fn default_max_workers() -> usize {
    5
}
