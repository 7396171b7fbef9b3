use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DroidClawError, DroidClawResult};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub triggers: TriggerConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    /// Placeholder name → secret literal. Values never leave the process unmasked.
    #[serde(default)]
    pub sensitive_data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Rotated round-robin by the direct transport. Also read from `DROIDCLAW_API_KEYS`.
    #[serde(default)]
    pub api_keys: Vec<String>,
    /// Per-attempt timeout; the retry policy's backoff is separate.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    /// When both fields are present the proxy transport is preferred.
    #[serde(default)]
    pub proxy: Option<ProxyEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_base: default_api_base(),
            temperature: default_temperature(),
            api_keys: Vec::new(),
            request_timeout_secs: default_request_timeout(),
            retry: RetryConfig::default(),
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyEntry {
    pub endpoint: String,
    #[serde(default)]
    pub shared_key: String,
}

impl ProxyEntry {
    pub fn is_configured(&self) -> bool {
        !self.endpoint.trim().is_empty() && !self.shared_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_actions")]
    pub max_actions_per_step: usize,
    #[serde(default = "default_max_history")]
    pub max_history_items: usize,
    /// `None` runs until the model signals `done` or the operator stops the task.
    #[serde(default)]
    pub max_steps: Option<u32>,
    /// Delay between the tap and the typing of `tap_element_input_text_and_enter`.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_wait_delay")]
    pub wait_delay_ms: u64,
    #[serde(default = "default_scroll_amount")]
    pub default_scroll_amount: u32,
    #[serde(default)]
    pub screen_width: Option<i32>,
    #[serde(default)]
    pub screen_height: Option<i32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_actions_per_step: default_max_actions(),
            max_history_items: default_max_history(),
            max_steps: None,
            settle_delay_ms: default_settle_delay(),
            wait_delay_ms: default_wait_delay(),
            default_scroll_amount: default_scroll_amount(),
            screen_width: None,
            screen_height: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SandboxConfig {
    /// Directory backing read_file/write_file/append_file.
    #[serde(default)]
    pub workspace_dir: Option<PathBuf>,
}

impl SandboxConfig {
    /// Configured directory, or `<data_local_dir>/droidclaw/workspace`.
    pub fn resolved_workspace(&self) -> PathBuf {
        if let Some(dir) = &self.workspace_dir {
            return dir.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("droidclaw").join("workspace"))
            .unwrap_or_else(|| PathBuf::from("workspace"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_debounce")]
    pub debounce_secs: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Cosine similarity at or above which a new memory counts as a duplicate.
    #[serde(default = "default_duplicate_threshold")]
    pub duplicate_threshold: f32,
    #[serde(default = "default_recall_top_k")]
    pub recall_top_k: usize,
    /// Recalled memories scoring below this are left out of the prompt.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// JSONL file backing the index. Defaults to the user data dir.
    #[serde(default)]
    pub index_path: Option<PathBuf>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duplicate_threshold: default_duplicate_threshold(),
            recall_top_k: default_recall_top_k(),
            min_similarity: default_min_similarity(),
            embedding_model: default_embedding_model(),
            index_path: None,
        }
    }
}

impl MemoryConfig {
    /// Configured file, or `<data_local_dir>/droidclaw/memory/index.jsonl`.
    pub fn resolved_index_path(&self) -> PathBuf {
        if let Some(path) = &self.index_path {
            return path.clone();
        }
        dirs::data_local_dir()
            .map(|d| d.join("droidclaw").join("memory"))
            .unwrap_or_else(|| PathBuf::from("memory"))
            .join("index.jsonl")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    /// Device serial passed as `adb -s`. Also read from `DROIDCLAW_ADB_SERIAL`.
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            serial: None,
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_request_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_max_actions() -> usize {
    5
}

fn default_max_history() -> usize {
    20
}

fn default_settle_delay() -> u64 {
    500
}

fn default_wait_delay() -> u64 {
    5_000
}

fn default_scroll_amount() -> u32 {
    800
}

fn default_debounce() -> u64 {
    60
}

fn default_duplicate_threshold() -> f32 {
    0.85
}

fn default_recall_top_k() -> usize {
    3
}

fn default_min_similarity() -> f32 {
    0.6
}

fn default_embedding_model() -> String {
    "text-embedding-004".to_string()
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_command_timeout() -> u64 {
    15
}

fn resolve_config_path(explicit: Option<&Path>) -> DroidClawResult<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(DroidClawError::Config(format!(
            "config file {} does not exist",
            path.display()
        )));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            let candidate = parent.join("config.toml");
            if candidate.exists() {
                tracing::debug!(path = %candidate.display(), "config found next to executable");
                return Ok(candidate);
            }
        }
    }

    let cwd = std::env::current_dir()?;
    let candidate = cwd.join("config.toml");
    if candidate.exists() {
        tracing::debug!(path = %candidate.display(), "config found in working directory");
        return Ok(candidate);
    }

    Err(DroidClawError::Config(
        "config.toml not found next to executable or in working directory".into(),
    ))
}

/// Parse a config document and apply environment overrides.
pub fn parse_config(content: &str) -> DroidClawResult<AppConfig> {
    let mut config: AppConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config);
    validate(&config)?;
    Ok(config)
}

/// Load `config.toml`; a missing file falls back to defaults plus environment.
pub fn load_config(explicit: Option<&Path>) -> DroidClawResult<AppConfig> {
    match resolve_config_path(explicit) {
        Ok(path) => {
            let content = std::fs::read_to_string(&path)?;
            let config = parse_config(&content)?;
            tracing::info!(path = %path.display(), model = %config.llm.model, "config loaded");
            Ok(config)
        }
        Err(e) if explicit.is_none() => {
            tracing::warn!(error = %e, "no config file; using defaults and environment");
            let mut config = AppConfig::default();
            apply_env_overrides(&mut config);
            validate(&config)?;
            Ok(config)
        }
        Err(e) => Err(e),
    }
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(keys) = std::env::var("DROIDCLAW_API_KEYS") {
        let parsed: Vec<String> = keys
            .split(',')
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if !parsed.is_empty() {
            config.llm.api_keys = parsed;
        }
    }

    let endpoint = std::env::var("DROIDCLAW_PROXY_ENDPOINT").ok();
    let shared_key = std::env::var("DROIDCLAW_PROXY_KEY").ok();
    if endpoint.is_some() || shared_key.is_some() {
        let proxy = config.llm.proxy.get_or_insert_with(|| ProxyEntry {
            endpoint: String::new(),
            shared_key: String::new(),
        });
        if let Some(endpoint) = endpoint {
            proxy.endpoint = endpoint;
        }
        if let Some(key) = shared_key {
            proxy.shared_key = key;
        }
    }

    if let Ok(serial) = std::env::var("DROIDCLAW_ADB_SERIAL") {
        if !serial.trim().is_empty() {
            config.device.serial = Some(serial);
        }
    }
}

fn validate(config: &AppConfig) -> DroidClawResult<()> {
    if config.agent.max_actions_per_step == 0 {
        return Err(DroidClawError::Config(
            "agent.max_actions_per_step must be at least 1".into(),
        ));
    }
    if config.agent.max_history_items < 2 {
        return Err(DroidClawError::Config(
            "agent.max_history_items must be at least 2".into(),
        ));
    }
    if config.llm.retry.max_attempts == 0 {
        return Err(DroidClawError::Config(
            "llm.retry.max_attempts must be at least 1".into(),
        ));
    }
    if !(0.0..=1.0).contains(&config.memory.duplicate_threshold) {
        return Err(DroidClawError::Config(
            "memory.duplicate_threshold must be within 0.0..=1.0".into(),
        ));
    }
    if !(-1.0..=1.0).contains(&config.memory.min_similarity) {
        return Err(DroidClawError::Config(
            "memory.min_similarity must be within -1.0..=1.0".into(),
        ));
    }
    Ok(())
}
