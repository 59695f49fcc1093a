//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::Result;
use crate::agent::{PruningConfig, RetryPolicy};
use crate::error::Error;

/// Environment variable that overrides `api_key`.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory the tools operate in
    #[serde(default = "default_workspace")]
    pub workspace: PathBuf,

    /// Root for chats, screenshots, tool outputs and logs
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Anthropic API key (ANTHROPIC_API_KEY takes precedence)
    #[serde(default)]
    pub api_key: String,

    /// Messages API endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Tool generation, selects the beta flag sent with each request
    #[serde(default)]
    pub tool_version: ToolVersion,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Model calls per turn, the first one included
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff base; the n-th retry waits n times this
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Timeout for a single shell command
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Follow-up exchanges the REPL runs after tool calls before asking again
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    #[serde(default)]
    pub pruning: PruningConfig,
}

/// Tool generation the model is told about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolVersion {
    #[default]
    #[serde(rename = "computer_use_20241022")]
    V20241022,
    #[serde(rename = "computer_use_20250124")]
    V20250124,
}

impl ToolVersion {
    pub fn beta_flag(&self) -> &'static str {
        match self {
            ToolVersion::V20241022 => "computer-use-2024-10-22",
            ToolVersion::V20250124 => "computer-use-2025-01-24",
        }
    }
}

fn default_workspace() -> PathBuf {
    config_dir().join("workspace")
}

fn default_output_dir() -> PathBuf {
    config_dir().join("output")
}

fn default_api_url() -> String {
    crate::agent::llm::anthropic::DEFAULT_API_URL.to_string()
}

fn default_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_tool_timeout_secs() -> u64 {
    120
}

fn default_max_steps() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            output_dir: default_output_dir(),
            api_key: String::new(),
            api_url: default_api_url(),
            model: default_model(),
            tool_version: ToolVersion::default(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            tool_timeout_secs: default_tool_timeout_secs(),
            max_steps: default_max_steps(),
            pruning: PruningConfig::default(),
        }
    }
}

impl Config {
    /// Check values a session can't start without.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::Config(format!(
                "No API key. Set {} or add api_key to {:?}",
                API_KEY_ENV,
                config_path()
            )));
        }
        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }
        if self.pruning.token_budget == 0 || self.pruning.window == 0 {
            return Err(Error::Config(
                "pruning.token_budget and pruning.window must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Apply environment overrides.
    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.is_empty() {
                self.api_key = key;
            }
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pilot")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from the default location
pub fn load() -> Result<Config> {
    load_from(&config_path())
}

/// Load configuration from `path`, then apply environment overrides
pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'pilot init' first.",
            path
        )));
    }

    let content = std::fs::read_to_string(path)?;
    let mut config: Config = serde_json::from_str(&content)?;
    config.apply_env();
    Ok(config)
}

/// Load the config file if present, defaults otherwise
pub fn load_or_default() -> Result<Config> {
    let path = config_path();
    if path.exists() {
        return load_from(&path);
    }
    let mut config = Config::default();
    config.apply_env();
    Ok(config)
}

/// Save configuration to the default location
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

/// Save configuration to `path`
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    // Create parent directory
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Write a default config (keeping an existing one) and create its directories
pub fn init() -> Result<Config> {
    let path = config_path();
    let config = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)?
    } else {
        let config = Config::default();
        save_to(&config, &path)?;
        config
    };

    std::fs::create_dir_all(&config.workspace)?;
    std::fs::create_dir_all(&config.output_dir)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.model, "claude-3-5-sonnet-20241022");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.pruning.token_budget, 150_000);
        assert_eq!(config.retry_policy().base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.tool_version, ToolVersion::V20241022);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let parsed: Config = serde_json::from_str(
            r#"{"model": "claude-x", "tool_version": "computer_use_20250124", "pruning": {"token_budget": 1000}}"#,
        )
        .unwrap();
        assert_eq!(parsed.model, "claude-x");
        assert_eq!(parsed.tool_version.beta_flag(), "computer-use-2025-01-24");
        assert_eq!(parsed.pruning.token_budget, 1000);
        assert_eq!(parsed.pruning.window, 10);
        assert_eq!(parsed.tool_timeout_secs, 120);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.max_steps = 4;
        save_to(&config, &path).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded.max_steps, 4);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = load_from(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.api_key.clear();
        assert!(config.validate().is_err());

        config.api_key = "sk-test".into();
        assert!(config.validate().is_ok());

        config.max_retries = 0;
        assert!(config.validate().is_err());
    }
}
