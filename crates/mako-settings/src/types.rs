//! Settings groups. JSON keys are camelCase; every field has a default.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MakoSettings {
    pub llm: LlmSettings,
    pub agent: AgentSettings,
    pub tools: ToolSettings,
    pub logging: LoggingSettings,
}

/// Model backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmSettings {
    /// API key. Keys starting with `TEST_` select the offline backend.
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub max_tokens: u32,
    /// Force the deterministic offline backend regardless of the key.
    pub offline: bool,
    pub retry: RetrySettings,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.minimax.io/anthropic".to_string(),
            model: "MiniMax-M2".to_string(),
            max_tokens: 16_384,
            offline: false,
            retry: RetrySettings::default(),
        }
    }
}

impl LlmSettings {
    pub fn is_offline(&self) -> bool {
        self.offline || self.api_key.starts_with("TEST_")
    }
}

/// Retry policy for model calls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub enabled: bool,
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            exponential_base: 2.0,
        }
    }
}

/// Turn and session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentSettings {
    /// Model calls allowed per prompt.
    pub max_steps: u32,
    /// Workspace used when a session request carries no cwd.
    pub workspace_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skills_dir: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 50,
            workspace_dir: "./workspace".to_string(),
            system_prompt_path: None,
            skills_dir: None,
        }
    }
}

/// Built-in tool toggles.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSettings {
    pub enable_bash: bool,
    pub enable_file_tools: bool,
    pub bash_timeout_secs: u64,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            enable_bash: true,
            enable_file_tools: true,
            bash_timeout_secs: 120,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level; `RUST_LOG` wins when set.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl MakoSettings {
    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            return Err(SettingsError::InvalidValue(
                "agent.maxSteps must be at least 1".into(),
            ));
        }
        let retry = &self.llm.retry;
        if !(retry.exponential_base >= 1.0) {
            return Err(SettingsError::InvalidValue(format!(
                "llm.retry.exponentialBase must be >= 1.0, got {}",
                retry.exponential_base
            )));
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "llm.retry.initialDelayMs ({}) exceeds maxDelayMs ({})",
                retry.initial_delay_ms, retry.max_delay_ms
            )));
        }
        if self.llm.max_tokens == 0 {
            return Err(SettingsError::InvalidValue(
                "llm.maxTokens must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
