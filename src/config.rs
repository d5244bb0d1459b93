//! Runner configuration: defaults, an optional JSON file, then
//! `STEPCHAIN_*` environment overrides, in that order.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stepchain_router::{LlmClassifierConfig, RouterConfig};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Turn the LLM classification lane on. The keyword fallback stays
    /// available either way.
    pub enabled: bool,
    pub api_base: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 8,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub llm: LlmSettings,
    /// Minimum LLM confidence before its verdict is accepted.
    pub confidence_threshold: f32,
    /// Timeout applied to each outgoing scenario HTTP request.
    pub http_timeout_secs: u64,
    /// Endpoint of the browser-automation bridge. Without one, browser
    /// steps fail with an executor error instead of being skipped silently.
    pub browser_bridge_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            confidence_threshold: 0.7,
            http_timeout_secs: 30,
            browser_bridge_url: None,
        }
    }
}

impl EngineConfig {
    /// Defaults, merged with the JSON config file when one is given, then
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("STEPCHAIN_LLM_ENABLED") {
            if let Ok(enabled) = value.parse() {
                self.llm.enabled = enabled;
            }
        }
        if let Ok(value) = std::env::var("STEPCHAIN_LLM_API_BASE") {
            self.llm.api_base = value;
        }
        if let Ok(value) = std::env::var("STEPCHAIN_LLM_API_KEY") {
            self.llm.api_key = value;
        }
        if let Ok(value) = std::env::var("STEPCHAIN_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Ok(value) = std::env::var("STEPCHAIN_CONFIDENCE_THRESHOLD") {
            if let Ok(threshold) = value.parse() {
                self.confidence_threshold = threshold;
            }
        }
        if let Ok(value) = std::env::var("STEPCHAIN_BRIDGE_URL") {
            self.browser_bridge_url = Some(value);
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            confidence_threshold: self.confidence_threshold,
            llm_timeout: Duration::from_secs(self.llm.timeout_secs),
        }
    }

    /// Settings for the LLM lane, when it is enabled.
    pub fn llm_classifier_config(&self) -> Option<LlmClassifierConfig> {
        if !self.llm.enabled {
            return None;
        }
        Some(LlmClassifierConfig {
            api_base: self.llm.api_base.clone(),
            api_key: self.llm.api_key.clone(),
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            timeout: Duration::from_secs(self.llm.timeout_secs),
        })
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
