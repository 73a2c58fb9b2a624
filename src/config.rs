//! 转换配置：适配器共享的可调参数，支持 YAML / JSON 文件与环境变量加载。
//!
//! Transcoder configuration.
//!
//! All fields have defaults, so an empty document (or no file at all) yields a
//! working configuration. Adapters receive the config as `Arc<TranscodeConfig>`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, ErrorContext, Result};

/// Environment variable naming a config file to load.
pub const CONFIG_ENV_VAR: &str = "LLM_TRANSCODE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Budget used for Claude when the source request has none.
    pub default_max_tokens: u32,
    /// Joins several system prompts into a single system field.
    pub system_separator: String,
    /// Prefix for tool-call ids synthesized by the engine.
    pub tool_call_id_prefix: String,
    /// Emit `BLOCK_NONE` safety settings on Gemini requests.
    pub gemini_relaxed_safety: bool,
    /// Compile tool and response schemas during validation.
    pub strict_schemas: bool,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: 4096,
            system_separator: "\n\n".to_string(),
            tool_call_id_prefix: "call_".to_string(),
            gemini_relaxed_safety: false,
            strict_schemas: false,
        }
    }
}

impl TranscodeConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                "invalid YAML configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })?;
        config.check()
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content).map_err(|e| {
            Error::configuration_with_context(
                "invalid JSON configuration",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("config_loader"),
            )
        })?;
        config.check()
    }

    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&content),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            other => Err(Error::configuration_with_context(
                "unsupported configuration file extension",
                ErrorContext::new()
                    .with_field_path(path.display().to_string())
                    .with_details(format!("extension: {:?}", other))
                    .with_source("config_loader"),
            )),
        }
    }

    /// Load the file named by `LLM_TRANSCODE_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(path) if !path.trim().is_empty() => {
                tracing::debug!(path = %path, "loading transcoder configuration");
                Self::from_path(path.trim())
            }
            _ => Ok(Self::default()),
        }
    }

    fn check(self) -> Result<Self> {
        if self.default_max_tokens == 0 {
            return Err(Error::configuration_with_context(
                "default_max_tokens must be greater than zero",
                ErrorContext::new()
                    .with_field_path("default_max_tokens")
                    .with_source("config_loader"),
            ));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = TranscodeConfig::from_yaml_str("default_max_tokens: 1024\nstrict_schemas: true\n")
            .unwrap();
        assert_eq!(config.default_max_tokens, 1024);
        assert!(config.strict_schemas);
        assert_eq!(config.system_separator, "\n\n");
        assert_eq!(config.tool_call_id_prefix, "call_");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(TranscodeConfig::from_yaml_str("").unwrap(), TranscodeConfig::default());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let err = TranscodeConfig::from_json_str(r#"{"default_max_tokens": 0}"#).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn test_from_path_by_extension() {
        let json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        std::fs::write(json.path(), r#"{"gemini_relaxed_safety": true}"#).unwrap();
        let config = TranscodeConfig::from_path(json.path()).unwrap();
        assert!(config.gemini_relaxed_safety);

        let yaml = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        std::fs::write(yaml.path(), "default_max_tokens: 1024\n").unwrap();
        assert_eq!(TranscodeConfig::from_path(yaml.path()).unwrap().default_max_tokens, 1024);
    }

    #[test]
    fn test_from_path_rejects_unknown_extension() {
        let toml = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::fs::write(toml.path(), "default_max_tokens = 1024\n").unwrap();
        let err = TranscodeConfig::from_path(toml.path()).unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
        assert!(err.to_string().contains("unsupported configuration file extension"));

        let missing = toml.path().with_extension("json");
        assert_eq!(TranscodeConfig::from_path(missing).unwrap_err().kind(), "io_error");
    }
}
