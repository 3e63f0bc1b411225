//! Configuration parsing from YAML/JSON.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use should_core::CaptureConfig;
use thiserror::Error;

use super::schema::validate_config_schema;
use crate::client::ClientError;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config does not match schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Invalid duration '{value}' for {field}: {message}")]
    InvalidDuration {
        field: String,
        value: String,
        message: String,
    },

    #[error("Provider could not be built: {0}")]
    Provider(#[from] ClientError),

    #[error("Unsupported config file extension: {0}")]
    UnsupportedFormat(String),
}

/// Provider selection: `type` picks the factory, everything else is passed
/// to it as settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(rename = "type")]
    pub provider_type: String,

    #[serde(flatten)]
    pub settings: Map<String, JsonValue>,
}

impl ProviderSection {
    pub fn settings_value(&self) -> JsonValue {
        JsonValue::Object(self.settings.clone())
    }
}

/// Limits for the model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluationConfig {
    /// Human-readable limit, e.g. `"30s"`
    pub timeout: Option<String>,
}

impl EvaluationConfig {
    pub fn timeout(&self) -> Result<Option<Duration>, ConfigError> {
        self.timeout
            .as_deref()
            .map(|text| parse_duration("evaluation.timeout", text))
            .transpose()
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShouldConfig {
    pub provider: Option<ProviderSection>,
    pub capture: CaptureConfig,
    pub evaluation: EvaluationConfig,
}

impl ShouldConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_value(value)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Load a configuration file, choosing the format by extension.
    ///
    /// `.yaml` / `.yml` are YAML, `.json` is JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&contents),
            Some("json") => Self::from_json(&contents),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            )),
        }
    }

    fn from_value(value: JsonValue) -> Result<Self, ConfigError> {
        // An empty YAML document is null.
        let value = match value {
            JsonValue::Null => JsonValue::Object(Map::new()),
            other => other,
        };

        validate_config_schema(&value).map_err(ConfigError::Schema)?;

        let config: ShouldConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Check what the schema cannot express.
    fn validate(&self) -> Result<(), ConfigError> {
        self.evaluation.timeout()?;

        if let Some(text) = self
            .provider
            .as_ref()
            .and_then(|p| p.settings.get("timeout"))
            .and_then(JsonValue::as_str)
        {
            parse_duration("provider.timeout", text)?;
        }

        Ok(())
    }
}

fn parse_duration(field: &str, text: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(text).map_err(|e| ConfigError::InvalidDuration {
        field: field.to_string(),
        value: text.to_string(),
        message: e.to_string(),
    })
}
