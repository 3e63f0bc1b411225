//! File-based configuration.
//!
//! A configuration document can select the provider that backs checks by
//! default and tune capture and evaluation:
//!
//! ```yaml
//! provider:
//!   type: openai
//!   model: gpt-4o-mini
//! capture:
//!   log_level: info
//! evaluation:
//!   timeout: 30s
//! ```
//!
//! Documents are validated against an embedded JSON Schema before they are
//! deserialized.

mod parser;
mod schema;

use std::time::Duration;

use should_core::CaptureConfig;

pub use parser::{ConfigError, EvaluationConfig, ProviderSection, ShouldConfig};
pub use schema::validate_config_schema;

use crate::providers::ProviderRegistry;
use crate::store;

/// Per-check settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckOptions {
    /// How logs and printed output are captured
    pub capture: CaptureConfig,

    /// Upper bound on the model call; `None` waits for the client
    pub timeout: Option<Duration>,
}

impl CheckOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_capture(mut self, capture: CaptureConfig) -> Self {
        self.capture = capture;
        self
    }

    /// Options described by the `capture` and `evaluation` sections.
    pub fn from_config(config: &ShouldConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            capture: config.capture.clone(),
            timeout: config.evaluation.timeout()?,
        })
    }
}

impl TryFrom<&ShouldConfig> for CheckOptions {
    type Error = ConfigError;

    fn try_from(config: &ShouldConfig) -> Result<Self, Self::Error> {
        Self::from_config(config)
    }
}

/// Apply a configuration with the built-in providers.
///
/// See [`configure_with`].
pub fn configure(config: &ShouldConfig) -> Result<CheckOptions, ConfigError> {
    configure_with(config, &ProviderRegistry::with_defaults())
}

/// Apply a configuration: build its provider (if any) through `registry`,
/// install it as the default client, and return the check options it
/// describes.
///
/// Nothing is installed when any part of the configuration is invalid.
pub fn configure_with(
    config: &ShouldConfig,
    registry: &ProviderRegistry,
) -> Result<CheckOptions, ConfigError> {
    let options = CheckOptions::from_config(config)?;

    match &config.provider {
        Some(section) => {
            let client =
                registry.build_client(&section.provider_type, &section.settings_value())?;
            store::use_client(client);
        }
        None => {
            tracing::debug!("configuration has no provider section; default client unchanged");
        }
    }

    Ok(options)
}
