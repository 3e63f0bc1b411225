//! Provider registration by type name.
//!
//! Configuration names a provider by its `type` (`"openai"`, `"anthropic"`);
//! the registry maps that name to a factory that builds the provider from the
//! rest of the provider section.
//!
//! ```ignore
//! let registry = ProviderRegistry::with_defaults();
//! let client = registry.build_client("openai", &settings)?;
//! should_runtime::use_client(client);
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{CompletionConfig, LlmProvider, ProviderClient};
use crate::client::{ClientError, LlmClient};

/// Builds one kind of provider from its settings.
pub trait ProviderFactory: Send + Sync {
    /// Type name used in configuration.
    fn provider_type(&self) -> &'static str;

    /// Create a provider from its settings.
    fn create(&self, settings: &JsonValue) -> Result<Arc<dyn LlmProvider>, ClientError>;

    /// Check settings without creating anything.
    fn validate_config(&self, settings: &JsonValue) -> Result<(), ClientError>;

    /// Settings applied under the user's own.
    fn default_config(&self) -> JsonValue {
        serde_json::json!({})
    }

    fn description(&self) -> &'static str {
        "LLM Provider"
    }
}

/// Registry of available provider factories.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: BTreeMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider factory, replacing any with the same type name.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories
            .insert(factory.provider_type().to_string(), factory);
    }

    fn factory(&self, provider_type: &str) -> Result<&Arc<dyn ProviderFactory>, ClientError> {
        self.factories.get(provider_type).ok_or_else(|| {
            ClientError::NotConfigured(format!(
                "Unknown provider type: '{}'. Available: {:?}",
                provider_type,
                self.available_types()
            ))
        })
    }

    /// Create a provider from type name and settings.
    pub fn create(
        &self,
        provider_type: &str,
        settings: &JsonValue,
    ) -> Result<Arc<dyn LlmProvider>, ClientError> {
        let factory = self.factory(provider_type)?;
        let merged = merge_defaults(factory.default_config(), settings);
        factory.create(&merged)
    }

    /// Validate settings for a provider type.
    pub fn validate(&self, provider_type: &str, settings: &JsonValue) -> Result<(), ClientError> {
        let factory = self.factory(provider_type)?;
        factory.validate_config(&merge_defaults(factory.default_config(), settings))
    }

    /// Create a provider and wrap it as a check client.
    ///
    /// Completion settings (`model`, `max_tokens`, `temperature`, `timeout`)
    /// are read from the same settings object.
    pub fn build_client(
        &self,
        provider_type: &str,
        settings: &JsonValue,
    ) -> Result<Arc<dyn LlmClient>, ClientError> {
        let factory = self.factory(provider_type)?;
        let merged = merge_defaults(factory.default_config(), settings);
        factory.validate_config(&merged)?;

        let completion = CompletionConfig::from_settings(&merged)?;
        let provider = factory.create(&merged)?;

        tracing::debug!(
            provider = provider_type,
            model = %completion.model,
            "provider client built"
        );

        Ok(Arc::new(ProviderClient::new(provider, completion)))
    }

    pub fn available_types(&self) -> Vec<&str> {
        self.factories.keys().map(|s| s.as_str()).collect()
    }

    pub fn has_provider(&self, provider_type: &str) -> bool {
        self.factories.contains_key(provider_type)
    }

    /// Registry with the built-in `openai` and `anthropic` factories.
    ///
    /// Both are registered regardless of features so that configuration can
    /// be validated anywhere; calls need the matching feature.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(super::OpenAiProviderFactory));
        registry.register(Arc::new(super::AnthropicProviderFactory));
        registry
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.available_types())
            .finish()
    }
}

/// Shallow merge: keys in `settings` override keys in `defaults`.
fn merge_defaults(defaults: JsonValue, settings: &JsonValue) -> JsonValue {
    match (defaults, settings) {
        (JsonValue::Object(mut base), JsonValue::Object(over)) => {
            for (key, value) in over {
                base.insert(key.clone(), value.clone());
            }
            JsonValue::Object(base)
        }
        (_, settings) => settings.clone(),
    }
}
