//! HTTP LLM providers.
//!
//! This module defines the chat-completion trait for providers and adapts any
//! provider into the narrow [`LlmClient`] capability checks consume.
//!
//! Built-in providers:
//! - [`OpenAiCompatibleProvider`] (`openai` feature): OpenAI and any server
//!   exposing `/chat/completions`
//! - [`AnthropicProvider`] (`anthropic` feature): Anthropic Messages API
//!
//! Without their feature, providers still construct (so configuration can be
//! validated) but every call returns [`ClientError::NotConfigured`].
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::client::{ClientError, LlmClient};

mod anthropic;
mod factory;
mod openai;
pub mod secrets;

pub use anthropic::{AnthropicProvider, AnthropicProviderFactory};
pub use factory::{ProviderFactory, ProviderRegistry};
pub use openai::{OpenAiCompatibleProvider, OpenAiProviderFactory};
pub use secrets::{ApiCredential, CredentialSource};

/// Configuration for a completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 for the least variable answers)
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            max_tokens: 256,
            temperature: 0.0,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CompletionConfig {
    /// Create a config for `model` with default limits.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Read `model`, `max_tokens`, `temperature` and `timeout` from provider settings.
    ///
    /// `timeout` is a human-readable duration such as `"30s"`.
    pub fn from_settings(settings: &JsonValue) -> Result<Self, ClientError> {
        let defaults = Self::default();

        let model = settings["model"]
            .as_str()
            .filter(|m| !m.is_empty())
            .ok_or_else(|| ClientError::NotConfigured("provider 'model' is required".to_string()))?
            .to_string();

        let max_tokens = match settings["max_tokens"].as_u64() {
            Some(n) => u32::try_from(n)
                .map_err(|_| ClientError::NotConfigured(format!("max_tokens out of range: {}", n)))?,
            None => defaults.max_tokens,
        };

        let temperature = settings["temperature"]
            .as_f64()
            .map(|t| t as f32)
            .unwrap_or(defaults.temperature);

        let timeout = match settings["timeout"].as_str() {
            Some(text) => humantime::parse_duration(text).map_err(|e| {
                ClientError::NotConfigured(format!("invalid timeout '{}': {}", text, e))
            })?,
            None => defaults.timeout,
        };

        Ok(Self {
            model,
            max_tokens,
            temperature,
            timeout,
        })
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Sum of both counts. Counts are server-reported, so this saturates.
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Provider abstraction allows swapping LLM backends.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ClientError>;

    /// Get provider name for diagnostics.
    fn name(&self) -> &str;
}

/// Shared HTTP client. Per-request timeouts come from [`CompletionConfig`].
///
/// Idle connections are not pooled: sync checks drive each request on a
/// short-lived runtime, and a pooled connection would outlive it.
#[cfg(any(feature = "anthropic", feature = "openai"))]
fn http_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::OnceLock<reqwest::Client> = std::sync::OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

#[cfg(any(feature = "anthropic", feature = "openai"))]
fn transport_error(err: reqwest::Error, config: &CompletionConfig) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout(config.timeout)
    } else {
        ClientError::HttpError(err.to_string())
    }
}

#[cfg(any(feature = "anthropic", feature = "openai"))]
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn validate_base_url(settings: &JsonValue) -> Result<(), ClientError> {
    if let Some(url) = settings["base_url"].as_str() {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ClientError::NotConfigured(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}

/// [`LlmClient`] over a chat provider: the prompt becomes one user message.
pub struct ProviderClient {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
}

impl ProviderClient {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl LlmClient for ProviderClient {
    async fn generate(&self, prompt: &str) -> Result<String, ClientError> {
        let response = self
            .provider
            .complete(vec![ChatMessage::user(prompt)], &self.config)
            .await?;

        tracing::debug!(
            provider = self.provider.name(),
            model = %response.model,
            tokens = response.usage.total(),
            stop_reason = ?response.stop_reason,
            "completion received"
        );

        Ok(response.content)
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingProvider {
        seen: Mutex<Vec<(Vec<ChatMessage>, CompletionConfig)>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ClientError> {
            self.seen.lock().push((messages, config.clone()));
            Ok(CompletionResponse {
                content: "PASS".to_string(),
                usage: TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 1,
                },
                model: config.model.clone(),
                stop_reason: Some("end_turn".to_string()),
            })
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_chat_message_creation() {
        assert_eq!(ChatMessage::system("s").role, "system");
        assert_eq!(ChatMessage::user("u").role, "user");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_token_usage_total_saturates() {
        let usage = TokenUsage {
            prompt_tokens: u32::MAX,
            completion_tokens: 7,
        };
        assert_eq!(usage.total(), u32::MAX);
    }

    #[test]
    fn test_completion_config_from_settings() {
        let settings = serde_json::json!({
            "model": "gpt-4o-mini",
            "max_tokens": 64,
            "temperature": 0.5,
            "timeout": "2m"
        });
        let config = CompletionConfig::from_settings(&settings).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 64);
        assert_eq!(config.temperature, 0.5);
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_completion_config_requires_model() {
        let result = CompletionConfig::from_settings(&serde_json::json!({}));
        assert!(matches!(result, Err(ClientError::NotConfigured(_))));
    }

    #[test]
    fn test_completion_config_rejects_bad_timeout() {
        let settings = serde_json::json!({"model": "m", "timeout": "soon"});
        let err = CompletionConfig::from_settings(&settings).unwrap_err();
        assert!(err.to_string().contains("soon"));
    }

    #[tokio::test]
    async fn test_provider_client_sends_single_user_message() {
        let provider = Arc::new(RecordingProvider {
            seen: Mutex::new(Vec::new()),
        });
        let client = ProviderClient::new(provider.clone(), CompletionConfig::new("judge-model"));

        let answer = client.generate("evaluate this").await.unwrap();
        assert_eq!(answer, "PASS");
        assert_eq!(client.name(), "recording");

        let seen = provider.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, vec![ChatMessage::user("evaluate this")]);
        assert_eq!(seen[0].1.model, "judge-model");
    }
}
