//! OpenAI-compatible chat completion provider (`{base_url}/chat/completions`).
//!
//! Covers OpenAI itself and any server speaking the same protocol (Ollama,
//! LM Studio, vLLM, hosted gateways). The wire types are private to this
//! module. The API key is optional so keyless local servers work.

#![cfg_attr(not(feature = "openai"), allow(dead_code))]

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::{
    factory::ProviderFactory, secrets::ApiCredential, ChatMessage, CompletionConfig,
    CompletionResponse, LlmProvider, ProviderClient, TokenUsage,
};
use crate::client::{ClientError, LlmClient};

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL_ENV: &str = "OPENAI_MODEL";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Provider for any `/chat/completions` endpoint.
#[derive(Debug)]
pub struct OpenAiCompatibleProvider {
    credential: Option<ApiCredential>,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    /// `api_key` is `None` for keyless local models; otherwise it is sent as
    /// `Authorization: Bearer <key>`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            credential: api_key.map(|key| {
                ApiCredential::new(
                    key,
                    super::CredentialSource::Programmatic,
                    "OpenAI API key",
                )
            }),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create from `OPENAI_API_KEY` (optional) and `OPENAI_BASE_URL`.
    pub fn from_env() -> Self {
        let credential = ApiCredential::from_env(OPENAI_API_KEY_ENV, "OpenAI API key").ok();
        let base_url = std::env::var(OPENAI_BASE_URL_ENV)
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        Self {
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from provider settings with environment fallbacks.
    pub fn from_config(config: &JsonValue) -> Result<Self, ClientError> {
        let credential = if ApiCredential::is_available(config, "api_key", OPENAI_API_KEY_ENV) {
            Some(ApiCredential::from_config_or_env(
                config,
                "api_key",
                OPENAI_API_KEY_ENV,
                "OpenAI API key",
            )?)
        } else {
            None
        };

        let base_url = match config["base_url"].as_str() {
            Some(url) => url.to_string(),
            None => std::env::var(OPENAI_BASE_URL_ENV)
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };

        Ok(Self {
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// A ready check client built entirely from the environment.
    ///
    /// The model comes from `OPENAI_MODEL`, defaulting to `gpt-4o-mini`.
    pub fn client_from_env() -> Arc<dyn LlmClient> {
        let model = std::env::var(OPENAI_MODEL_ENV).unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Arc::new(ProviderClient::new(
            Arc::new(Self::from_env()),
            CompletionConfig::new(model),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsageData {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn build_request(messages: Vec<ChatMessage>, config: &CompletionConfig) -> ChatCompletionRequest {
    // gpt-5 family models reject an explicit temperature.
    let temperature = if config.model.starts_with("gpt-5") {
        None
    } else {
        Some(config.temperature)
    };

    ChatCompletionRequest {
        model: config.model.clone(),
        messages,
        max_tokens: config.max_tokens,
        temperature,
    }
}

fn into_completion(
    body: ChatCompletionResponse,
    config: &CompletionConfig,
) -> Result<CompletionResponse, ClientError> {
    let usage = body
        .usage
        .map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        })
        .unwrap_or_default();

    let choice = body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ClientError::ParseError("response has no choices".to_string()))?;

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        usage,
        model: body.model.unwrap_or_else(|| config.model.clone()),
        stop_reason: choice.finish_reason,
    })
}

/// Error message from a non-success body, using the OpenAI envelope when present.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| env.error.message)
        .unwrap_or_else(|_| body.to_string())
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    #[cfg(feature = "openai")]
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ClientError> {
        let payload = build_request(messages, config);

        tracing::debug!(
            model = %payload.model,
            temperature = ?payload.temperature,
            endpoint = %self.endpoint(),
            "sending completion request"
        );

        let mut request = super::http_client()
            .post(self.endpoint())
            .timeout(config.timeout)
            .json(&payload);
        if let Some(credential) = &self.credential {
            request = request.bearer_auth(credential.expose());
        }

        let response = request
            .send()
            .await
            .map_err(|e| super::transport_error(e, config))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited {
                retry_after: super::retry_after(&response),
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ClientError::AuthError);
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read error body>".to_string());
            let message = error_message(&body);
            tracing::warn!(%status, %message, "completion request returned HTTP error");
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(e.to_string()))?;

        into_completion(body, config)
    }

    #[cfg(not(feature = "openai"))]
    async fn complete(
        &self,
        _messages: Vec<ChatMessage>,
        _config: &CompletionConfig,
    ) -> Result<CompletionResponse, ClientError> {
        Err(ClientError::NotConfigured(
            "OpenAI-compatible provider requires 'openai' feature".to_string(),
        ))
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Factory for `type: openai`.
///
/// ```json
/// {
///   "api_key": "sk-...",                      // optional, falls back to OPENAI_API_KEY
///   "base_url": "http://localhost:11434/v1",  // optional, falls back to OPENAI_BASE_URL
///   "model": "gpt-4o-mini"
/// }
/// ```
pub struct OpenAiProviderFactory;

impl ProviderFactory for OpenAiProviderFactory {
    fn provider_type(&self) -> &'static str {
        "openai"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ClientError> {
        Ok(Arc::new(OpenAiCompatibleProvider::from_config(config)?))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), ClientError> {
        super::validate_base_url(config)
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({"model": DEFAULT_MODEL})
    }

    fn description(&self) -> &'static str {
        "OpenAI and OpenAI-compatible chat completion servers"
    }
}
