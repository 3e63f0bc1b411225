//! The LLM client capability.
//!
//! A check needs exactly one thing from a model: turn a prompt into text.
//! Anything implementing [`LlmClient`] can back a check, whether it is an
//! HTTP provider (see [`ProviderClient`](crate::providers::ProviderClient)),
//! a local model, or a canned answer in a test.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

/// Errors from LLM clients.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

/// Text-in, text-out model capability.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate the model's answer to `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ClientError>;

    /// Client name for diagnostics.
    fn name(&self) -> &str {
        "llm"
    }
}

/// Client that always answers with the same text.
///
/// Records every prompt it receives, which makes it the usual stand-in for a
/// model in tests.
#[derive(Debug)]
pub struct StaticClient {
    response: String,
    prompts: Mutex<Vec<String>>,
}

impl StaticClient {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Convenience constructor returning the shared handle checks expect.
    pub fn shared(response: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(response))
    }

    /// Number of prompts received.
    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }

    /// The most recent prompt, if any.
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }

    /// All prompts received, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmClient for StaticClient {
    async fn generate(&self, prompt: &str) -> Result<String, ClientError> {
        self.prompts.lock().push(prompt.to_string());
        Ok(self.response.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Client backed by a closure over the prompt.
pub struct FnClient<F> {
    name: String,
    f: F,
    calls: AtomicUsize,
}

impl<F> FnClient<F>
where
    F: Fn(&str) -> Result<String, ClientError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of prompts received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> std::fmt::Debug for FnClient<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnClient")
            .field("name", &self.name)
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> LlmClient for FnClient<F>
where
    F: Fn(&str) -> Result<String, ClientError> + Send + Sync,
{
    async fn generate(&self, prompt: &str) -> Result<String, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(prompt)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Build a shared client from a closure.
pub fn client_fn<F>(f: F) -> Arc<FnClient<F>>
where
    F: Fn(&str) -> Result<String, ClientError> + Send + Sync,
{
    Arc::new(FnClient::new("fn", f))
}
