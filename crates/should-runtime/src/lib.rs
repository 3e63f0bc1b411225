//! # should-runtime
//!
//! LLM-checked secondary assertions.
//!
//! Some test expectations are easy to state and tedious to assert: "the logs
//! should confirm the order was created", "an error is raised because the user
//! is a minor". A check runs the code under test, captures what it logged and
//! printed along with how it ended, and asks a model whether the condition
//! holds. The model must answer `PASS` or `FAIL: <reason>`; anything else is
//! an evaluation error, never a silent pass.
//!
//! The deterministic half (capture, evidence, prompt, verdict grammar) lives
//! in `should-core` and is re-exported here.
//!
//! ## Example
//!
//! ```rust,ignore
//! use should_runtime::{cprintln, should, use_client, OpenAiCompatibleProvider};
//!
//! use_client(OpenAiCompatibleProvider::client_from_env());
//!
//! #[test]
//! fn creates_order() {
//!     should("logs should confirm order creation")
//!         .run(|| {
//!             tracing::info!(order_id = 7, "order created");
//!             cprintln!("order 7 stored");
//!         })
//!         .unwrap();
//! }
//! ```
//!
//! ## Features
//!
//! - `openai`: HTTP calls for [`OpenAiCompatibleProvider`]
//! - `anthropic`: HTTP calls for [`AnthropicProvider`]

pub mod check;
pub mod client;
pub mod config;
pub mod error;
pub mod providers;
pub mod store;

pub use client::{client_fn, ClientError, FnClient, LlmClient, StaticClient};
pub use config::{configure, configure_with, CheckOptions, ConfigError, ShouldConfig};
pub use error::{
    AssertionFailure, ConfigurationError, EvaluationError, FailureContext, ShouldError,
};
pub use providers::{
    AnthropicProvider, LlmProvider, OpenAiCompatibleProvider, ProviderClient, ProviderRegistry,
};
pub use check::{should, AsyncCheck, Should, SyncCheck};
pub use store::{clear_default_client, default_client, use_client};

pub use should_core::{
    cprint, cprintln, is_capturing, stdout, CaptureConfig, Evidence, RaisedFailure, Verdict,
};
