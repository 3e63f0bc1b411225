//! Error taxonomy for checked calls.
//!
//! - [`ConfigurationError`]: nothing to evaluate with; raised before the
//!   wrapped function runs
//! - [`AssertionFailure`]: the model said `FAIL`
//! - [`EvaluationError`]: the checking mechanism itself broke (unusable
//!   answer, client error, timeout); never confused with a test failure
//! - [`ShouldError::Function`]: the wrapped function's own `Err`, surfaced
//!   after a `PASS`
//!
//! When the wrapped function failed *and* the check reports a failure, the
//! two are chained: the report carries the original failure in
//! [`FailureContext::original_failure`].

use std::fmt;
use std::time::Duration;

use should_core::{CaptureError, Evidence, RaisedFailure};
use thiserror::Error;

use crate::client::ClientError;

/// Everything needed to diagnose a failed check without re-running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    /// The natural-language condition
    pub condition: String,

    /// One-line evidence summary
    pub evidence: String,

    /// The wrapped function's own failure, if it had one
    pub original_failure: Option<RaisedFailure>,
}

impl FailureContext {
    pub fn new(condition: &str, evidence: &Evidence) -> Self {
        Self {
            condition: condition.to_string(),
            evidence: evidence.summary(),
            original_failure: evidence.raised_failure().cloned(),
        }
    }
}

impl fmt::Display for FailureContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " [condition: \"{}\"; evidence: {}]",
            self.condition, self.evidence
        )?;
        if let Some(original) = &self.original_failure {
            write!(f, " (wrapped function also failed: {})", original)?;
        }
        Ok(())
    }
}

/// No usable client or capture.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("No LLM client configured: call should_runtime::use_client(..) or pass one with Should::with_client(..)")]
    NoClient,

    #[error("Capture could not be attached: {0}")]
    Capture(#[from] CaptureError),
}

/// The model judged the condition unmet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionFailure {
    reason: String,
    context: FailureContext,
}

impl AssertionFailure {
    pub fn new(reason: impl Into<String>, context: FailureContext) -> Self {
        Self {
            reason: reason.into(),
            context,
        }
    }

    /// The model's reason, verbatim.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn condition(&self) -> &str {
        &self.context.condition
    }

    pub fn context(&self) -> &FailureContext {
        &self.context
    }

    pub fn original_failure(&self) -> Option<&RaisedFailure> {
        self.context.original_failure.as_ref()
    }
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AI assertion failed: {}{}", self.reason, self.context)
    }
}

impl std::error::Error for AssertionFailure {}

/// The check could not reach a verdict.
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Model response does not follow the PASS/FAIL grammar: {raw:?}{context}")]
    Malformed { raw: String, context: FailureContext },

    #[error("LLM client '{client}' failed: {source}{context}")]
    Client {
        client: String,
        source: ClientError,
        context: FailureContext,
    },

    #[error("LLM client '{client}' did not answer within {limit:?}{context}")]
    Timeout {
        client: String,
        limit: Duration,
        context: FailureContext,
    },

    #[error("Synchronous check cannot block inside a current-thread Tokio runtime; use run_async{context}")]
    BlockingUnavailable { context: FailureContext },

    #[error("Failed to start a runtime for the LLM call: {source}{context}")]
    Runtime {
        source: std::io::Error,
        context: FailureContext,
    },
}

impl EvaluationError {
    pub fn context(&self) -> &FailureContext {
        match self {
            EvaluationError::Malformed { context, .. }
            | EvaluationError::Client { context, .. }
            | EvaluationError::Timeout { context, .. }
            | EvaluationError::BlockingUnavailable { context }
            | EvaluationError::Runtime { context, .. } => context,
        }
    }
}

/// Error returned by a checked call.
#[derive(Error, Debug)]
pub enum ShouldError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error("Wrapped function failed: {0:#}")]
    Function(anyhow::Error),
}

impl ShouldError {
    /// Whether this is a model `FAIL` verdict.
    pub fn is_assertion(&self) -> bool {
        matches!(self, ShouldError::Assertion(_))
    }

    /// The model's reason, for `FAIL` verdicts.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ShouldError::Assertion(failure) => Some(failure.reason()),
            _ => None,
        }
    }
}
