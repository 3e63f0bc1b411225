//! The checked-call wrapper.
//!
//! [`should`] builds a check for one natural-language condition. Running a
//! function through it captures what the function logs and prints, records
//! how it ended, asks the model whether the condition holds, and turns the
//! answer into a result:
//!
//! | function   | verdict   | result                                            |
//! |------------|-----------|---------------------------------------------------|
//! | returned   | PASS      | `Ok(value)`                                       |
//! | panicked   | PASS      | the original panic is resumed                     |
//! | `Err(e)`   | PASS      | `Err(ShouldError::Function(e))`                   |
//! | any        | FAIL      | `Err(ShouldError::Assertion(..))`                 |
//! | any        | malformed | `Err(ShouldError::Evaluation(Malformed { .. }))`  |
//!
//! Sync and async callers get separate entry points; a sync check never
//! needs an executor of its own making, and an async check never blocks.

use std::any::Any;
use std::fmt::Debug;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use should_core::{
    build_prompt, parse_verdict, CaptureContext, CapturedOutput, Evidence, RaisedFailure, Verdict,
};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::client::LlmClient;
use crate::config::CheckOptions;
use crate::error::{
    AssertionFailure, ConfigurationError, EvaluationError, FailureContext, ShouldError,
};
use crate::store;

/// Start a check for `condition`.
///
/// ```rust,ignore
/// should("logs should confirm order creation").run(|| {
///     tracing::info!(order_id = 7, "order created");
/// })?;
/// ```
pub fn should(condition: impl Into<String>) -> Should {
    Should::new(condition)
}

/// A natural-language condition plus how to evaluate it.
#[derive(Clone)]
pub struct Should {
    condition: Arc<str>,
    client: Option<Arc<dyn LlmClient>>,
    options: CheckOptions,
}

impl std::fmt::Debug for Should {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Should")
            .field("condition", &self.condition)
            .field("client", &self.client.as_ref().map(|c| c.name().to_string()))
            .field("options", &self.options)
            .finish()
    }
}

impl Should {
    pub fn new(condition: impl Into<String>) -> Self {
        Self {
            condition: Arc::from(condition.into()),
            client: None,
            options: CheckOptions::default(),
        }
    }

    /// Use `client` for this check instead of the process-wide default.
    pub fn with_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    /// Bound the model call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn condition(&self) -> &str {
        &self.condition
    }

    pub fn options(&self) -> &CheckOptions {
        &self.options
    }

    /// Run `f` once under the check.
    pub fn run<T, F>(&self, f: F) -> Result<T, ShouldError>
    where
        T: Debug,
        F: FnOnce() -> T,
    {
        self.check_sync(|| Ok(f()))
    }

    /// Run a fallible `f` once under the check.
    ///
    /// `Err` is evidence like any other outcome; after a `PASS` it is
    /// returned as [`ShouldError::Function`].
    pub fn try_run<T, E, F>(&self, f: F) -> Result<T, ShouldError>
    where
        T: Debug,
        E: Into<anyhow::Error>,
        F: FnOnce() -> Result<T, E>,
    {
        self.check_sync(|| f().map_err(Into::into))
    }

    /// Await `fut` once under the check.
    pub async fn run_async<T, Fut>(&self, fut: Fut) -> Result<T, ShouldError>
    where
        T: Debug,
        Fut: Future<Output = T>,
    {
        self.check_async(fut.map(Ok)).await
    }

    /// Await a fallible `fut` once under the check.
    pub async fn try_run_async<T, E, Fut>(&self, fut: Fut) -> Result<T, ShouldError>
    where
        T: Debug,
        E: Into<anyhow::Error>,
        Fut: Future<Output = Result<T, E>>,
    {
        self.check_async(fut.map(|r| r.map_err(Into::into))).await
    }

    /// Keep `f` for repeated checked calls.
    pub fn wrap<F>(self, f: F) -> SyncCheck<F> {
        SyncCheck { should: self, f }
    }

    /// Keep an async `f` for repeated checked calls.
    pub fn wrap_async<F>(self, f: F) -> AsyncCheck<F> {
        AsyncCheck { should: self, f }
    }

    fn prepare(&self) -> Result<(Evaluator<'_>, CaptureContext), ShouldError> {
        let client = store::resolve(self.client.as_ref()).ok_or(ConfigurationError::NoClient)?;
        let capture =
            CaptureContext::open(&self.options.capture).map_err(ConfigurationError::from)?;

        tracing::debug!(
            condition = %self.condition,
            client = client.name(),
            "running checked call"
        );

        Ok((
            Evaluator {
                condition: &self.condition,
                client,
                timeout: self.options.timeout,
            },
            capture,
        ))
    }

    fn check_sync<T, F>(&self, f: F) -> Result<T, ShouldError>
    where
        T: Debug,
        F: FnOnce() -> anyhow::Result<T>,
    {
        let (evaluator, capture) = self.prepare()?;

        let caught = panic::catch_unwind(AssertUnwindSafe(|| capture.run(f)));
        let (completion, evidence) = Completion::settle(caught, capture.close());

        let answer = evaluator.generate_blocking(&evidence);
        evaluator.decide(answer, completion, &evidence)
    }

    async fn check_async<T, Fut>(&self, fut: Fut) -> Result<T, ShouldError>
    where
        T: Debug,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let (evaluator, capture) = self.prepare()?;

        let caught = capture.scope(AssertUnwindSafe(fut).catch_unwind()).await;
        let (completion, evidence) = Completion::settle(caught, capture.close());

        let answer = evaluator.generate(&evidence).await;
        evaluator.decide(answer, completion, &evidence)
    }
}

/// A check bound to a sync function, callable many times.
#[derive(Debug, Clone)]
pub struct SyncCheck<F> {
    should: Should,
    f: F,
}

impl<F> SyncCheck<F> {
    pub fn should(&self) -> &Should {
        &self.should
    }

    pub fn call<T>(&self) -> Result<T, ShouldError>
    where
        T: Debug,
        F: Fn() -> T,
    {
        self.should.run(&self.f)
    }

    /// Call with one argument; use a tuple for several.
    pub fn call_with<A, T>(&self, arg: A) -> Result<T, ShouldError>
    where
        T: Debug,
        F: Fn(A) -> T,
    {
        self.should.run(|| (self.f)(arg))
    }
}

/// A check bound to an async function, callable many times.
#[derive(Debug, Clone)]
pub struct AsyncCheck<F> {
    should: Should,
    f: F,
}

impl<F> AsyncCheck<F> {
    pub fn should(&self) -> &Should {
        &self.should
    }

    pub async fn call<T, Fut>(&self) -> Result<T, ShouldError>
    where
        T: Debug,
        F: Fn() -> Fut,
        Fut: Future<Output = T>,
    {
        self.should.run_async((self.f)()).await
    }

    /// Call with one argument; use a tuple for several.
    pub async fn call_with<A, T, Fut>(&self, arg: A) -> Result<T, ShouldError>
    where
        T: Debug,
        F: Fn(A) -> Fut,
        Fut: Future<Output = T>,
    {
        self.should.run_async((self.f)(arg)).await
    }
}

/// How the wrapped function ended, kept until the verdict decides what to
/// hand back.
enum Completion<T> {
    Value(T),
    Error(anyhow::Error),
    Panic(Box<dyn Any + Send>),
}

impl<T: Debug> Completion<T> {
    fn settle(
        caught: Result<anyhow::Result<T>, Box<dyn Any + Send>>,
        captured: CapturedOutput,
    ) -> (Self, Evidence) {
        match caught {
            Ok(Ok(value)) => {
                let evidence = Evidence::returned(captured, &value);
                (Completion::Value(value), evidence)
            }
            Ok(Err(err)) => {
                let evidence = Evidence::raised(captured, RaisedFailure::error(format!("{:#}", err)));
                (Completion::Error(err), evidence)
            }
            Err(payload) => {
                let evidence =
                    Evidence::raised(captured, RaisedFailure::from_panic_payload(payload.as_ref()));
                (Completion::Panic(payload), evidence)
            }
        }
    }
}

/// Client call, parse, and decision for one invocation.
struct Evaluator<'a> {
    condition: &'a str,
    client: Arc<dyn LlmClient>,
    timeout: Option<Duration>,
}

impl Evaluator<'_> {
    fn context(&self, evidence: &Evidence) -> FailureContext {
        FailureContext::new(self.condition, evidence)
    }

    async fn generate(&self, evidence: &Evidence) -> Result<String, EvaluationError> {
        let prompt = build_prompt(self.condition, evidence);
        let call = self.client.generate(&prompt);

        let answer = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                EvaluationError::Timeout {
                    client: self.client.name().to_string(),
                    limit,
                    context: self.context(evidence),
                }
            })?,
            None => call.await,
        };

        answer.map_err(|source| EvaluationError::Client {
            client: self.client.name().to_string(),
            source,
            context: self.context(evidence),
        })
    }

    /// Drive [`generate`](Self::generate) to completion on this thread.
    fn generate_blocking(&self, evidence: &Evidence) -> Result<String, EvaluationError> {
        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => Err(EvaluationError::BlockingUnavailable {
                    context: self.context(evidence),
                }),
                _ => tokio::task::block_in_place(|| handle.block_on(self.generate(evidence))),
            },
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|source| EvaluationError::Runtime {
                        source,
                        context: self.context(evidence),
                    })?;
                runtime.block_on(self.generate(evidence))
            }
        }
    }

    fn decide<T>(
        &self,
        answer: Result<String, EvaluationError>,
        completion: Completion<T>,
        evidence: &Evidence,
    ) -> Result<T, ShouldError> {
        let raw = answer.map_err(|err| {
            tracing::warn!(condition = %self.condition, error = %err, "check could not be evaluated");
            err
        })?;

        match parse_verdict(&raw) {
            Verdict::Pass => {
                tracing::info!(condition = %self.condition, "check passed");
                match completion {
                    Completion::Value(value) => Ok(value),
                    Completion::Error(err) => Err(ShouldError::Function(err)),
                    Completion::Panic(payload) => panic::resume_unwind(payload),
                }
            }
            Verdict::Fail { reason } => {
                tracing::warn!(condition = %self.condition, reason = %reason, "check failed");
                Err(AssertionFailure::new(reason, self.context(evidence)).into())
            }
            Verdict::Malformed { raw } => {
                tracing::warn!(condition = %self.condition, raw = %raw, "unusable model answer");
                Err(EvaluationError::Malformed {
                    raw,
                    context: self.context(evidence),
                }
                .into())
            }
        }
    }
}
