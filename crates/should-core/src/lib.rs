//! # should-core
//!
//! Deterministic half of the `should` pipeline.
//!
//! This crate answers three questions for a single checked invocation:
//! - What did the function produce? (logs, printed lines, return value, failure)
//! - What exactly do we ask the model?
//! - What did the model decide?
//!
//! ## Key Guarantees
//!
//! 1. **No LLM calls**: the client lives in `should-runtime`
//! 2. **Scoped capture**: evidence is attributed to the invocation that produced it,
//!    even when invocations overlap on one scheduler or run on parallel threads
//! 3. **Fail closed**: any model answer outside the `PASS` / `FAIL: reason`
//!    grammar is reported as [`Verdict::Malformed`], never guessed
//!
//! ## Example
//!
//! ```rust,ignore
//! use should_core::{build_prompt, parse_verdict, CaptureConfig, CaptureContext, Evidence};
//!
//! let capture = CaptureContext::open(&CaptureConfig::default())?;
//! let value = capture.run(|| {
//!     tracing::info!("order created");
//!     42
//! });
//! let evidence = Evidence::returned(capture.close(), &value);
//!
//! let prompt = build_prompt("logs should confirm order creation", &evidence);
//! match parse_verdict(&model_answer) {
//!     Verdict::Pass => {}
//!     Verdict::Fail { reason } => println!("failed: {reason}"),
//!     Verdict::Malformed { raw } => println!("unusable answer: {raw}"),
//! }
//! ```

pub mod capture;
pub mod evidence;
pub mod prompt;
pub mod verdict;

// Re-export main types at crate root
pub use capture::{is_capturing, stdout, CaptureConfig, CaptureContext, CaptureError, CaptureStdout};
pub use evidence::{
    panic_message, CapturedOutput, Evidence, FailureKind, LogEntry, Outcome, RaisedFailure,
};
pub use prompt::{build_prompt, RESPONSE_FORMAT};
pub use verdict::{parse_verdict, Verdict};
