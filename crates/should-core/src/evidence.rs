//! Evidence collected from one checked invocation.
//!
//! An [`Evidence`] bundle is assembled once, after capture has closed, and is
//! never mutated afterwards. It is the only input the prompt builder sees.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A log record observed while capture was active.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    /// Level name (`INFO`, `WARN`, ...)
    pub level: String,

    /// Event target, usually the emitting module path
    pub target: String,

    /// Formatted message
    pub message: String,

    /// Structured fields other than the message
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,

    /// When the record was captured
    pub timestamp: DateTime<Utc>,
}

/// Log entries and printed lines accumulated between open and close of a capture.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedOutput {
    /// Log records in emission order
    pub logs: Vec<LogEntry>,

    /// Printed lines in emission order, trimmed, blank lines dropped
    pub stdout: Vec<String>,
}

/// How the wrapped function failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The function panicked
    Panic,

    /// The function returned `Err`
    Error,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Panic => write!(f, "panic"),
            FailureKind::Error => write!(f, "error"),
        }
    }
}

/// Description of a failure raised by the wrapped function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaisedFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RaisedFailure {
    pub fn panic(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Panic,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Error,
            message: message.into(),
        }
    }

    /// Describe a caught panic payload.
    pub fn from_panic_payload(payload: &(dyn Any + Send)) -> Self {
        Self::panic(panic_message(payload))
    }
}

impl fmt::Display for RaisedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Extract the message from a panic payload.
///
/// `panic!` payloads are either `&'static str` or `String`; anything else
/// (from `std::panic::panic_any`) is reported opaquely.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any> panic payload".to_string()
    }
}

/// What the wrapped function ended with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    /// Normal return, rendered with `Debug`
    Returned { value: String },

    /// Panic or `Err`
    Raised(RaisedFailure),
}

/// Immutable snapshot handed to the prompt builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    logs: Vec<LogEntry>,
    stdout: Vec<String>,
    outcome: Outcome,
}

impl Evidence {
    pub fn new(captured: CapturedOutput, outcome: Outcome) -> Self {
        Self {
            logs: captured.logs,
            stdout: captured.stdout,
            outcome,
        }
    }

    /// Evidence for a function that returned `value`.
    pub fn returned<T: fmt::Debug + ?Sized>(captured: CapturedOutput, value: &T) -> Self {
        Self::new(
            captured,
            Outcome::Returned {
                value: format!("{:?}", value),
            },
        )
    }

    /// Evidence for a function that failed.
    pub fn raised(captured: CapturedOutput, failure: RaisedFailure) -> Self {
        Self::new(captured, Outcome::Raised(failure))
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    pub fn stdout(&self) -> &[String] {
        &self.stdout
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// The failure, if the function raised one.
    pub fn raised_failure(&self) -> Option<&RaisedFailure> {
        match &self.outcome {
            Outcome::Raised(failure) => Some(failure),
            Outcome::Returned { .. } => None,
        }
    }

    /// One-line description used in error reports.
    pub fn summary(&self) -> String {
        let outcome = match &self.outcome {
            Outcome::Returned { value } => format!("returned {}", truncate(value, 120)),
            Outcome::Raised(failure) => format!("raised {}", truncate(&failure.to_string(), 120)),
        };
        format!(
            "{} log entr{}, {} printed line{}, {}",
            self.logs.len(),
            if self.logs.len() == 1 { "y" } else { "ies" },
            self.stdout.len(),
            if self.stdout.len() == 1 { "" } else { "s" },
            outcome
        )
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            level: "INFO".to_string(),
            target: "orders".to_string(),
            message: message.to_string(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_returned_uses_debug_rendering() {
        let evidence = Evidence::returned(CapturedOutput::default(), &Some("id-7"));
        assert_eq!(
            evidence.outcome(),
            &Outcome::Returned {
                value: "Some(\"id-7\")".to_string()
            }
        );
        assert!(evidence.raised_failure().is_none());
    }

    #[test]
    fn test_raised_failure_display() {
        let failure = RaisedFailure::panic("age must be >= 18");
        assert_eq!(failure.to_string(), "panic: age must be >= 18");

        let failure = RaisedFailure::error("connection refused");
        assert_eq!(failure.to_string(), "error: connection refused");
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("formatted 42"));
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");

        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert!(panic_message(payload.as_ref()).contains("Any"));
    }

    #[test]
    fn test_summary_counts_and_outcome() {
        let captured = CapturedOutput {
            logs: vec![entry("order created")],
            stdout: vec!["a".to_string(), "b".to_string()],
        };
        let evidence = Evidence::raised(captured, RaisedFailure::panic("boom"));

        let summary = evidence.summary();
        assert!(summary.contains("1 log entry"));
        assert!(summary.contains("2 printed lines"));
        assert!(summary.contains("raised panic: boom"));
    }

    #[test]
    fn test_summary_truncates_long_values() {
        let long = "x".repeat(500);
        let evidence = Evidence::returned(CapturedOutput::default(), &long);
        assert!(evidence.summary().len() < 200);
        assert!(evidence.summary().ends_with("..."));
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = Outcome::Raised(RaisedFailure::error("nope"));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "raised");
        assert_eq!(json["kind"], "error");
        assert_eq!(json["message"], "nope");
    }
}
