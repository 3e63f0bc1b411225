//! Strict parser for model verdicts.
//!
//! Accepted grammar, after trimming surrounding whitespace:
//!
//! ```text
//! PASS [anything]
//! FAIL [whitespace]* [":" | "-"]? <non-empty reason>
//! ```
//!
//! The leading token is ASCII case-insensitive and must be a whole word. At
//! most one separator is consumed; the reason is otherwise kept verbatim.
//! Everything else is [`Verdict::Malformed`]. There is no retry and no
//! guessing.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Leading verdict token followed by the rest of the answer.
    static ref VERDICT_PATTERN: Regex = Regex::new(r"(?s)^(?i-u:pass|fail)\b(.*)$").unwrap();
}

/// Outcome of parsing a model answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    /// The condition holds
    Pass,

    /// The condition does not hold, with the model's reason
    Fail { reason: String },

    /// The answer does not follow the grammar
    Malformed { raw: String },
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail { reason } => write!(f, "FAIL: {}", reason),
            Verdict::Malformed { raw } => write!(f, "MALFORMED: {:?}", raw),
        }
    }
}

/// Parse a raw model answer.
pub fn parse_verdict(raw: &str) -> Verdict {
    let malformed = || Verdict::Malformed {
        raw: raw.to_string(),
    };

    let Some(caps) = VERDICT_PATTERN.captures(raw.trim()) else {
        return malformed();
    };

    let token = &caps[1];
    if token.eq_ignore_ascii_case("pass") {
        return Verdict::Pass;
    }
    if !token.eq_ignore_ascii_case("fail") {
        return malformed();
    }

    let rest = caps[2].trim_start();
    let reason = rest
        .strip_prefix(|c: char| c == ':' || c == '-')
        .unwrap_or(rest)
        .trim();

    if reason.is_empty() {
        malformed()
    } else {
        Verdict::Fail {
            reason: reason.to_string(),
        }
    }
}
