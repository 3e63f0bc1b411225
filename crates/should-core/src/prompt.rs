//! Evaluation prompt rendering.
//!
//! The prompt is a pure function of the condition and the evidence: the same
//! inputs always render the same text. The answer grammar it requests is the
//! one [`parse_verdict`](crate::parse_verdict) enforces.

use serde::Serialize;

use crate::evidence::{Evidence, Outcome};

/// Answer grammar requested from the model.
pub const RESPONSE_FORMAT: &str = "PASS  or  FAIL: specific reason";

const NO_LOGS: &str = "No log output";
const NO_PRINTS: &str = "No print output";

/// Render the evaluation request for `condition` over `evidence`.
pub fn build_prompt(condition: &str, evidence: &Evidence) -> String {
    let logs = if evidence.logs().is_empty() {
        NO_LOGS.to_string()
    } else {
        pretty_json(evidence.logs())
    };

    let prints = if evidence.stdout().is_empty() {
        NO_PRINTS.to_string()
    } else {
        pretty_json(evidence.stdout())
    };

    let result = match evidence.outcome() {
        Outcome::Returned { value } => value.clone(),
        Outcome::Raised(failure) => format!("exception raised: {}", failure),
    };

    format!(
        "A test function has just finished running. Expected condition: \"{condition}\"\n\
         \n\
         Execution logs (chronological):\n\
         {logs}\n\
         \n\
         Print outputs:\n\
         {prints}\n\
         \n\
         Function return result:\n\
         {result}\n\
         \n\
         Judge whether the expected condition is satisfied, using only the logs, \
         print outputs and return result above. Response format:\n\
         {RESPONSE_FORMAT}\n\
         No additional explanation needed.\n"
    )
}

fn pretty_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("<serialization failed: {e}>"))
}
