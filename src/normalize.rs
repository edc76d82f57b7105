//! Cleanup and parsing of raw model text into JSON.
//!
//! The model is asked for bare JSON but frequently wraps it in a fenced code
//! block, sometimes with a `json` language tag, and sometimes emits escaped
//! newlines or stray backslashes. Cleanup is deliberately blunt: every
//! literal `\n` sequence and every backslash is removed before parsing, which
//! also mangles legitimately escaped characters inside string values
//! (`\"`, `\\`, `\u0627`).

use serde_json::Value;
use thiserror::Error;

const FENCE: &str = "```";
const LANGUAGE_TAG: &str = "json";

/// Model output that is not valid JSON after cleanup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to parse response as JSON. Error: {diagnostic}")]
pub struct NormalizationFailure {
    /// Text after cleanup, as handed to the parser.
    pub fragment: String,
    /// Parser error message, including line and column.
    pub diagnostic: String,
}

/// Clean raw model text and parse it as JSON.
pub fn normalize(raw: &str) -> Result<Value, NormalizationFailure> {
    let cleaned = clean(raw);

    serde_json::from_str(&cleaned).map_err(|e| NormalizationFailure {
        diagnostic: e.to_string(),
        fragment: cleaned,
    })
}

/// Apply the text cleanup steps without parsing.
pub fn clean(raw: &str) -> String {
    strip_fence(raw)
        .trim()
        .replace("\\n", "")
        .replace('\\', "")
}

/// Keep only the body of the first fenced block, minus a leading `json` tag.
/// An unclosed fence keeps everything after the opening marker.
fn strip_fence(text: &str) -> &str {
    let Some(body) = text.split(FENCE).nth(1) else {
        return text;
    };
    body.strip_prefix(LANGUAGE_TAG).unwrap_or(body)
}
