//! Tolerant parsing of vision-model output.
//!
//! Models are told to answer with bare JSON but still wrap it in markdown
//! fences from time to time. Fences are stripped before parsing; nothing else
//! is repaired, and a payload that does not parse is reported with its raw text.
use super::ExtractionError;
use crate::schema::IdentificationRecord;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("valid fence pattern")
});
static OPENING_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^```[ \t]*[A-Za-z0-9_+-]*[ \t]*\r?\n?").expect("valid fence pattern")
});

/// Parse raw model text into a validated identification record.
pub fn parse_identification(raw: &str) -> Result<IdentificationRecord, ExtractionError> {
    let json_text = strip_code_fences(raw);
    let value: Value =
        serde_json::from_str(json_text).map_err(|err| ExtractionError::MalformedOutput {
            raw_text: raw.to_string(),
            detail: err.to_string(),
        })?;
    IdentificationRecord::from_json(&value)
        .map_err(|violations| ExtractionError::SchemaViolation { violations })
}

/// Remove markdown code fences (with an optional language tag) around JSON.
pub fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();

    if let Some(inner) = FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
    {
        return inner.as_str().trim();
    }

    // Unterminated fences: strip whichever marker is present
    let text = match OPENING_FENCE.find(text) {
        Some(opening) => &text[opening.end()..],
        None => text,
    };
    text.strip_suffix("```").unwrap_or(text).trim()
}
