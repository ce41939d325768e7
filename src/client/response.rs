//! Parsing of decomposition responses into proposition lists

use crate::error::{NormalizeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches a markdown code fence, capturing its body
static FENCE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").expect("Valid regex pattern")
});

/// Pure: remove markdown code fences around a response
///
/// When the response contains a fenced block its body is returned; otherwise
/// the trimmed response is returned unchanged.
pub fn strip_fences(raw: &str) -> &str {
    match FENCE_REGEX.captures(raw).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => raw.trim(),
    }
}

/// Pure: parse a response into propositions
///
/// The body must be a JSON array of strings. Blank entries are dropped.
pub fn parse_propositions(raw: &str) -> Result<Vec<String>> {
    let body = strip_fences(raw);
    if body.is_empty() {
        return Err(NormalizeError::Parse("empty response".to_string()));
    }

    let items: Vec<String> = serde_json::from_str(body)
        .map_err(|e| NormalizeError::Parse(format!("expected a JSON array of strings: {}", e)))?;

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}
