//! Salvage-and-parse for model replies.
//!
//! Models often wrap JSON in code fences or surround it with prose. We apply one
//! narrow heuristic (strip a fence, cut the outermost `{...}` or `[...]`) and then
//! parse. Anything that still fails is reported as `MalformedResponse`, carrying the
//! raw and cleaned text for diagnosis. There is no further repair.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct MalformedResponse {
  pub reason: String,
  pub raw: String,
  pub cleaned: String,
}

/// Parse raw model output into a JSON value.
pub fn extract_structured(raw: &str) -> Result<Value, MalformedResponse> {
  let cleaned = strip_fences(raw.trim());
  let candidate = outermost_json(cleaned);
  serde_json::from_str::<Value>(candidate).map_err(|e| MalformedResponse {
    reason: format!("JSON parse error: {e}"),
    raw: raw.to_string(),
    cleaned: cleaned.to_string(),
  })
}

/// Extract and deserialize into `T`. Shape mismatches are malformed replies too.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T, MalformedResponse> {
  let value = extract_structured(raw)?;
  serde_json::from_value::<T>(value).map_err(|e| MalformedResponse {
    reason: format!("unexpected reply shape: {e}"),
    raw: raw.to_string(),
    cleaned: strip_fences(raw.trim()).to_string(),
  })
}

impl MalformedResponse {
  /// A reply that parsed but failed a per-status field check.
  pub fn invalid_shape(reason: impl Into<String>, raw: &str) -> Self {
    Self {
      reason: reason.into(),
      raw: raw.to_string(),
      cleaned: strip_fences(raw.trim()).to_string(),
    }
  }
}

/// Remove a single leading ``` / ```json opener and a single trailing ``` fence.
fn strip_fences(text: &str) -> &str {
  let mut s = text;
  if let Some(rest) = s.strip_prefix("```") {
    s = rest.strip_prefix("json").unwrap_or(rest).trim_start();
  }
  if let Some(rest) = s.strip_suffix("```") {
    s = rest.trim_end();
  }
  s
}

/// First `{` to last `}`, else first `[` to last `]`, else the whole text.
fn outermost_json(text: &str) -> &str {
  let span = |open: char, close: char| match (text.find(open), text.rfind(close)) {
    (Some(start), Some(end)) if start < end => Some(&text[start..=end]),
    _ => None,
  };
  span('{', '}').or_else(|| span('[', ']')).unwrap_or(text)
}
