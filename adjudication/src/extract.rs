//! Tolerant JSON extraction from LLM responses.
//!
//! Models wrap their JSON in markdown fences, prose, or both. Extraction is
//! layered: direct parse, then fenced code block, then balanced-brace scan.
//! Field presence and numeric ranges are validated by the caller as a
//! separate step, so the heuristics stay independently testable.

use serde_json::Value;
use thiserror::Error;

/// Errors from locating or validating JSON in a model response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("could not find JSON object in response")]
    NoJson,

    #[error("missing required fields: {0:?}")]
    MissingFields(Vec<String>),
}

/// Locate and parse the first JSON object in `text`.
///
/// Tries, in order: the whole (trimmed) text, the body of the first fenced
/// code block, and the first balanced `{...}` span.
pub fn extract_json(text: &str) -> Result<Value, ExtractError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    if let Some(block) = fenced_block(text) {
        if let Ok(value) = serde_json::from_str::<Value>(block) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    if let Some(candidate) = balanced_object(text) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                return Ok(value);
            }
        }
    }

    Err(ExtractError::NoJson)
}

/// Clamp a parsed score into the unit interval.
pub fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Read an optional numeric field.
pub fn optional_f64(value: &Value, field: &str) -> Option<f64> {
    value.get(field).and_then(Value::as_f64)
}

/// Read an optional boolean field.
pub fn optional_bool(value: &Value, field: &str) -> Option<bool> {
    value.get(field).and_then(Value::as_bool)
}

/// Read an optional string field.
pub fn optional_str<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

/// Body of the first ``` fenced block, with any language tag stripped.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after = &text[start + 3..];
    // The fence line may carry a language tag ("```json"); skip to its end.
    let body_start = after.find('\n')? + 1;
    let body = &after[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// First balanced `{...}` span, string- and escape-aware.
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes().iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bare_json() {
        let value = extract_json(r#"{"score": 0.9}"#).unwrap();
        assert_eq!(value["score"], 0.9);
    }

    #[test]
    fn extracts_fenced_json() {
        let text = "Here is my judgment:\n```json\n{\"score\": 0.4}\n```\nDone.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["score"], 0.4);
    }

    #[test]
    fn extracts_fence_without_language_tag() {
        let text = "```\n{\"approved\": true}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["approved"], true);
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let text = "I think {\"approved\": false, \"reasoning\": \"missing tests\"} covers it";
        let value = extract_json(text).unwrap();
        assert_eq!(value["approved"], false);
    }

    #[test]
    fn brace_scan_handles_nested_objects_and_strings() {
        let text = r#"prefix {"a": {"b": "} not a close"}, "c": 1} suffix"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["c"], 1);
        assert_eq!(value["a"]["b"], "} not a close");
    }

    #[test]
    fn no_json_is_an_error() {
        assert_eq!(extract_json("no structured data here"), Err(ExtractError::NoJson));
    }

    #[test]
    fn top_level_array_is_not_an_object() {
        assert_eq!(extract_json("[1, 2, 3]"), Err(ExtractError::NoJson));
    }

    #[test]
    fn clamp_unit_bounds() {
        assert_eq!(clamp_unit(-0.5), 0.0);
        assert_eq!(clamp_unit(0.5), 0.5);
        assert_eq!(clamp_unit(1.7), 1.0);
    }
}
