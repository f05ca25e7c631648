//! Unwrapping of `claude --output-format json|stream-json` envelopes.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::AiError;

/// Maximum characters of raw output quoted in a parse error.
pub const PREVIEW_CHARS: usize = 1000;

/// Extract the suggestion payload from a buffered CLI envelope.
///
/// Preference order: `structured_output` object, `result` as a JSON string,
/// `result` as a raw object or array, then the whole payload untouched.
pub fn unwrap_envelope(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => payload_from_event(&value).unwrap_or_else(|| raw.to_string()),
        Err(err) => {
            tracing::debug!(error = %err, "Envelope parse failed, treating as raw output");
            raw.to_string()
        }
    }
}

/// Payload carried by a single envelope or `result` stream event, if any.
pub fn payload_from_event(event: &Value) -> Option<String> {
    if let Some(structured) = event.get("structured_output") {
        if structured.is_object() {
            return Some(structured.to_string());
        }
    }
    match event.get("result")? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        value @ (Value::Object(_) | Value::Array(_)) => Some(value.to_string()),
        _ => None,
    }
}

/// Streamed results are sometimes wrapped once more in `{"result": ...}`.
pub fn unwrap_nested_result(text: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return text.to_string();
    };
    if value.get("structured_output").is_some() {
        return text.to_string();
    }
    match value.get("result") {
        Some(Value::String(inner)) if !inner.is_empty() => inner.clone(),
        Some(inner @ (Value::Object(_) | Value::Array(_))) => inner.to_string(),
        _ => text.to_string(),
    }
}

/// Decode a suggestion payload, quoting a bounded preview on failure.
pub fn parse_payload<T: DeserializeOwned>(payload: &str) -> Result<T, AiError> {
    serde_json::from_str(payload.trim()).map_err(|err| AiError::Parse {
        message: err.to_string(),
        preview: truncate(payload, PREVIEW_CHARS),
    })
}

/// Truncate to `max` characters, appending "..." when anything was cut.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
