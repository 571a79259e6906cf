//! Recover a JSON object from free-form model output.

use serde_json::Value;

/// Parse model text that should contain a JSON object.
///
/// Markdown code fences are stripped first. If the remainder is not valid
/// JSON, the span from the first `{` to the last `}` is tried. Returns
/// `None` when neither parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let stripped = text.replace("```json", "").replace("```", "");
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(error = %e, "No JSON object found in model output");
            None
        }
    }
}
