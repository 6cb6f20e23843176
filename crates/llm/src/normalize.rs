//! Post-processing of raw model replies.
//!
//! Replies are normalized in three steps: strip a Markdown code fence when the
//! whole reply is fenced, try a JSON parse, and pull a named string field out
//! of a JSON object. Anything that does not parse is returned untouched.

use serde_json::Value;
use tracing::warn;

/// Field that chat prompts ask the model to put its answer in.
pub const DEFAULT_RESPONSE_FIELD: &str = "response";

/// A normalized model reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Text to show the user.
    pub text: String,
    /// Parsed JSON value, when the (unfenced) reply was valid JSON.
    pub structured: Option<Value>,
    /// Whether a surrounding code fence was removed.
    pub fenced: bool,
}

/// Normalize a reply, extracting `field` from a JSON object when present.
pub fn normalize_response(raw: &str, field: &str) -> Normalized {
    let (body, fenced) = match strip_code_fence(raw) {
        Some(inner) => (inner, true),
        None => (raw, false),
    };

    let structured = match serde_json::from_str::<Value>(body.trim()) {
        Ok(value) => value,
        Err(_) => {
            if fenced {
                warn!("fenced reply is not valid JSON, returning raw text");
            }
            return Normalized {
                text: raw.to_string(),
                structured: None,
                fenced: false,
            };
        }
    };

    // Plain JSON strings and numbers are indistinguishable from prose answers.
    if !structured.is_object() && !structured.is_array() {
        return Normalized {
            text: raw.to_string(),
            structured: None,
            fenced: false,
        };
    }

    let text = match structured.get(field).and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None => body.trim().to_string(),
    };

    Normalized {
        text,
        structured: Some(structured),
        fenced,
    }
}

/// Return the content of a reply that is entirely wrapped in a ``` fence.
/// The opening fence may carry a language tag (```json).
pub fn strip_code_fence(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    let after_open = trimmed.strip_prefix("```")?;
    let inner = after_open.strip_suffix("```")?;

    // Skip past any language identifier on the opening line
    match inner.find('\n') {
        Some(newline) => {
            let tag = &inner[..newline];
            if tag.trim().chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                Some(inner[newline + 1..].trim())
            } else {
                Some(inner.trim())
            }
        }
        None => Some(inner.trim()),
    }
}
