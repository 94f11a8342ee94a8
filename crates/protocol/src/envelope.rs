//! Decoding of server answers.
//!
//! Entry responses come either wrapped (`{"fileEntry": {...}}`,
//! `{"folder": {...}}`, `{"data": {...}}`) or as a bare entry object.
//! Error responses follow `{"message": "...", "errors": {"field": [...]}}`.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::constants::MAX_ERROR_BODY_CHARS;
use crate::types::FileEntry;

/// Keys under which the server nests a single entry, in lookup order.
const ENTRY_KEYS: [&str; 3] = ["fileEntry", "folder", "data"];

/// Errors produced while decoding API payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response does not contain a file entry")]
    MissingEntry,

    #[error("invalid token: {0}")]
    InvalidToken(String),
}

/// Decodes a file entry from a success response body.
pub fn decode_entry(body: &[u8]) -> Result<FileEntry, ProtocolError> {
    let value: serde_json::Value = serde_json::from_slice(body)?;
    let serde_json::Value::Object(mut map) = value else {
        return Err(ProtocolError::MissingEntry);
    };

    for key in ENTRY_KEYS {
        if let Some(inner @ serde_json::Value::Object(_)) = map.remove(key) {
            return Ok(serde_json::from_value(inner)?);
        }
    }

    if map.contains_key("id") {
        return Ok(serde_json::from_value(serde_json::Value::Object(map))?);
    }
    Err(ProtocolError::MissingEntry)
}

/// Structured error body returned with 4xx/5xx statuses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    /// Field name -> message(s). Values are usually arrays of strings but
    /// some endpoints send a single string.
    #[serde(default)]
    pub errors: BTreeMap<String, serde_json::Value>,
}

impl ApiErrorBody {
    /// Parses an error body; `None` when it is not the structured shape.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .filter(|b| b.message.is_some() || !b.errors.is_empty())
    }

    /// Flattens field errors into `"field: message"` lines, sorted by field.
    pub fn field_errors(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for (field, value) in &self.errors {
            match value {
                serde_json::Value::Array(items) => {
                    for item in items {
                        lines.push(format!("{field}: {}", value_text(item)));
                    }
                }
                other => lines.push(format!("{field}: {}", value_text(other))),
            }
        }
        lines
    }
}

fn value_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Produces a one-line message for an error response.
///
/// Uses the structured `message` when present, otherwise the first
/// [`MAX_ERROR_BODY_CHARS`] characters of the raw body.
pub fn summarize_error(status: u16, body: &[u8]) -> String {
    if let Some(parsed) = ApiErrorBody::parse(body) {
        if let Some(message) = parsed.message {
            return message;
        }
        if let Some(first) = parsed.field_errors().into_iter().next() {
            return first;
        }
    }

    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        return format!("HTTP {status}");
    }
    text.chars().take(MAX_ERROR_BODY_CHARS).collect()
}
