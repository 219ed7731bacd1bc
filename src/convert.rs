//! Conversion helpers between JSON tool arguments, rows and display text.

use serde_json::{Map, Value as JsonValue};

use crate::db::Row;
use crate::error::{McpError, Result};
use crate::llm::ChatMessage;

/// Longest error text shown to a tool caller.
pub const MAX_ERROR_DISPLAY_CHARS: usize = 500;

/// Render rows as 2-space-indented JSON.
pub fn rows_to_pretty_json(rows: &[Row]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
}

/// Truncate `text` to at most `max` characters, on a char boundary.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Short form of `text` for log lines: the first `max` characters plus `...` when cut.
pub fn preview(text: &str, max: usize) -> String {
    let cut = truncate(text, max);
    if cut.len() < text.len() {
        format!("{}...", cut)
    } else {
        cut.to_string()
    }
}

/// Parse a conversation history from a JSON array of `{role, content}` objects.
pub fn history_from_json(value: &JsonValue, name: &str) -> Result<Vec<ChatMessage>> {
    serde_json::from_value(value.clone()).map_err(|e| McpError::InvalidArg {
        name: name.to_string(),
        reason: format!("expected an array of {{role, content}} objects: {}", e),
    })
}

/// Helper to get a required string argument from JSON arguments.
pub fn get_string_arg(args: &Map<String, JsonValue>, name: &str) -> Result<String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| McpError::MissingArg(name.to_string()))
}

/// Helper to get a required string argument with a minimum length in characters.
pub fn get_string_arg_min(args: &Map<String, JsonValue>, name: &str, min: usize) -> Result<String> {
    let value = get_string_arg(args, name)?;
    if value.chars().count() < min {
        return Err(McpError::InvalidArg {
            name: name.to_string(),
            reason: format!("must be at least {} character(s) long", min),
        });
    }
    Ok(value)
}

/// Helper to get an optional string argument from JSON arguments.
pub fn get_optional_string(args: &Map<String, JsonValue>, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Helper to get a required number argument.
pub fn get_f64_arg(args: &Map<String, JsonValue>, name: &str) -> Result<f64> {
    let value = args
        .get(name)
        .ok_or_else(|| McpError::MissingArg(name.to_string()))?;
    value.as_f64().ok_or_else(|| McpError::InvalidArg {
        name: name.to_string(),
        reason: "Expected a number".to_string(),
    })
}

/// Helper to get an optional conversation history argument. Null counts as absent.
pub fn get_optional_history(args: &Map<String, JsonValue>, name: &str) -> Result<Vec<ChatMessage>> {
    match args.get(name) {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(value) => history_from_json(value, name),
    }
}
