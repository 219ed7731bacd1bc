//! Small utility tools.
//!
//! Tools: add

use serde_json::{Map, Value as JsonValue};

use crate::convert::get_f64_arg;
use crate::error::{McpError, Result};
use crate::schema;
use crate::session::McpSession;
use crate::tools::{CallToolResult, ToolDef};

/// Add two numbers.
pub const ADD: &str = "add";

/// Get all utility tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![ToolDef::new(
        ADD,
        "Add two numbers and return the sum. Useful for checking the server responds.",
        schema!(object {
            required: { "a": number, "b": number }
        }),
    )]
}

/// Dispatch a utility tool call.
pub async fn dispatch(
    _session: &McpSession,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<CallToolResult> {
    match name {
        ADD => {
            let a = get_f64_arg(&args, "a")?;
            let b = get_f64_arg(&args, "b")?;
            let sum = a + b;
            tracing::debug!(a, b, sum, "add called");
            Ok(CallToolResult::text(sum.to_string()))
        }
        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}
