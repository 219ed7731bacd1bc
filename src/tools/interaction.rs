//! Orchestrated interaction tool.
//!
//! Tools: interaction

use serde_json::{Map, Value as JsonValue};

use crate::convert::{get_optional_history, get_string_arg_min, preview};
use crate::error::{McpError, Result};
use crate::orchestrator::ToolResult;
use crate::schema;
use crate::session::McpSession;
use crate::tools::{CallToolResult, ToolDef};

/// Let the model pick between answering, chatting and querying.
pub const INTERACTION: &str = "interaction";

/// Get the interaction tool definition.
pub fn tools() -> Vec<ToolDef> {
    vec![ToolDef::new(
        INTERACTION,
        "Answer a request by letting the language model decide whether to reply directly, \
         chat, or translate the request to SQL and run it against the database.",
        schema!(object {
            required: { "userQuery": string },
            optional: { "chatHistory": history }
        }),
    )]
}

/// Dispatch the interaction tool call.
pub async fn dispatch(
    session: &McpSession,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<CallToolResult> {
    if name != INTERACTION {
        return Err(McpError::UnknownTool(name.to_string()));
    }

    let user_query = get_string_arg_min(&args, "userQuery", 1)?;
    let history = get_optional_history(&args, "chatHistory")?;
    tracing::info!(query = %preview(&user_query, 100), turns = history.len(), "interaction called");

    let result = session.orchestrator().handle(&user_query, &history).await;
    Ok(render(result))
}

/// Turn an orchestration outcome into tool output.
pub fn render(result: ToolResult) -> CallToolResult {
    match result {
        ToolResult::Text(text) => CallToolResult::text(text),
        ToolResult::SqlResult(json) => CallToolResult::text(format!("Query Result:\n{}", json)),
        ToolResult::Error(message) => CallToolResult::error(message),
    }
}
