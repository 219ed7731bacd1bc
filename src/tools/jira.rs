//! Issue tracker tools.
//!
//! Tools: jira

use serde_json::{Map, Value as JsonValue};

use crate::convert::get_string_arg;
use crate::error::{McpError, Result};
use crate::llm::SummaryLength;
use crate::schema;
use crate::session::McpSession;
use crate::tools::{CallToolResult, ToolDef};

/// Summarize a Jira issue.
pub const JIRA: &str = "jira";

/// Get the Jira tool definition.
pub fn tools() -> Vec<ToolDef> {
    vec![ToolDef::new(
        JIRA,
        "Fetch a Jira issue by key (e.g. PROJ-123) and summarize its title and description.",
        schema!(object {
            required: { "ticketId": string }
        }),
    )]
}

/// Dispatch the Jira tool call.
pub async fn dispatch(
    session: &McpSession,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<CallToolResult> {
    if name != JIRA {
        return Err(McpError::UnknownTool(name.to_string()));
    }

    let ticket_id = get_string_arg(&args, "ticketId")?;
    tracing::info!(ticket_id = %ticket_id, "jira called");

    let Some(jira) = session.jira() else {
        return Ok(CallToolResult::error(
            "Jira is not configured. Set JIRA_BASE_URL, JIRA_USER_EMAIL and JIRA_API_TOKEN.",
        ));
    };

    let summary = match jira.fetch_issue(&ticket_id).await {
        Ok(issue) => {
            session
                .llm()
                .summarize(&issue.to_summary_input(), SummaryLength::Medium)
                .await
        }
        Err(e) => Err(e),
    };

    match summary {
        Ok(summary) => Ok(CallToolResult::text(summary)),
        Err(e) => {
            tracing::warn!(ticket_id = %ticket_id, error = %e, "jira summary failed");
            Ok(CallToolResult::error(format!(
                "I encountered an error trying to summarize {}: {}",
                ticket_id, e
            )))
        }
    }
}
