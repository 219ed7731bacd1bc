//! Database tools.
//!
//! Tools: query, textToSql

use serde_json::{Map, Value as JsonValue};

use crate::convert::{
    get_string_arg, get_string_arg_min, preview, rows_to_pretty_json, truncate,
    MAX_ERROR_DISPLAY_CHARS,
};
use crate::error::{McpError, Result};
use crate::schema;
use crate::schema::{format_schema, is_empty_schema};
use crate::session::McpSession;
use crate::text_to_sql::translate;
use crate::tools::{CallToolResult, ToolDef};

/// Execute SQL.
pub const QUERY: &str = "query";
/// Translate a question into SQL.
pub const TEXT_TO_SQL: &str = "textToSql";

/// Get all database tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            QUERY,
            "Execute a SQL statement against the database. Returns the rows as a JSON array \
             of objects, columns in result order.",
            schema!(object {
                required: { "sql": string }
            }),
        ),
        ToolDef::new(
            TEXT_TO_SQL,
            "Translate a natural-language question into a single PostgreSQL SELECT statement \
             using the live schema. The SQL is returned, not executed.",
            schema!(object {
                required: { "naturalQuery": string }
            }),
        ),
    ]
}

/// Dispatch a database tool call.
pub async fn dispatch(
    session: &McpSession,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<CallToolResult> {
    match name {
        QUERY => {
            let sql = get_string_arg(&args, "sql")?;
            tracing::info!(sql = %preview(&sql, 100), "query called");

            match session.db().execute(&sql).await {
                Ok(rows) => Ok(CallToolResult::text(rows_to_pretty_json(&rows))),
                Err(e) => {
                    tracing::warn!(error = %e, "query failed");
                    Ok(CallToolResult::error(format!(
                        "Error executing query: {}",
                        truncate(&e.to_string(), MAX_ERROR_DISPLAY_CHARS)
                    )))
                }
            }
        }

        TEXT_TO_SQL => {
            let question = get_string_arg_min(&args, "naturalQuery", 3)?;
            tracing::info!(question = %preview(&question, 100), "textToSql called");

            let schema_text = match format_schema(session.db(), session.schema()).await {
                Ok(text) => text,
                Err(e) => return Ok(generation_error(&e)),
            };
            if is_empty_schema(&schema_text) {
                return Ok(CallToolResult::error(
                    "Error: Database schema is empty or could not be fetched for LLM.",
                ));
            }

            match translate(session.llm(), &question, &schema_text).await {
                Ok(sql) => Ok(CallToolResult::text(sql)),
                Err(McpError::TranslationRefused(text)) => Ok(CallToolResult::error(text)),
                Err(e) => Ok(generation_error(&e)),
            }
        }

        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}

fn generation_error(err: &McpError) -> CallToolResult {
    tracing::warn!(error = %err, "textToSql failed");
    CallToolResult::error(format!(
        "Error generating SQL: {}",
        truncate(&err.to_string(), MAX_ERROR_DISPLAY_CHARS)
    ))
}
