//! Tool registry and category definitions.
//!
//! Provides the infrastructure for registering and dispatching MCP tools.

pub mod chat;
pub mod database;
pub mod interaction;
pub mod jira;
pub mod util;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::session::McpSession;

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (e.g., "textToSql")
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for the input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: JsonValue,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, input_schema: JsonValue) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// Result of a tool call as seen by the MCP client.
///
/// Failures a tool anticipates (a bad query, a refused translation) are results with
/// `is_error` set; argument problems are returned as `Err` and become JSON-RPC errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallToolResult {
    /// Text shown to the caller
    pub text: String,
    /// Whether the tool failed
    pub is_error: bool,
}

impl CallToolResult {
    /// A successful result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    /// A failed result.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    /// The `tools/call` result body.
    pub fn to_json(&self) -> JsonValue {
        let mut body = serde_json::json!({
            "content": [{ "type": "text", "text": self.text }]
        });
        if self.is_error {
            body["isError"] = JsonValue::Bool(true);
        }
        body
    }
}

/// Registry of all available tools.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    /// Create a new registry with all tools registered.
    pub fn new() -> Self {
        let mut tools = Vec::new();

        tools.extend(database::tools());
        tools.extend(chat::tools());
        tools.extend(interaction::tools());
        tools.extend(jira::tools());
        tools.extend(util::tools());

        Self { tools }
    }

    /// Get all tool definitions.
    pub fn tools(&self) -> &[ToolDef] {
        &self.tools
    }

    /// Dispatch a tool call to the appropriate handler.
    pub async fn dispatch(
        &self,
        session: &McpSession,
        name: &str,
        args: Map<String, JsonValue>,
    ) -> Result<CallToolResult> {
        tracing::debug!(tool = name, "Dispatching tool call");
        match name {
            database::QUERY | database::TEXT_TO_SQL => database::dispatch(session, name, args).await,
            chat::CHAT | chat::SUMMARIZE => chat::dispatch(session, name, args).await,
            interaction::INTERACTION => interaction::dispatch(session, name, args).await,
            jira::JIRA => jira::dispatch(session, name, args).await,
            util::ADD => util::dispatch(session, name, args).await,
            _ => Err(McpError::UnknownTool(name.to_string())),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper macro for creating JSON Schema for tool input parameters.
#[macro_export]
macro_rules! schema {
    // Object with required and optional properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? },
        optional: { $($opt_name:literal : $opt_type:tt),* $(,)? }
    }) => {{
        let mut required = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), schema!(@type $req_type));)*
        $(props.insert($opt_name.to_string(), schema!(@type $opt_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Object with only required properties
    (object {
        required: { $($req_name:literal : $req_type:tt),* $(,)? }
    }) => {{
        let mut required = Vec::new();
        $(required.push($req_name);)*

        let mut props = serde_json::Map::new();
        $(props.insert($req_name.to_string(), schema!(@type $req_type));)*

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }};

    // Type mappings
    (@type string) => { serde_json::json!({"type": "string"}) };
    (@type number) => { serde_json::json!({"type": "number"}) };
    (@type summary_length) => {
        serde_json::json!({"type": "string", "enum": ["brief", "medium", "detailed"]})
    };
    (@type history) => {
        serde_json::json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "role": {"type": "string", "enum": ["system", "user", "assistant"]},
                    "content": {"type": "string"}
                },
                "required": ["role", "content"]
            }
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_tool_result_shape() {
        assert_eq!(
            CallToolResult::text("ok").to_json(),
            serde_json::json!({"content": [{"type": "text", "text": "ok"}]})
        );
        assert_eq!(
            CallToolResult::error("bad").to_json(),
            serde_json::json!({"content": [{"type": "text", "text": "bad"}], "isError": true})
        );
    }

    #[test]
    fn test_registry_names_are_unique() {
        let registry = ToolRegistry::new();
        let mut names: Vec<_> = registry.tools().iter().map(|t| t.name.as_str()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(
            names,
            vec!["add", "chat", "interaction", "jira", "query", "summarize", "textToSql"]
        );
    }
}
