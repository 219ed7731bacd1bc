//! Conversation tools.
//!
//! Tools: chat, summarize

use serde_json::{Map, Value as JsonValue};

use crate::convert::{get_optional_history, get_optional_string, get_string_arg_min, preview};
use crate::error::{McpError, Result};
use crate::llm::{ChatMessage, GenerationOptions, SummaryLength};
use crate::orchestrator::DEFAULT_CHAT_PROMPT;
use crate::schema;
use crate::session::McpSession;
use crate::tools::{CallToolResult, ToolDef};

/// Free-form conversation.
pub const CHAT: &str = "chat";
/// Summarize a piece of text.
pub const SUMMARIZE: &str = "summarize";

/// Get all conversation tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            CHAT,
            "Send a message to the language model. When history is given it is used as-is, \
             including any system turn; otherwise systemPrompt (or a default) starts the conversation.",
            schema!(object {
                required: { "newMessage": string },
                optional: { "history": history, "systemPrompt": string }
            }),
        ),
        ToolDef::new(
            SUMMARIZE,
            "Summarize text with the language model. length is brief, medium (default) or detailed.",
            schema!(object {
                required: { "text": string },
                optional: { "length": summary_length }
            }),
        ),
    ]
}

/// Dispatch a conversation tool call.
pub async fn dispatch(
    session: &McpSession,
    name: &str,
    args: Map<String, JsonValue>,
) -> Result<CallToolResult> {
    match name {
        CHAT => {
            let new_message = get_string_arg_min(&args, "newMessage", 1)?;
            let history = get_optional_history(&args, "history")?;
            let system_prompt = get_optional_string(&args, "systemPrompt");
            tracing::info!(message = %preview(&new_message, 100), turns = history.len(), "chat called");

            let mut messages = if history.is_empty() {
                vec![ChatMessage::system(
                    system_prompt.as_deref().unwrap_or(DEFAULT_CHAT_PROMPT),
                )]
            } else {
                history
            };
            messages.push(ChatMessage::user(new_message));

            match session
                .llm()
                .chat_complete(&messages, GenerationOptions::default())
                .await
            {
                Ok(reply) => Ok(CallToolResult::text(reply)),
                Err(e) => {
                    tracing::warn!(error = %e, "chat failed");
                    Ok(CallToolResult::error(format!(
                        "I encountered an error trying to respond: {}",
                        e
                    )))
                }
            }
        }

        SUMMARIZE => {
            let text = get_string_arg_min(&args, "text", 1)?;
            let length = match get_optional_string(&args, "length") {
                Some(raw) => raw.parse::<SummaryLength>()?,
                None => SummaryLength::default(),
            };
            tracing::info!(chars = text.chars().count(), %length, "summarize called");

            match session.llm().summarize(&text, length).await {
                Ok(summary) => Ok(CallToolResult::text(summary)),
                Err(e) => Ok(CallToolResult::error(format!("Error summarizing text: {}", e))),
            }
        }

        _ => Err(McpError::UnknownTool(name.to_string())),
    }
}
