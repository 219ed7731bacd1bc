//! Natural-language question to a single SELECT statement.

use std::sync::LazyLock;

use regex::Regex;

use crate::convert::preview;
use crate::error::{McpError, Result};
use crate::llm::{ChatMessage, GenerationOptions, LanguageModel};
use crate::schema::is_empty_schema;

/// Reply the model is told to give when it cannot answer safely.
pub const REFUSAL_SENTINEL: &str =
    "Error: Cannot generate a safe SELECT query from the given request and schema.";

const SQL_TEMPERATURE: f64 = 0.1;

const SYSTEM_PROMPT: &str = "You are an expert PostgreSQL query writer.
Based on the provided database schema, generate a single, runnable SQL query that directly answers the user's question.
Output ONLY the raw SQL query. Do not include any explanations, comments, or markdown formatting like ```sql ... ```.
If the question cannot be answered with the given schema, is ambiguous, or requires modification/unsafe operations not typically derived from a \"get\" or \"show\" type question, output \"Error: Cannot generate a safe SELECT query from the given request and schema.\"
Focus on generating SELECT queries. Output the SQL query in a single line without line breaks or indentation. Do not include <thinking> or any other tags.";

static LEADING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^```sql\s*").expect("fence pattern is valid"));
static TRAILING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*```$").expect("fence pattern is valid"));
static TRAILING_SEMICOLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";\s*$").expect("semicolon pattern is valid"));

fn user_prompt(question: &str, schema_text: &str) -> String {
    format!(
        "Database Schema:\n---\n{}\n---\nUser Question: \"{}\"\n\nSQL Query:",
        schema_text, question
    )
}

/// Strip markdown fences and a trailing semicolon from a model reply.
pub fn clean_sql(reply: &str) -> String {
    let sql = LEADING_FENCE.replace(reply.trim(), "");
    let sql = TRAILING_FENCE.replace(&sql, "");
    let sql = TRAILING_SEMICOLON.replace(sql.trim(), "");
    sql.trim().to_string()
}

/// Whether `sql` is the model declining to answer.
pub fn is_refusal(sql: &str) -> bool {
    sql.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("error:"))
}

/// Translate `question` into SQL against `schema_text`.
///
/// The no-tables sentinel fails with [`McpError::SchemaUnavailable`] before the model is
/// consulted. A refusal fails with [`McpError::TranslationRefused`] carrying the model's text.
pub async fn translate(llm: &dyn LanguageModel, question: &str, schema_text: &str) -> Result<String> {
    if is_empty_schema(schema_text) {
        return Err(McpError::SchemaUnavailable(
            "Database schema is empty or could not be fetched for LLM.".to_string(),
        ));
    }

    let messages = [
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_prompt(question, schema_text)),
    ];
    let reply = llm
        .chat_complete(&messages, GenerationOptions::with_temperature(SQL_TEMPERATURE))
        .await?;

    let sql = clean_sql(&reply);
    if sql.is_empty() {
        return Err(McpError::MalformedResponse(
            "Failed to extract SQL query from Ollama response.".to_string(),
        ));
    }
    if is_refusal(&sql) {
        tracing::warn!(question = %preview(question, 100), "Model refused to generate SQL");
        return Err(McpError::TranslationRefused(sql));
    }

    tracing::debug!(sql = %preview(&sql, 200), "Generated SQL");
    Ok(sql)
}
