//! The decision loop behind the `interaction` tool.
//!
//! Each cycle asks the model whether to answer directly or call one of three tools. A
//! text-to-SQL call feeds its SQL into a new cycle as a `queryTool` call; everything else
//! ends the interaction. Failures never escape: they become [`ToolResult::Error`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::OrchestratorConfig;
use crate::convert::{preview, rows_to_pretty_json};
use crate::db::Database;
use crate::error::McpError;
use crate::llm::{ChatMessage, GenerationOptions, LanguageModel};
use crate::schema::format_schema;
use crate::text_to_sql::translate;
use crate::tool_call::{encode_query_call, find_tool_call, parse_args, ToolCall};

/// System prompt used for plain conversation when none is given.
pub const DEFAULT_CHAT_PROMPT: &str = "You are a helpful AI assistant.";

const DECISION_PROMPT: &str = r#"You are a helpful assistant that can interact with a database and engage in general chat.
You have access to the following tools:

<tool_definitions>
1.  **textToSqlTool**:
    Description: Converts a natural language question and a database schema into a PostgreSQL SQL query.
    Parameters:
        - naturalQuery (string): The user's question in natural language.
        - schemaText (string): The full database schema.
    Response: The raw SQL query string.
    Example call: <tool_code>textToSqlTool(naturalQuery='Show me all users created in the last month', schemaText='CREATE TABLE users (id INT, name TEXT);')</tool_code>

2.  **queryTool**:
    Description: Executes a given SQL query against the database and returns the results as JSON.
    Parameters:
        - sqlQuery (string): The SQL query to execute.
    Response: JSON array of objects representing the query results.
    Example call: <tool_code>queryTool(sqlQuery='SELECT name, email FROM users WHERE created_at > NOW() - INTERVAL \'1 month\'')</tool_code>

3.  **chatTool**:
    Description: Engages in general conversation or answers questions that do not require database interaction.
    Parameters:
        - newMessage (string): The current user message.
        - history (array<object>): The conversation history (e.g., [{role: "user", content: "hi"}, {role: "assistant", content: "hello"}]).
        - systemPrompt (string, optional): An initial system prompt for the chat.
    Response: The assistant's text response.
    Example call: <tool_code>chatTool(newMessage='What is the capital of France?')</tool_code>
</tool_definitions>

Based on the user's input, decide which tool to call or if a direct chat response is needed.
If you need to call a tool, respond ONLY with the tool call in the format: <tool_code>toolName(param1='value1', param2='value2')</tool_code>.
If you need to chain tools (e.g., convert text to SQL, then run SQL), output the first tool call.
If no tool is suitable, or if the user asks a general question, provide a natural language response.
Do not explain your reasoning unless explicitly asked to do so after a tool call.
"#;

/// Outcome of one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ToolResult {
    /// A conversational answer.
    Text(String),
    /// Query rows as 2-space-indented JSON.
    SqlResult(String),
    /// What went wrong, for display.
    Error(String),
}

impl ToolResult {
    /// The carried text.
    pub fn content(&self) -> &str {
        match self {
            ToolResult::Text(s) | ToolResult::SqlResult(s) | ToolResult::Error(s) => s,
        }
    }

    /// Whether this is the error kind.
    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }
}

enum Step {
    Finished(ToolResult),
    Chain(String),
}

/// Runs interactions against a database and a language model.
pub struct Orchestrator {
    db: Arc<dyn Database>,
    llm: Arc<dyn LanguageModel>,
    schema: String,
    max_chain_steps: usize,
}

impl Orchestrator {
    /// Create an orchestrator that introspects `schema` for text-to-SQL calls.
    pub fn new(
        db: Arc<dyn Database>,
        llm: Arc<dyn LanguageModel>,
        schema: impl Into<String>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            db,
            llm,
            schema: schema.into(),
            max_chain_steps: config.max_chain_steps.max(1),
        }
    }

    /// Answer `question` given earlier turns. The caller's history is not modified.
    pub async fn handle(&self, question: &str, history: &[ChatMessage]) -> ToolResult {
        let mut input = question.to_string();
        let mut history = history.to_vec();

        for step in 1..=self.max_chain_steps {
            tracing::debug!(step, input = %preview(&input, 200), "Requesting tool decision");

            let decision = match self.decide(&input, &history).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(error = %e, "Tool decision failed");
                    return ToolResult::Error(format!("Error during orchestration: {}", e));
                }
            };

            match self.dispatch(&input, &decision).await {
                Step::Finished(result) => return result,
                Step::Chain(next) => {
                    history.push(ChatMessage::assistant(decision));
                    input = next;
                }
            }
        }

        tracing::warn!(max = self.max_chain_steps, "Tool chain limit reached");
        ToolResult::Error(McpError::ChainTooLong(self.max_chain_steps).to_string())
    }

    async fn decide(&self, input: &str, history: &[ChatMessage]) -> crate::Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(DECISION_PROMPT));
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(input));

        let decision = self
            .llm
            .chat_complete(&messages, GenerationOptions::default())
            .await?;
        tracing::debug!(decision = %preview(&decision, 200), "Model decision");
        Ok(decision)
    }

    async fn dispatch(&self, input: &str, decision: &str) -> Step {
        let Some(encoded) = find_tool_call(decision) else {
            tracing::debug!("Direct reply");
            return Step::Finished(ToolResult::Text(decision.to_string()));
        };

        let call = match parse_args(encoded.args)
            .map_err(McpError::from)
            .and_then(|args| ToolCall::from_args(encoded.name, &args))
        {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!(tool = encoded.name, error = %e, "Unparseable tool call");
                return Step::Finished(ToolResult::Error(format!(
                    "Failed to parse tool call from LLM. Please try rephrasing. Error: {}",
                    e
                )));
            }
        };
        tracing::debug!(tool = call.name(), "Dispatching tool call");

        match call {
            ToolCall::TextToSql {
                natural_query,
                schema_text,
            } => self.text_to_sql(input, natural_query, schema_text).await,
            ToolCall::Query { sql_query } => Step::Finished(self.query(&sql_query).await),
            ToolCall::Chat {
                new_message,
                history,
                system_prompt,
            } => Step::Finished(self.chat(input, new_message, history, system_prompt).await),
            ToolCall::Unknown(name) => Step::Finished(ToolResult::Error(format!(
                "Unknown tool: {}. Please check tool definitions.",
                name
            ))),
        }
    }

    async fn text_to_sql(
        &self,
        input: &str,
        natural_query: Option<String>,
        schema_text: Option<String>,
    ) -> Step {
        let schema_text = match schema_text {
            Some(text) => text,
            None => match format_schema(self.db.as_ref(), &self.schema).await {
                Ok(text) => text,
                Err(e) => {
                    return Step::Finished(ToolResult::Error(format!(
                        "Failed to generate SQL: {}",
                        e
                    )))
                }
            },
        };
        let question = natural_query.as_deref().unwrap_or(input);

        match translate(self.llm.as_ref(), question, &schema_text).await {
            Ok(sql) => {
                tracing::debug!(sql = %preview(&sql, 200), "Chaining generated SQL into a query");
                Step::Chain(encode_query_call(&sql))
            }
            Err(McpError::TranslationRefused(text)) => Step::Finished(ToolResult::Error(text)),
            Err(e) => Step::Finished(ToolResult::Error(format!("Failed to generate SQL: {}", e))),
        }
    }

    async fn query(&self, sql: &str) -> ToolResult {
        match self.db.execute(sql).await {
            Ok(rows) => {
                tracing::debug!(rows = rows.len(), "Query succeeded");
                ToolResult::SqlResult(rows_to_pretty_json(&rows))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Query failed");
                ToolResult::Error(format!("Failed to execute SQL query: {}", e))
            }
        }
    }

    async fn chat(
        &self,
        input: &str,
        new_message: Option<String>,
        history: Vec<ChatMessage>,
        system_prompt: Option<String>,
    ) -> ToolResult {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(
            system_prompt.as_deref().unwrap_or(DEFAULT_CHAT_PROMPT),
        ));
        messages.extend(history);
        messages.push(ChatMessage::user(new_message.as_deref().unwrap_or(input)));

        match self.llm.chat_complete(&messages, GenerationOptions::default()).await {
            Ok(reply) => ToolResult::Text(reply),
            Err(e) => ToolResult::Error(format!("Failed to get chat response: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, Row};
    use crate::llm::Role;
    use crate::testing::{MockDatabase, MockLanguageModel};
    use serde_json::json;

    fn users_db() -> MockDatabase {
        let mut row = Row::new();
        row.insert("id".into(), json!(1));
        row.insert("name".into(), json!("a"));
        MockDatabase::new()
            .with_table(
                "test",
                "users",
                vec![
                    ColumnInfo::new("id", "integer").not_null(),
                    ColumnInfo::new("name", "text"),
                ],
                vec!["id"],
            )
            .with_query_result("SELECT * FROM users", vec![row])
    }

    fn orchestrator(db: Arc<MockDatabase>, llm: Arc<MockLanguageModel>) -> Orchestrator {
        Orchestrator::new(db, llm, "test", &OrchestratorConfig::default())
    }

    #[tokio::test]
    async fn test_text_to_sql_chains_into_query() {
        let db = Arc::new(users_db());
        let llm = Arc::new(MockLanguageModel::new([
            "<tool_code>textToSqlTool(naturalQuery='show me all users')</tool_code>",
            "SELECT * FROM users;",
            "<tool_code>queryTool(sqlQuery='SELECT * FROM users')</tool_code>",
        ]));

        let result = orchestrator(db.clone(), llm.clone())
            .handle("show me all users", &[])
            .await;
        assert_eq!(
            result,
            ToolResult::SqlResult("[\n  {\n    \"id\": 1,\n    \"name\": \"a\"\n  }\n]".into())
        );
        assert_eq!(db.executed(), vec!["SELECT * FROM users"]);

        let requests = llm.requests();
        assert_eq!(requests.len(), 3);

        // The translator saw the live schema.
        assert!(requests[1][1].content.contains("CREATE TABLE test.users"));

        // The second cycle carries the first decision and the synthesized call.
        let second = &requests[2];
        assert_eq!(second.len(), 3);
        assert_eq!(second[1].role, Role::Assistant);
        assert!(second[1].content.starts_with("<tool_code>textToSqlTool"));
        assert_eq!(
            second[2].content,
            "<tool_code>queryTool(sqlQuery='SELECT * FROM users')</tool_code>"
        );
    }

    #[tokio::test]
    async fn test_apostrophe_in_question_is_dispatched() {
        let mut row = Row::new();
        row.insert("total".into(), json!(42));
        let sql = r"SELECT sum(amount) AS total FROM spend WHERE path = 'C:\'";
        let db = Arc::new(users_db().with_query_result(sql, vec![row]));
        let llm = Arc::new(
            MockLanguageModel::new([
                "<tool_code>textToSqlTool(naturalQuery='What's the total spend?')</tool_code>",
                sql,
            ])
            .with_reply(encode_query_call(sql)),
        );

        let result = orchestrator(db.clone(), llm.clone())
            .handle("What's the total spend?", &[])
            .await;
        assert_eq!(result, ToolResult::SqlResult("[\n  {\n    \"total\": 42\n  }\n]".into()));
        assert_eq!(db.executed(), vec![sql]);
        assert!(llm.requests()[1][1].content.contains("What's the total spend?"));
    }

    #[tokio::test]
    async fn test_direct_reply_is_returned_verbatim() {
        let db = Arc::new(MockDatabase::new());
        let llm = Arc::new(MockLanguageModel::new(["Hi there, how can I help?"]));
        let result = orchestrator(db.clone(), llm).handle("hello", &[]).await;
        assert_eq!(result, ToolResult::Text("Hi there, how can I help?".into()));
        assert!(db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_prose_mentioning_a_tool_is_a_direct_reply() {
        let db = Arc::new(MockDatabase::new());
        let reply = "I could use queryTool(sqlQuery='SELECT 1') but I won't.";
        let llm = Arc::new(MockLanguageModel::new([reply]));
        let result = orchestrator(db.clone(), llm).handle("hi", &[]).await;
        assert_eq!(result, ToolResult::Text(reply.into()));
        assert!(db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_decision_prompt_wraps_history() {
        let db = Arc::new(MockDatabase::new());
        let llm = Arc::new(MockLanguageModel::new(["ok"]));
        let history = vec![ChatMessage::user("Hi"), ChatMessage::assistant("Hello!")];
        orchestrator(db, llm.clone()).handle("and now?", &history).await;

        let turns = &llm.requests()[0];
        assert_eq!(turns.len(), 4);
        assert_eq!(turns[0].role, Role::System);
        assert!(turns[0].content.contains("<tool_definitions>"));
        assert_eq!(&turns[1..3], &history[..]);
        assert_eq!(turns[3], ChatMessage::user("and now?"));
    }

    #[tokio::test]
    async fn test_malformed_arguments_dispatch_nothing() {
        let db = Arc::new(users_db());
        let llm = Arc::new(MockLanguageModel::new([
            "<tool_code>textToSqlTool(naturalQuery=)</tool_code>",
        ]));
        let result = orchestrator(db.clone(), llm.clone()).handle("x", &[]).await;

        assert!(result.is_error());
        assert!(result
            .content()
            .starts_with("Failed to parse tool call from LLM. Please try rephrasing. Error: "));
        assert_eq!(llm.request_count(), 1);
        assert!(db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_refusal_is_returned_verbatim_and_not_executed() {
        let db = Arc::new(users_db());
        let refusal = "Error: Cannot generate a safe SELECT query from the given request and schema.";
        let llm = Arc::new(MockLanguageModel::new([
            "<tool_code>textToSqlTool(naturalQuery='delete all users')</tool_code>",
            refusal,
        ]));
        let result = orchestrator(db.clone(), llm).handle("delete all users", &[]).await;
        assert_eq!(result, ToolResult::Error(refusal.into()));
        assert!(db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_empty_schema_fails_generation() {
        let db = Arc::new(MockDatabase::new());
        let llm = Arc::new(MockLanguageModel::new([
            "<tool_code>textToSqlTool(naturalQuery='show users')</tool_code>",
        ]));
        let result = orchestrator(db, llm.clone()).handle("show users", &[]).await;
        assert!(result.content().starts_with("Failed to generate SQL: "));
        assert_eq!(llm.request_count(), 1);
    }

    #[tokio::test]
    async fn test_query_failure_is_reported() {
        let db = Arc::new(
            MockDatabase::new().with_query_error("SELECT * FROM nope", "relation \"nope\" does not exist"),
        );
        let llm = Arc::new(MockLanguageModel::new([
            "<tool_code>queryTool(sqlQuery='SELECT * FROM nope')</tool_code>",
        ]));
        let result = orchestrator(db, llm).handle("q", &[]).await;
        assert_eq!(
            result,
            ToolResult::Error(
                "Failed to execute SQL query: relation \"nope\" does not exist".into()
            )
        );
    }

    #[tokio::test]
    async fn test_chat_tool_defaults() {
        let db = Arc::new(MockDatabase::new());
        let llm = Arc::new(MockLanguageModel::new([
            "<tool_code>chatTool()</tool_code>",
            "Paris.",
        ]));
        let result = orchestrator(db, llm.clone())
            .handle("What is the capital of France?", &[])
            .await;
        assert_eq!(result, ToolResult::Text("Paris.".into()));

        let chat = &llm.requests()[1];
        assert_eq!(
            chat,
            &vec![
                ChatMessage::system(DEFAULT_CHAT_PROMPT),
                ChatMessage::user("What is the capital of France?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_chat_tool_failure() {
        let db = Arc::new(MockDatabase::new());
        let llm = Arc::new(
            MockLanguageModel::new(["<tool_code>chatTool(newMessage='hi', systemPrompt='Be brief.')</tool_code>"])
                .with_error(McpError::BackendRejected("Ollama API Error (500): boom".into())),
        );
        let result = orchestrator(db, llm.clone()).handle("hi", &[]).await;
        assert_eq!(
            result,
            ToolResult::Error("Failed to get chat response: Ollama API Error (500): boom".into())
        );
        assert_eq!(llm.requests()[1][0], ChatMessage::system("Be brief."));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let db = Arc::new(MockDatabase::new());
        let llm = Arc::new(MockLanguageModel::new([
            "<tool_code>dropTables(all='yes')</tool_code>",
        ]));
        let result = orchestrator(db.clone(), llm).handle("q", &[]).await;
        assert_eq!(
            result,
            ToolResult::Error("Unknown tool: dropTables. Please check tool definitions.".into())
        );
        assert!(db.executed().is_empty());
    }

    #[tokio::test]
    async fn test_decision_failure() {
        let db = Arc::new(MockDatabase::new());
        let llm = Arc::new(
            MockLanguageModel::default()
                .with_error(McpError::BackendUnreachable("No response from Ollama API.".into())),
        );
        let result = orchestrator(db, llm).handle("q", &[]).await;
        assert_eq!(
            result,
            ToolResult::Error("Error during orchestration: No response from Ollama API.".into())
        );
    }

    #[tokio::test]
    async fn test_chain_is_bounded() {
        let db = Arc::new(users_db());
        let replies = std::iter::repeat([
            "<tool_code>textToSqlTool(naturalQuery='again')</tool_code>",
            "SELECT * FROM users",
        ])
        .take(3)
        .flatten();
        let llm = Arc::new(MockLanguageModel::new(replies));
        let config = OrchestratorConfig { max_chain_steps: 3 };
        let result = Orchestrator::new(db.clone(), llm.clone(), "test", &config)
            .handle("loop", &[])
            .await;

        assert_eq!(
            result,
            ToolResult::Error("tool chain exceeded the maximum of 3 steps".into())
        );
        assert_eq!(llm.request_count(), 6);
        assert!(db.executed().is_empty());
    }

    #[test]
    fn test_tool_result_serialization() {
        let value = serde_json::to_value(ToolResult::SqlResult("[]".into())).unwrap();
        assert_eq!(value, json!({"type": "sql_result", "content": "[]"}));
    }
}
