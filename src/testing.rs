//! In-memory doubles for the [`Database`] and [`LanguageModel`] seams.
//!
//! Used by this crate's tests and handy for driving the tools without PostgreSQL or Ollama.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::db::{ColumnInfo, Database, Row};
use crate::error::{McpError, Result};
use crate::llm::{ChatMessage, GenerationOptions, LanguageModel};

/// Scripted [`Database`].
///
/// Tables are registered up front and the catalog lists them in registration order, so
/// callers cannot rely on it being sorted. Query results are registered per exact SQL
/// text. Unregistered SQL fails the way an unknown relation would.
#[derive(Default)]
pub struct MockDatabase {
    tables: Vec<MockTable>,
    results: HashMap<String, Result<Vec<Row>>>,
    catalog_error: Option<String>,
    executed: Mutex<Vec<String>>,
}

struct MockTable {
    schema: String,
    name: String,
    columns: Vec<ColumnInfo>,
    primary_key: Vec<String>,
}

impl MockDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a base table with its columns and primary key.
    pub fn with_table(
        mut self,
        schema: &str,
        table: &str,
        columns: Vec<ColumnInfo>,
        primary_key: Vec<&str>,
    ) -> Self {
        self.tables.retain(|t| !(t.schema == schema && t.name == table));
        self.tables.push(MockTable {
            schema: schema.to_string(),
            name: table.to_string(),
            columns,
            primary_key: primary_key.into_iter().map(String::from).collect(),
        });
        self
    }

    /// Register the rows returned for `sql`.
    pub fn with_query_result(mut self, sql: &str, rows: Vec<Row>) -> Self {
        self.results.insert(sql.to_string(), Ok(rows));
        self
    }

    /// Make `sql` fail with the given backend message.
    pub fn with_query_error(mut self, sql: &str, message: &str) -> Self {
        self.results
            .insert(sql.to_string(), Err(McpError::BackendRejected(message.to_string())));
        self
    }

    /// Make every catalog lookup fail with the given message.
    pub fn with_catalog_error(mut self, message: &str) -> Self {
        self.catalog_error = Some(message.to_string());
        self
    }

    /// SQL statements executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    fn table(&self, schema: &str, table: &str) -> Option<&MockTable> {
        self.tables.iter().find(|t| t.schema == schema && t.name == table)
    }

    fn check_catalog(&self) -> Result<()> {
        match &self.catalog_error {
            Some(message) => Err(McpError::BackendUnreachable(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Database for MockDatabase {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        self.executed.lock().unwrap().push(sql.to_string());
        match self.results.get(sql) {
            Some(result) => result.clone(),
            None => Err(McpError::BackendRejected(format!(
                "MockDatabase: no result registered for query: {}",
                sql
            ))),
        }
    }

    async fn base_tables(&self, schema: &str) -> Result<Vec<String>> {
        self.check_catalog()?;
        Ok(self
            .tables
            .iter()
            .filter(|t| t.schema == schema)
            .map(|t| t.name.clone())
            .collect())
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        self.check_catalog()?;
        Ok(self
            .table(schema, table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn primary_key(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        self.check_catalog()?;
        Ok(self
            .table(schema, table)
            .map(|t| t.primary_key.clone())
            .unwrap_or_default())
    }
}

/// Scripted [`LanguageModel`].
///
/// Replies are returned in order for both chat and generate requests. If more requests
/// are made than replies available, an error is returned.
#[derive(Default)]
pub struct MockLanguageModel {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLanguageModel {
    /// Create a model that answers with `replies`, in order.
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a failing reply.
    pub fn with_error(self, err: McpError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    /// Queue a successful reply.
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        self.replies.lock().unwrap().push_back(Ok(reply.into()));
        self
    }

    /// Every request received so far. Generate prompts appear as a single user turn.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next_reply(&self, messages: Vec<ChatMessage>) -> Result<String> {
        self.requests.lock().unwrap().push(messages);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(McpError::BackendRejected(
                "MockLanguageModel: no more replies available".to_string(),
            ))
        })
    }
}

#[async_trait]
impl LanguageModel for MockLanguageModel {
    async fn chat_complete(&self, messages: &[ChatMessage], _options: GenerationOptions) -> Result<String> {
        self.next_reply(messages.to_vec())
    }

    async fn generate(&self, prompt: &str, _options: GenerationOptions) -> Result<String> {
        self.next_reply(vec![ChatMessage::user(prompt)])
    }
}
