//! MCP session state.
//!
//! Holds the handles every tool and resource needs: the database, the language model,
//! the optional Jira client and the orchestrator built on top of the first two.

use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::db::Database;
use crate::jira::JiraClient;
use crate::llm::LanguageModel;
use crate::orchestrator::Orchestrator;

/// Shared state for one server process.
pub struct McpSession {
    db: Arc<dyn Database>,
    llm: Arc<dyn LanguageModel>,
    jira: Option<JiraClient>,
    schema: String,
    orchestrator: Orchestrator,
}

impl McpSession {
    /// Create a session describing `schema` to the model.
    pub fn new(
        db: Arc<dyn Database>,
        llm: Arc<dyn LanguageModel>,
        schema: impl Into<String>,
        config: &OrchestratorConfig,
    ) -> Self {
        let schema = schema.into();
        let orchestrator = Orchestrator::new(db.clone(), llm.clone(), schema.clone(), config);
        Self {
            db,
            llm,
            jira: None,
            schema,
            orchestrator,
        }
    }

    /// Enable the `jira` tool.
    pub fn with_jira(mut self, jira: Option<JiraClient>) -> Self {
        self.jira = jira;
        self
    }

    /// The database handle.
    pub fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }

    /// The language model.
    pub fn llm(&self) -> &dyn LanguageModel {
        self.llm.as_ref()
    }

    /// The Jira client, when configured.
    pub fn jira(&self) -> Option<&JiraClient> {
        self.jira.as_ref()
    }

    /// Schema introspected for prompts.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// The decision loop.
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}
