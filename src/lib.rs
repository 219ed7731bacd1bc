//! # sqlchat-mcp
//!
//! MCP (Model Context Protocol) server for talking to a PostgreSQL database in plain
//! language.
//!
//! The server introspects a schema, executes SQL, turns questions into SQL with a local
//! Ollama model, and runs a small decision loop where the model picks which tool to use.
//! It implements the MCP protocol over stdin/stdout using JSON-RPC 2.0.
//!
//! ## Features
//!
//! - **Tools**: `query`, `textToSql`, `chat`, `interaction`, `summarize`, `jira`, `add`
//! - **Resources**: `schema://main` and the `greeting://{name}` template
//! - **Bounded chaining**: the decision loop stops after a configurable number of cycles
//!
//! ## Usage
//!
//! The server is typically run as an executable and configured in AI tools like Claude Desktop:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "sqlchat": {
//!       "command": "/path/to/sqlchat-mcp",
//!       "env": { "DB_NAME": "epcs", "DB_SCHEMA": "test", "OLLAMA_MODEL": "gemma3:4b" }
//!     }
//!   }
//! }
//! ```
//!
//! ## Library Usage
//!
//! For testing or embedding, build a session from any [`db::Database`] and
//! [`llm::LanguageModel`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use sqlchat_mcp::config::OrchestratorConfig;
//! use sqlchat_mcp::testing::{MockDatabase, MockLanguageModel};
//! use sqlchat_mcp::{McpServer, McpSession};
//!
//! let session = McpSession::new(
//!     Arc::new(MockDatabase::new()),
//!     Arc::new(MockLanguageModel::new(["Hello!"])),
//!     "test",
//!     &OrchestratorConfig::default(),
//! );
//! let mut server = McpServer::new(session);
//!
//! // Run the server (reads from stdin, writes to stdout)
//! // server.run().await.expect("Server error");
//! ```

#![warn(missing_docs)]

pub mod config;
mod convert;
pub mod db;
mod error;
pub mod jira;
pub mod llm;
pub mod orchestrator;
pub mod resources;
pub mod schema;
mod server;
mod session;
pub mod testing;
pub mod text_to_sql;
pub mod tool_call;
pub mod tools;

pub use convert::{rows_to_pretty_json, MAX_ERROR_DISPLAY_CHARS};
pub use error::{rpc_codes, McpError, Result};
pub use orchestrator::{Orchestrator, ToolResult};
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer};
pub use session::McpSession;
pub use tools::{CallToolResult, ToolDef, ToolRegistry};
