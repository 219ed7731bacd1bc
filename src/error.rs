//! Error types for the MCP server.
//!
//! Every failure the server can observe (database, language model, tool-call parsing,
//! protocol) is folded into one [`McpError`]. The distinction between failure classes
//! lives in the variant and its message; callers above the orchestrator never branch
//! on it, they render it.

use serde::{Deserialize, Serialize};

/// MCP server errors.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum McpError {
    /// A backend (database or language model) could not be reached.
    #[error("{0}")]
    BackendUnreachable(String),

    /// A backend was reached but answered with an application-level error.
    #[error("{0}")]
    BackendRejected(String),

    /// The language model answered with an unexpected shape.
    #[error("{0}")]
    MalformedResponse(String),

    /// A tool call emitted by the language model could not be parsed.
    #[error("{0}")]
    ParseFailure(String),

    /// Unknown tool requested.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The translator answered with its refusal sentinel.
    #[error("{0}")]
    TranslationRefused(String),

    /// The schema has no base tables and cannot back a translation.
    #[error("{0}")]
    SchemaUnavailable(String),

    /// Tool chaining went past the configured number of steps.
    #[error("tool chain exceeded the maximum of {0} steps")]
    ChainTooLong(usize),

    /// Caller input failed validation.
    #[error("invalid input: {0}")]
    UserInputInvalid(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArg(String),

    /// Invalid argument value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg {
        /// Argument name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// No resource matches the requested URI.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// JSON-RPC protocol error.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for McpError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => McpError::BackendRejected(db_err.message().to_string()),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => McpError::BackendUnreachable(err.to_string()),
            _ => McpError::BackendRejected(err.to_string()),
        }
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON error: {}", err))
    }
}

/// JSON-RPC error codes.
pub mod rpc_codes {
    /// Parse error - Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Resource not found (MCP extension).
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
}

impl McpError {
    /// Convert to JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            McpError::UnknownTool(_) => rpc_codes::METHOD_NOT_FOUND,
            McpError::MissingArg(_)
            | McpError::InvalidArg { .. }
            | McpError::UserInputInvalid(_) => rpc_codes::INVALID_PARAMS,
            McpError::Protocol(_) => rpc_codes::INVALID_REQUEST,
            McpError::ResourceNotFound(_) => rpc_codes::RESOURCE_NOT_FOUND,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;
