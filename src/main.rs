//! MCP server for natural-language access to a PostgreSQL database.
//!
//! Run with `sqlchat-mcp` (or `sqlchat-mcp serve`) to speak MCP over stdio. Connection
//! settings come from flags or the `DB_*`, `OLLAMA_*` and `JIRA_*` environment variables.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{Map, Value as JsonValue};
use tracing_subscriber::EnvFilter;

use sqlchat_mcp::config::{DatabaseConfig, JiraConfig, OllamaConfig, OrchestratorConfig};
use sqlchat_mcp::db::PgDatabase;
use sqlchat_mcp::jira::JiraClient;
use sqlchat_mcp::llm::OllamaClient;
use sqlchat_mcp::schema::format_schema;
use sqlchat_mcp::{McpServer, McpSession, ToolRegistry};

/// MCP server for natural-language access to a PostgreSQL database.
///
/// Exposes schema introspection, SQL execution, text-to-SQL and an orchestrated
/// interaction tool backed by a local Ollama model.
/// Communicates via JSON-RPC 2.0 over stdin/stdout.
#[derive(Parser)]
#[command(name = "sqlchat-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(flatten)]
    database: DatabaseConfig,

    #[command(flatten)]
    ollama: OllamaConfig,

    #[command(flatten)]
    jira: JiraConfig,

    #[command(flatten)]
    orchestrator: OrchestratorConfig,

    /// Enable debug logging to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve MCP over stdin/stdout (the default).
    Serve,
    /// Invoke one tool and print its output.
    Call {
        /// Tool name, e.g. textToSql
        tool: String,
        /// Tool arguments as a JSON object.
        #[arg(long, default_value = "{}")]
        args: String,
    },
    /// Print the schema description given to the language model.
    Schema,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // stdout carries the protocol; logs go to stderr.
    let filter = if args.verbose {
        EnvFilter::new("sqlchat_mcp=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sqlchat_mcp=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let db = match PgDatabase::connect(&args.database).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            eprintln!("Error: Failed to connect to database: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = db.ping().await {
        eprintln!("Error: Database connection check failed: {}", e);
        return ExitCode::FAILURE;
    }
    tracing::info!(
        host = %args.database.host,
        database = %args.database.name,
        schema = %args.database.schema,
        "Connected to PostgreSQL"
    );

    let code = run(args, db.clone()).await;

    db.close().await;
    tracing::info!("Database pool closed");
    code
}

async fn run(args: Args, db: Arc<PgDatabase>) -> ExitCode {
    let llm = match OllamaClient::new(args.ollama) {
        Ok(llm) => Arc::new(llm),
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let jira = match JiraClient::from_config(&args.jira) {
        Ok(jira) => jira,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if jira.is_none() {
        tracing::debug!("Jira not configured; the jira tool will report an error");
    }

    let session = McpSession::new(db.clone(), llm, args.database.schema.clone(), &args.orchestrator)
        .with_jira(jira);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let mut server = McpServer::new(session);
            tracing::info!("Serving MCP on stdio");
            tokio::select! {
                result = server.run() => {
                    if let Err(e) = result {
                        eprintln!("Error: Server error: {}", e);
                        return ExitCode::FAILURE;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, shutting down");
                }
            }
            ExitCode::SUCCESS
        }

        Command::Call { tool, args } => {
            let arguments: Map<String, JsonValue> = match serde_json::from_str(&args) {
                Ok(map) => map,
                Err(e) => {
                    eprintln!("Error: --args must be a JSON object: {}", e);
                    return ExitCode::FAILURE;
                }
            };
            match ToolRegistry::new().dispatch(&session, &tool, arguments).await {
                Ok(result) => {
                    println!("{}", result.text);
                    if result.is_error {
                        ExitCode::FAILURE
                    } else {
                        ExitCode::SUCCESS
                    }
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }

        Command::Schema => match format_schema(db.as_ref(), session.schema()).await {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error: Failed to fetch schema: {}", e);
                ExitCode::FAILURE
            }
        },
    }
}
