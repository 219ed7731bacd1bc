//! Runtime configuration.
//!
//! Every setting can come from a command-line flag or from the environment variable
//! named next to it. The groups are flattened into the binary's argument parser.

use std::time::Duration;

use sqlx::postgres::PgConnectOptions;

/// PostgreSQL connection settings.
#[derive(Debug, Clone, clap::Args)]
pub struct DatabaseConfig {
    /// Database host.
    #[arg(long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,

    /// Database port.
    #[arg(long = "db-port", env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Database user.
    #[arg(long = "db-user", env = "DB_USER", default_value = "postgres")]
    pub user: String,

    /// Database password.
    #[arg(
        long = "db-password",
        env = "DB_PASSWORD",
        default_value = "password",
        hide_env_values = true
    )]
    pub password: String,

    /// Database name.
    #[arg(long = "db-name", env = "DB_NAME", default_value = "epcs")]
    pub name: String,

    /// Schema described to the language model and used by text-to-SQL.
    #[arg(long = "db-schema", env = "DB_SCHEMA", default_value = "test")]
    pub schema: String,

    /// Maximum number of pooled connections.
    #[arg(long = "db-max-connections", env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Build sqlx connection options from these settings.
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}

/// Ollama backend settings.
#[derive(Debug, Clone, clap::Args)]
pub struct OllamaConfig {
    /// Base URL of the Ollama HTTP API.
    #[arg(
        long = "ollama-url",
        env = "OLLAMA_API_BASE_URL",
        default_value = "http://127.0.0.1:11434"
    )]
    pub base_url: String,

    /// Model name used for every completion.
    #[arg(long = "ollama-model", env = "OLLAMA_MODEL", default_value = "gemma3:4b")]
    pub model: String,

    /// Per-request timeout in seconds.
    #[arg(long = "ollama-timeout", env = "OLLAMA_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,
}

impl OllamaConfig {
    /// Create a config for the given endpoint and model with the default timeout.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            timeout_secs: 60,
        }
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// URL of the chat completion endpoint.
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url.trim_end_matches('/'))
    }

    /// URL of the single-prompt generation endpoint.
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

/// Jira credentials. The `jira` tool is disabled unless all three are set.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct JiraConfig {
    /// Jira site, e.g. https://example.atlassian.net
    #[arg(long = "jira-url", env = "JIRA_BASE_URL")]
    pub base_url: Option<String>,

    /// Account email used for basic auth.
    #[arg(long = "jira-email", env = "JIRA_USER_EMAIL")]
    pub user_email: Option<String>,

    /// API token used for basic auth.
    #[arg(long = "jira-token", env = "JIRA_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,
}

impl JiraConfig {
    /// Whether every credential needed to reach Jira is present.
    pub fn is_complete(&self) -> bool {
        [&self.base_url, &self.user_email, &self.api_token]
            .iter()
            .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()))
    }
}

/// Orchestration limits.
#[derive(Debug, Clone, clap::Args)]
pub struct OrchestratorConfig {
    /// Maximum number of decision cycles one interaction may chain through.
    #[arg(long = "max-tool-chain", env = "MAX_TOOL_CHAIN", default_value_t = 5)]
    pub max_chain_steps: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_chain_steps: 5 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_urls_ignore_trailing_slash() {
        let config = OllamaConfig::new("http://localhost:11434/", "llama3");
        assert_eq!(config.chat_url(), "http://localhost:11434/api/chat");
        assert_eq!(config.generate_url(), "http://localhost:11434/api/generate");
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_jira_config_requires_all_fields() {
        let mut config = JiraConfig {
            base_url: Some("https://example.atlassian.net".into()),
            user_email: Some("dev@example.com".into()),
            api_token: None,
        };
        assert!(!config.is_complete());

        config.api_token = Some("  ".into());
        assert!(!config.is_complete());

        config.api_token = Some("secret".into());
        assert!(config.is_complete());
    }
}
