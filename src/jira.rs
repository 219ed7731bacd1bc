//! Minimal Jira Cloud client for the `jira` tool.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::config::JiraConfig;
use crate::error::{McpError, Result};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// The parts of an issue worth summarizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JiraIssue {
    /// Issue key, e.g. `PROJ-123`
    pub key: String,
    /// Issue title
    pub summary: String,
    /// Description flattened to plain text
    pub description: String,
}

impl JiraIssue {
    /// Text handed to the summarizer.
    pub fn to_summary_input(&self) -> String {
        if self.description.is_empty() {
            format!("{}: {}", self.key, self.summary)
        } else {
            format!("{}: {}\n\n{}", self.key, self.summary, self.description)
        }
    }
}

/// Reads issues through the Jira REST API v3 with basic auth.
#[derive(Debug, Clone)]
pub struct JiraClient {
    client: Client,
    base_url: String,
    user_email: String,
    api_token: String,
}

impl JiraClient {
    /// Create a client for `base_url` authenticating as `user_email`.
    pub fn new(
        base_url: impl Into<String>,
        user_email: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| McpError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_email: user_email.into(),
            api_token: api_token.into(),
        })
    }

    /// Build a client when every credential is configured.
    pub fn from_config(config: &JiraConfig) -> Result<Option<Self>> {
        match (&config.base_url, &config.user_email, &config.api_token) {
            (Some(url), Some(email), Some(token)) if config.is_complete() => {
                Self::new(url.as_str(), email.as_str(), token.as_str()).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Fetch one issue by key.
    pub async fn fetch_issue(&self, ticket_id: &str) -> Result<JiraIssue> {
        let ticket_id = ticket_id.trim();
        if ticket_id.is_empty()
            || !ticket_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(McpError::UserInputInvalid(format!(
                "'{}' is not a Jira issue key",
                ticket_id
            )));
        }

        let url = format!("{}/rest/api/3/issue/{}", self.base_url, ticket_id);
        tracing::debug!(%url, "Fetching Jira issue");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.user_email, Some(&self.api_token))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                McpError::BackendUnreachable(format!(
                    "No response from Jira API at {}. Details: {}",
                    self.base_url, e
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            McpError::BackendUnreachable(format!("Failed to read Jira response: {}", e))
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<JiraErrorBody>(&body)
                .ok()
                .map(|b| b.error_messages.join("; "))
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            tracing::warn!(status = status.as_u16(), ticket_id, "Jira API returned an error");
            return Err(McpError::BackendRejected(format!(
                "Jira API Error ({}): {}",
                status.as_u16(),
                detail
            )));
        }

        let issue: IssueResponse = serde_json::from_str(&body).map_err(|e| {
            McpError::MalformedResponse(format!("Unexpected response shape from Jira: {}", e))
        })?;

        Ok(JiraIssue {
            key: issue.key,
            summary: issue.fields.summary.unwrap_or_default(),
            description: issue
                .fields
                .description
                .as_ref()
                .map(adf_to_text)
                .unwrap_or_default(),
        })
    }
}

/// Flatten an Atlassian Document Format node into plain text, one line per block.
pub fn adf_to_text(node: &JsonValue) -> String {
    let mut out = String::new();
    collect_text(node, &mut out);
    out.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(node: &JsonValue, out: &mut String) {
    match node {
        // Older issues and some API versions return plain strings.
        JsonValue::String(text) => out.push_str(text),
        JsonValue::Object(map) => {
            match map.get("type").and_then(JsonValue::as_str) {
                Some("text") => {
                    if let Some(text) = map.get("text").and_then(JsonValue::as_str) {
                        out.push_str(text);
                    }
                    return;
                }
                Some("hardBreak") => {
                    out.push('\n');
                    return;
                }
                Some("listItem") => out.push_str("- "),
                _ => {}
            }
            if let Some(JsonValue::Array(children)) = map.get("content") {
                for child in children {
                    collect_text(child, out);
                }
            }
            if matches!(
                map.get("type").and_then(JsonValue::as_str),
                Some("paragraph" | "heading" | "codeBlock" | "blockquote" | "rule")
            ) {
                out.push('\n');
            }
        }
        _ => {}
    }
}

#[derive(Deserialize)]
struct IssueResponse {
    key: String,
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    summary: Option<String>,
    description: Option<JsonValue>,
}

#[derive(Deserialize)]
struct JiraErrorBody {
    #[serde(rename = "errorMessages", default)]
    error_messages: Vec<String>,
}
