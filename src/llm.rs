//! Language-model gateway.
//!
//! [`LanguageModel`] is the seam every prompt goes through. [`OllamaClient`] implements it
//! against a local Ollama server using its non-streaming `/api/chat` and `/api/generate`
//! endpoints.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::OllamaConfig;
use crate::error::{McpError, Result};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation
    System,
    /// The human (or calling agent)
    User,
    /// The model
    Assistant,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it
    pub role: Role,
    /// What was said
    pub content: String,
}

impl ChatMessage {
    /// Create a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling options sent with a request. Unset fields use the backend's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GenerationOptions {
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl GenerationOptions {
    /// Options with only a temperature set.
    pub fn with_temperature(temperature: f64) -> Self {
        Self {
            temperature: Some(temperature),
        }
    }

    fn is_empty(&self) -> bool {
        self.temperature.is_none()
    }
}

/// Requested summary size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    /// One or two sentences
    Brief,
    /// A paragraph or two
    #[default]
    Medium,
    /// A few paragraphs with supporting detail
    Detailed,
}

impl SummaryLength {
    fn instructions(self) -> &'static str {
        match self {
            SummaryLength::Brief => "Provide a very concise summary, ideally one to two sentences.",
            SummaryLength::Medium => {
                "Provide a concise summary, focusing on the main points in a paragraph or two."
            }
            SummaryLength::Detailed => {
                "Provide a comprehensive summary, including key details and supporting \
                 information, covering a few paragraphs."
            }
        }
    }
}

impl FromStr for SummaryLength {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "brief" => Ok(SummaryLength::Brief),
            "medium" => Ok(SummaryLength::Medium),
            "detailed" => Ok(SummaryLength::Detailed),
            other => Err(McpError::InvalidArg {
                name: "length".to_string(),
                reason: format!("expected brief, medium or detailed, got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SummaryLength::Brief => "brief",
            SummaryLength::Medium => "medium",
            SummaryLength::Detailed => "detailed",
        };
        f.write_str(s)
    }
}

/// Temperature used for summaries.
const SUMMARY_TEMPERATURE: f64 = 0.5;

/// Build the single-prompt summarization request for `text`.
pub fn summary_prompt(text: &str, length: SummaryLength) -> String {
    format!(
        "You are an expert summarizer. Your task is to accurately and concisely summarize the \
         following text based on the user's requested length.\n\n\
         Instructions: {}\n\
         Output ONLY the summarized text. Do not include any preambles, comments, or markdown \
         formatting.\n\n\
         Text to Summarize:\n---\n{}\n---\n\nSummary:",
        length.instructions(),
        text
    )
}

/// A chat-completion backend.
///
/// Implementations must be safe to share between concurrent tool calls. Every failure,
/// whatever its cause, is reported as an [`McpError`] with a readable message.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send the ordered conversation and return the assistant's reply, trimmed.
    ///
    /// An empty or missing reply is an error.
    async fn chat_complete(&self, messages: &[ChatMessage], options: GenerationOptions) -> Result<String>;

    /// Complete a single free-form prompt.
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String>;

    /// Summarize `text` at the requested length.
    async fn summarize(&self, text: &str, length: SummaryLength) -> Result<String> {
        self.generate(
            &summary_prompt(text, length),
            GenerationOptions::with_temperature(SUMMARY_TEMPERATURE),
        )
        .await
    }
}

/// [`LanguageModel`] backed by an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

impl OllamaClient {
    /// Create a client for the configured server.
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| McpError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// The model every request names.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn post<T: DeserializeOwned>(&self, url: &str, payload: &impl Serialize) -> Result<T> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| unreachable_error(&self.config.base_url, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| unreachable_error(&self.config.base_url, e))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), body = %body, "Ollama API returned an error");
            let detail = serde_json::from_str::<OllamaErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or_else(|_| {
                    if body.trim().is_empty() {
                        status.canonical_reason().unwrap_or("unknown error").to_string()
                    } else {
                        body
                    }
                });
            return Err(McpError::BackendRejected(format!(
                "Ollama API Error ({}): {}",
                status.as_u16(),
                detail
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            McpError::MalformedResponse(format!("Unexpected response shape from Ollama: {}", e))
        })
    }
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn chat_complete(&self, messages: &[ChatMessage], options: GenerationOptions) -> Result<String> {
        let payload = OllamaChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
            options: (!options.is_empty()).then_some(options),
        };

        tracing::debug!(model = %self.config.model, messages = messages.len(), "Sending Ollama chat request");
        let response: OllamaChatResponse = self.post(&self.config.chat_url(), &payload).await?;

        let content = response
            .message
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(McpError::MalformedResponse(
                "Failed to extract assistant's message from Ollama response. Ensure the model is \
                 responding as expected."
                    .to_string(),
            ));
        }

        tracing::debug!(reply = %content, "Ollama chat reply");
        Ok(content)
    }

    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String> {
        let payload = OllamaGenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: (!options.is_empty()).then_some(options),
        };

        tracing::debug!(model = %self.config.model, prompt_chars = prompt.len(), "Sending Ollama generate request");
        let response: OllamaGenerateResponse = self.post(&self.config.generate_url(), &payload).await?;

        let content = response
            .response
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(McpError::MalformedResponse(
                "Failed to extract generated content from Ollama response. Ensure the model is \
                 responding correctly."
                    .to_string(),
            ));
        }
        Ok(content)
    }
}

fn unreachable_error(base_url: &str, err: reqwest::Error) -> McpError {
    tracing::warn!(error = %err, "Ollama API unreachable");
    McpError::BackendUnreachable(format!(
        "No response from Ollama API. Is it running at {}? Details: {}",
        base_url, err
    ))
}

// ─────────────────────────────────────────────────────────────────────────────
// Ollama API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaResponseMessage>,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct OllamaErrorBody {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> OllamaClient {
        OllamaClient::new(OllamaConfig::new(server.uri(), "llama3")).unwrap()
    }

    #[test]
    fn test_chat_message_serializes_lowercase_role() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json, json!({"role": "assistant", "content": "hi"}));
    }

    #[test]
    fn test_summary_length_parse() {
        assert_eq!("Brief".parse::<SummaryLength>().unwrap(), SummaryLength::Brief);
        assert_eq!(" detailed ".parse::<SummaryLength>().unwrap(), SummaryLength::Detailed);
        assert!("long".parse::<SummaryLength>().is_err());
        assert_eq!(SummaryLength::default(), SummaryLength::Medium);
    }

    #[test]
    fn test_summary_prompt_embeds_instructions_and_text() {
        let prompt = summary_prompt("The quick brown fox.", SummaryLength::Brief);
        assert!(prompt.contains("one to two sentences"));
        assert!(prompt.contains("---\nThe quick brown fox.\n---"));
        assert!(prompt.ends_with("Summary:"));
    }

    #[tokio::test]
    async fn test_chat_complete_returns_trimmed_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "llama3",
                "stream": false,
                "messages": [{"role": "user", "content": "hello"}],
                "options": {"temperature": 0.5}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3",
                "message": {"role": "assistant", "content": "  Hi there!\n"},
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let reply = client
            .chat_complete(&[ChatMessage::user("hello")], GenerationOptions::with_temperature(0.5))
            .await
            .unwrap();
        assert_eq!(reply, "Hi there!");
    }

    #[tokio::test]
    async fn test_backend_error_carries_status_and_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "model 'llama3' not found"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .chat_complete(&[ChatMessage::user("hello")], GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::BackendRejected(_)));
        assert_eq!(err.to_string(), "Ollama API Error (404): model 'llama3' not found");
    }

    #[tokio::test]
    async fn test_empty_reply_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "   "}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client
            .chat_complete(&[ChatMessage::user("hello")], GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_backend_names_endpoint() {
        let client = OllamaClient::new(OllamaConfig::new("http://127.0.0.1:1", "llama3")).unwrap();
        let err = client
            .chat_complete(&[ChatMessage::user("hello")], GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::BackendUnreachable(_)));
        assert!(err.to_string().contains("http://127.0.0.1:1"));
    }

    #[tokio::test]
    async fn test_summarize_uses_generate_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(json!({
                "model": "llama3",
                "stream": false,
                "options": {"temperature": 0.5}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": "A fox jumped.",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let summary = client
            .summarize("The quick brown fox jumps over the lazy dog.", SummaryLength::Brief)
            .await
            .unwrap();
        assert_eq!(summary, "A fox jumped.");
    }
}
