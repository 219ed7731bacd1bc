//! MCP resources.
//!
//! `schema://main` is the live schema description; `greeting://{name}` is a template
//! answering `Hello, <name>!`.

use serde::{Deserialize, Serialize};

use crate::error::{McpError, Result};
use crate::schema::format_schema;
use crate::session::McpSession;

/// URI of the schema description.
pub const SCHEMA_URI: &str = "schema://main";

const GREETING_PREFIX: &str = "greeting://";

/// A concrete resource for resources/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDef {
    /// Resource URI
    pub uri: String,
    /// Short name
    pub name: String,
    /// What reading it returns
    pub description: String,
    /// Content type
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// A parameterized resource for resources/templates/list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTemplateDef {
    /// RFC 6570 URI template
    #[serde(rename = "uriTemplate")]
    pub uri_template: String,
    /// Short name
    pub name: String,
    /// What reading it returns
    pub description: String,
}

/// One entry of a resources/read result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceContents {
    /// URI that was read
    pub uri: String,
    /// Text content
    pub text: String,
}

/// Concrete resources.
pub fn resources() -> Vec<ResourceDef> {
    vec![ResourceDef {
        uri: SCHEMA_URI.to_string(),
        name: "schema".to_string(),
        description: "CREATE TABLE description of every base table in the configured schema."
            .to_string(),
        mime_type: "text/plain".to_string(),
    }]
}

/// Resource templates.
pub fn templates() -> Vec<ResourceTemplateDef> {
    vec![ResourceTemplateDef {
        uri_template: format!("{}{{name}}", GREETING_PREFIX),
        name: "greeting".to_string(),
        description: "A greeting for the given name.".to_string(),
    }]
}

/// Read the resource at `uri`.
pub async fn read(session: &McpSession, uri: &str) -> Result<Vec<ResourceContents>> {
    tracing::debug!(uri, "Reading resource");

    if uri == SCHEMA_URI {
        let text = match format_schema(session.db(), session.schema()).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to fetch schema");
                format!("Error fetching schema: {}", e)
            }
        };
        return Ok(vec![ResourceContents {
            uri: uri.to_string(),
            text,
        }]);
    }

    if let Some(name) = uri.strip_prefix(GREETING_PREFIX).filter(|n| !n.is_empty()) {
        return Ok(vec![ResourceContents {
            uri: uri.to_string(),
            text: format!("Hello, {}!", name),
        }]);
    }

    Err(McpError::ResourceNotFound(uri.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::db::ColumnInfo;
    use crate::testing::{MockDatabase, MockLanguageModel};
    use std::sync::Arc;

    fn session(db: MockDatabase) -> McpSession {
        McpSession::new(
            Arc::new(db),
            Arc::new(MockLanguageModel::default()),
            "test",
            &OrchestratorConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_schema_resource() {
        let db = MockDatabase::new().with_table(
            "test",
            "users",
            vec![ColumnInfo::new("id", "integer").not_null()],
            vec!["id"],
        );
        let contents = read(&session(db), SCHEMA_URI).await.unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].uri, SCHEMA_URI);
        assert!(contents[0].text.contains("CREATE TABLE test.users ("));
    }

    #[tokio::test]
    async fn test_schema_resource_reports_failures_as_text() {
        let db = MockDatabase::new().with_catalog_error("connection refused");
        let contents = read(&session(db), SCHEMA_URI).await.unwrap();
        assert_eq!(contents[0].text, "Error fetching schema: connection refused");
    }

    #[tokio::test]
    async fn test_greeting_and_unknown() {
        let s = session(MockDatabase::new());
        let contents = read(&s, "greeting://Ada").await.unwrap();
        assert_eq!(contents[0].text, "Hello, Ada!");

        assert!(matches!(
            read(&s, "greeting://").await,
            Err(McpError::ResourceNotFound(_))
        ));
        assert!(matches!(
            read(&s, "file:///etc/passwd").await,
            Err(McpError::ResourceNotFound(_))
        ));
    }
}
