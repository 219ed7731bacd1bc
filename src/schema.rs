//! DDL-like schema description for language-model prompts.

use crate::db::{ColumnInfo, Database};
use crate::error::Result;

/// Prefix of the text returned for a schema with no base tables.
pub const NO_TABLES_SENTINEL: &str = "-- No tables found";

/// Whether `schema_text` is the no-tables sentinel rather than a usable schema.
pub fn is_empty_schema(schema_text: &str) -> bool {
    schema_text.trim_start().starts_with(NO_TABLES_SENTINEL)
}

/// Describe every base table of `schema` as a `CREATE TABLE` block.
///
/// Tables are listed alphabetically and columns in declaration order. The text is
/// rebuilt from the catalog on every call.
pub async fn format_schema(db: &dyn Database, schema: &str) -> Result<String> {
    tracing::debug!(schema, "Fetching schema description");
    let mut tables = db.base_tables(schema).await?;
    tables.sort();

    if tables.is_empty() {
        return Ok(format!("{} in '{}' schema.", NO_TABLES_SENTINEL, schema));
    }

    let mut out = format!("-- PostgreSQL Schema for context from schema '{}':\n", schema);
    for table in &tables {
        let columns = db.columns(schema, table).await?;
        let primary_key = db.primary_key(schema, table).await?;

        out.push_str(&format!("\nCREATE TABLE {}.{} (\n", schema, table));
        let mut lines: Vec<String> = columns.iter().map(column_definition).collect();
        if !primary_key.is_empty() {
            lines.push(format!("  PRIMARY KEY ({})", primary_key.join(", ")));
        }
        out.push_str(&lines.join(",\n"));
        out.push_str("\n);\n");
    }

    tracing::debug!(schema, tables = tables.len(), "Schema description built");
    Ok(out.trim().to_string())
}

fn column_definition(col: &ColumnInfo) -> String {
    let mut def = format!("  {} {}", col.name, col.data_type);
    if let Some(len) = col.max_length.filter(|len| *len > 0) {
        def.push_str(&format!("({})", len));
    }
    if !col.is_nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(default) = col.default.as_deref().filter(|d| !d.is_empty()) {
        def.push_str(" DEFAULT ");
        def.push_str(default);
    }
    def
}
