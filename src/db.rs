//! Database access.
//!
//! [`Database`] is the seam the schema formatter and the SQL tools work against.
//! [`PgDatabase`] implements it on a pooled PostgreSQL connection.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value as JsonValue};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Postgres, Row as _, TypeInfo};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::convert::preview;
use crate::error::Result;

/// One result row: column name to JSON value, in column order.
pub type Row = Map<String, JsonValue>;

/// Catalog metadata for a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Declared type as reported by the catalog
    pub data_type: String,
    /// Whether NULL is allowed
    pub is_nullable: bool,
    /// Default expression, verbatim
    pub default: Option<String>,
    /// Maximum character length, when the type has one
    pub max_length: Option<i32>,
}

impl ColumnInfo {
    /// Create a nullable column with no default or length.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
            max_length: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Set the default expression.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Set the maximum character length.
    pub fn with_max_length(mut self, len: i32) -> Self {
        self.max_length = Some(len);
        self
    }
}

/// Relational database operations used by the tools.
///
/// Implementations must be safe to share across concurrent tool calls.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute one SQL statement and return its rows in backend order.
    async fn execute(&self, sql: &str) -> Result<Vec<Row>>;

    /// Names of the base tables in `schema`, alphabetically.
    async fn base_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Columns of `schema.table` in ordinal order.
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Primary-key columns of `schema.table` in key order. Empty when there is no key.
    async fn primary_key(&self, schema: &str, table: &str) -> Result<Vec<String>>;
}

/// PostgreSQL-backed [`Database`].
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Open a connection pool with the given settings.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(config.connect_options())
            .await?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "PostgreSQL pool created"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check connectivity with a trivial query.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        tracing::info!("Closing PostgreSQL pool");
        self.pool.close().await;
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>> {
        tracing::debug!(sql = %preview(sql, 100), "Executing SQL");
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .inspect_err(|e| tracing::warn!(sql = %preview(sql, 100), error = %e, "Query failed"))?;
        tracing::debug!(rows = rows.len(), "Query returned");
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn base_tables(&self, schema: &str) -> Result<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(
            r#"
            select table_name::text
            from information_schema.tables
            where table_schema = $1
              and table_type = 'BASE TABLE'
            order by table_name
            "#,
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>, Option<i32>)>(
            r#"
            select
              c.column_name::text,
              c.data_type::text,
              c.is_nullable::text,
              c.column_default::text,
              c.character_maximum_length::int4
            from information_schema.columns c
            where c.table_schema = $1
              and c.table_name = $2
            order by c.ordinal_position
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default, max_length)| ColumnInfo {
                name,
                data_type,
                is_nullable: is_nullable != "NO",
                default,
                max_length,
            })
            .collect())
    }

    async fn primary_key(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let columns = sqlx::query_scalar::<_, String>(
            r#"
            select kcu.column_name::text
            from information_schema.table_constraints tc
            join information_schema.key_column_usage kcu
              on tc.constraint_name = kcu.constraint_name
             and tc.table_schema = kcu.table_schema
            where tc.constraint_type = 'PRIMARY KEY'
              and tc.table_schema = $1
              and tc.table_name = $2
            order by kcu.ordinal_position
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(columns)
    }
}

/// Convert a Postgres row to a JSON object, keeping column order.
fn row_to_json(row: &PgRow) -> Row {
    let mut obj = Map::new();
    for col in row.columns() {
        let value = column_to_json(row, col.ordinal(), col.type_info().name());
        obj.insert(col.name().to_string(), value);
    }
    obj
}

/// Decode one column by its Postgres type name. Undecodable values become null.
fn column_to_json(row: &PgRow, idx: usize, type_name: &str) -> JsonValue {
    let value = match type_name {
        "INT2" => decode(row, idx, |v: i16| json!(v)),
        "INT4" => decode(row, idx, |v: i32| json!(v)),
        "INT8" => decode(row, idx, |v: i64| json!(v)),
        "FLOAT4" => decode(row, idx, |v: f32| json!(v)),
        "FLOAT8" => decode(row, idx, |v: f64| json!(v)),
        // Numerics keep their exact decimal text.
        "NUMERIC" => decode(row, idx, |v: BigDecimal| json!(v.to_string())),
        "BOOL" => decode(row, idx, |v: bool| json!(v)),
        "JSON" | "JSONB" => decode(row, idx, |v: JsonValue| v),
        "UUID" => decode(row, idx, |v: Uuid| json!(v.to_string())),
        "TIMESTAMPTZ" => decode(row, idx, |v: DateTime<Utc>| {
            json!(v.to_rfc3339_opts(SecondsFormat::Millis, true))
        }),
        "TIMESTAMP" => decode(row, idx, |v: NaiveDateTime| {
            json!(v.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
        }),
        "DATE" => decode(row, idx, |v: NaiveDate| json!(v.to_string())),
        "TIME" => decode(row, idx, |v: NaiveTime| json!(v.to_string())),
        _ => decode(row, idx, |v: String| json!(v)),
    };
    value.unwrap_or(JsonValue::Null)
}

fn decode<'r, T>(row: &'r PgRow, idx: usize, to_json: impl FnOnce(T) -> JsonValue) -> Option<JsonValue>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get::<Option<T>, _>(idx)
        .ok()
        .map(|v| v.map(to_json).unwrap_or(JsonValue::Null))
}
