//! Database tools exposed to MCP clients.
//!
//! | Tool              | Input             | Effect                                   |
//! |-------------------|-------------------|------------------------------------------|
//! | `listTables`      | none              | tables and columns outside system schemas|
//! | `queryDatabase`   | `{ sql: string }` | one read-only query, rows as JSON        |
//! | `executeDatabase` | `{ sql: string }` | write statements, rows affected          |

use crate::connection::PgConnectionManager;
use crate::error::DbError;
use crate::introspect;
use crate::sql;
use async_trait::async_trait;
use pgmcp_core::{DatabaseConfig, Environment};
use pgmcp_mcp::{
    McpError, ServerBuilder, ToolAnnotations, ToolCollection, ToolContent, ToolDefinition,
    ToolHandler,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

pub const LIST_TABLES: &str = "listTables";
pub const QUERY_DATABASE: &str = "queryDatabase";
pub const EXECUTE_DATABASE: &str = "executeDatabase";

/// The database tool collection.
pub struct DatabaseTools {
    connections: Arc<PgConnectionManager>,
}

impl DatabaseTools {
    pub fn new(connections: Arc<PgConnectionManager>) -> Self {
        Self { connections }
    }
}

impl ToolCollection for DatabaseTools {
    fn name(&self) -> &str {
        "database"
    }

    fn register(&self, server: &mut ServerBuilder, environment: &Environment) -> Result<(), McpError> {
        let database = environment.config().database.clone();

        server.tool(
            ToolDefinition::new(
                LIST_TABLES,
                "List all tables in the database with their columns and types",
                json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
            )
            .with_annotations(ToolAnnotations::read_only()),
            Arc::new(ListTables {
                connections: self.connections.clone(),
            }),
        )?;

        server.tool(
            ToolDefinition::new(
                QUERY_DATABASE,
                format!(
                    "Run a read-only SQL query and return the rows as JSON (at most {} rows)",
                    database.max_rows
                ),
                sql_schema("SELECT statement to run"),
            )
            .with_annotations(ToolAnnotations::read_only()),
            Arc::new(QueryDatabase {
                connections: self.connections.clone(),
                max_rows: database.max_rows,
            }),
        )?;

        server.tool(
            ToolDefinition::new(
                EXECUTE_DATABASE,
                "Execute SQL statements that modify data (INSERT, UPDATE, DELETE) and return the number of rows affected",
                sql_schema("SQL statements to execute"),
            )
            .with_annotations(ToolAnnotations::destructive()),
            Arc::new(ExecuteDatabase {
                connections: self.connections.clone(),
                database,
            }),
        )?;

        Ok(())
    }
}

fn sql_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "sql": {
                "type": "string",
                "description": description
            }
        },
        "required": ["sql"],
        "additionalProperties": false
    })
}

#[derive(Debug, Deserialize)]
struct SqlArguments {
    sql: String,
}

fn sql_arguments(tool: &str, arguments: Value) -> Result<String, McpError> {
    let args: SqlArguments =
        serde_json::from_value(arguments).map_err(|e| McpError::InvalidArguments {
            tool: tool.to_string(),
            reason: e.to_string(),
        })?;
    Ok(args.sql)
}

struct ListTables {
    connections: Arc<PgConnectionManager>,
}

#[async_trait]
impl ToolHandler for ListTables {
    async fn call(&self, _arguments: Value) -> Result<Vec<ToolContent>, McpError> {
        let pool = self.connections.acquire().await?;
        let tables = introspect::list_tables(&pool).await?;
        Ok(vec![ToolContent::json(&tables)])
    }
}

struct QueryDatabase {
    connections: Arc<PgConnectionManager>,
    max_rows: u64,
}

#[async_trait]
impl ToolHandler for QueryDatabase {
    async fn call(&self, arguments: Value) -> Result<Vec<ToolContent>, McpError> {
        let sql = sql_arguments(QUERY_DATABASE, arguments)?;
        let query = sql::validate_query(&sql)?;
        let wrapped = sql::rows_as_json(&query, fetch_limit(self.max_rows));

        let pool = self.connections.acquire().await?;
        let mut tx = pool.begin().await.map_err(DbError::from)?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(DbError::from)?;
        let rows = sqlx::query_scalar::<_, Value>(&wrapped)
            .fetch_one(&mut *tx)
            .await
            .map_err(DbError::from)?;
        tx.rollback().await.map_err(DbError::from)?;

        let (rows, truncated) = cap_rows(rows, self.max_rows);
        let row_count = rows.len();
        tracing::debug!(rows = row_count, truncated, "Query executed");
        Ok(vec![ToolContent::json(&json!({
            "rows": rows,
            "rowCount": row_count,
            "truncated": truncated,
        }))])
    }
}

/// One extra row tells us whether the result was cut off.
fn fetch_limit(max_rows: u64) -> u64 {
    max_rows.saturating_add(1)
}

fn cap_rows(rows: Value, max_rows: u64) -> (Vec<Value>, bool) {
    let mut rows = match rows {
        Value::Array(rows) => rows,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    let max = usize::try_from(max_rows).unwrap_or(usize::MAX);
    let truncated = rows.len() > max;
    rows.truncate(max);
    (rows, truncated)
}

struct ExecuteDatabase {
    connections: Arc<PgConnectionManager>,
    database: DatabaseConfig,
}

#[async_trait]
impl ToolHandler for ExecuteDatabase {
    async fn call(&self, arguments: Value) -> Result<Vec<ToolContent>, McpError> {
        let sql = sql_arguments(EXECUTE_DATABASE, arguments)?;
        let statements = sql::validate_statement(&sql, &self.database)?;

        let pool = self.connections.acquire().await?;
        let result = sqlx::raw_sql(&sql)
            .execute(&pool)
            .await
            .map_err(DbError::from)?;

        tracing::info!(
            statements,
            rows_affected = result.rows_affected(),
            "Write executed"
        );
        Ok(vec![ToolContent::json(&json!({
            "rowsAffected": result.rows_affected(),
        }))])
    }
}
