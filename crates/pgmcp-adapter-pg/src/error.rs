//! Error types for the Postgres adapter.

use pgmcp_core::config::redact_url;
use pgmcp_mcp::McpError;
use thiserror::Error;

/// Errors raised by the database tools and the connection manager.
///
/// Messages never carry connection credentials.
#[derive(Debug, Error)]
pub enum DbError {
    /// The SQL argument was empty or whitespace.
    #[error("SQL must not be empty")]
    EmptySql,

    /// SQL parsing failed.
    #[error("failed to parse SQL: {0}")]
    ParseError(String),

    /// A read-only tool received a statement that is not a query.
    #[error("only SELECT queries are allowed here, got {statement}")]
    NotReadOnly { statement: String },

    /// A read-only tool received several statements.
    #[error("expected a single query, got {count} statements")]
    MultipleStatements { count: usize },

    /// Statement keyword listed in `database.blocked_operations`.
    #[error("operation {operation} is blocked")]
    OperationBlocked { operation: String },

    /// Writes are disabled by configuration.
    #[error("database is configured read-only, write statements are refused")]
    ReadOnly,

    /// The pool could not be created.
    #[error("failed to connect to database: {0}")]
    Connect(String),

    /// The database rejected or failed the statement.
    #[error("database error: {0}")]
    Query(String),
}

impl DbError {
    /// Wrap a connection failure.
    pub fn connect(err: sqlx::Error) -> Self {
        DbError::Connect(describe(&err))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        DbError::Query(describe(&err))
    }
}

impl From<DbError> for McpError {
    fn from(err: DbError) -> Self {
        McpError::ExecutionFailed(err.to_string())
    }
}

/// Human readable description of a sqlx error.
fn describe(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => format!("{} (SQLSTATE {})", db.message(), code),
            None => db.message().to_string(),
        },
        sqlx::Error::PoolTimedOut => "timed out waiting for a connection".to_string(),
        sqlx::Error::PoolClosed => "connection pool is closed".to_string(),
        other => scrub_credentials(&other.to_string()),
    }
}

/// Redact passwords from any URL embedded in `message`.
pub fn scrub_credentials(message: &str) -> String {
    message
        .split(' ')
        .map(|word| {
            if word.contains("://") {
                redact_url(word)
            } else {
                word.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
