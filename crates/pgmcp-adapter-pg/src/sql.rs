//! SQL validation for the database tools.
//!
//! Statements are parsed with the PostgreSQL dialect before anything is sent
//! to the server. Read tools accept a single query; write tools accept any
//! statement whose leading keyword is not blocked.

use crate::error::DbError;
use pgmcp_core::DatabaseConfig;
use sqlparser::ast::Statement;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

/// Parse `sql` into statements, rejecting empty input.
pub fn parse(sql: &str) -> Result<Vec<Statement>, DbError> {
    if sql.trim().is_empty() {
        return Err(DbError::EmptySql);
    }

    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| DbError::ParseError(e.to_string()))?;

    if statements.is_empty() {
        return Err(DbError::EmptySql);
    }
    Ok(statements)
}

/// Validate input for a read-only call and return the single query.
pub fn validate_query(sql: &str) -> Result<Statement, DbError> {
    let mut statements = parse(sql)?;

    if let Some(stmt) = statements.iter().find(|s| !matches!(s, Statement::Query(_))) {
        return Err(DbError::NotReadOnly {
            statement: leading_keyword(stmt),
        });
    }
    if statements.len() > 1 {
        return Err(DbError::MultipleStatements {
            count: statements.len(),
        });
    }
    Ok(statements.remove(0))
}

/// Validate input for a write call against the configured guardrails.
///
/// Returns the number of statements.
pub fn validate_statement(sql: &str, config: &DatabaseConfig) -> Result<usize, DbError> {
    let statements = parse(sql)?;

    for stmt in &statements {
        let keyword = leading_keyword(stmt);
        if config.is_blocked(&keyword) {
            return Err(DbError::OperationBlocked { operation: keyword });
        }
    }

    if config.read_only {
        return Err(DbError::ReadOnly);
    }
    Ok(statements.len())
}

/// Wrap a validated query so that it yields at most `limit` rows as one JSON
/// array.
pub fn rows_as_json(query: &Statement, limit: u64) -> String {
    format!(
        "SELECT coalesce(json_agg(t), '[]'::json) FROM (SELECT * FROM ({query}) AS q LIMIT {limit}) AS t"
    )
}

/// First keyword of a statement, upper-cased (e.g. `DROP`).
pub fn leading_keyword(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sql_rejected() {
        assert!(matches!(parse(""), Err(DbError::EmptySql)));
        assert!(matches!(parse("   \n\t"), Err(DbError::EmptySql)));
        assert!(matches!(validate_query(" "), Err(DbError::EmptySql)));
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(parse("SELEC 1"), Err(DbError::ParseError(_))));
    }

    #[test]
    fn test_query_accepted() {
        let stmt = validate_query("SELECT id, name FROM users WHERE id = 1").unwrap();
        assert!(matches!(stmt, Statement::Query(_)));

        assert!(validate_query("WITH a AS (SELECT 1 AS x) SELECT x FROM a;").is_ok());
    }

    #[test]
    fn test_write_rejected_for_query() {
        let err = validate_query("DELETE FROM users").unwrap_err();
        match err {
            DbError::NotReadOnly { statement } => assert_eq!(statement, "DELETE"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_smuggled_statement_rejected() {
        assert!(matches!(
            validate_query("SELECT 1; DROP TABLE users"),
            Err(DbError::NotReadOnly { .. })
        ));
        assert!(matches!(
            validate_query("SELECT 1; SELECT 2"),
            Err(DbError::MultipleStatements { count: 2 })
        ));
    }

    #[test]
    fn test_blocked_operations() {
        let config = DatabaseConfig::default();
        for sql in [
            "DROP TABLE users",
            "TRUNCATE users",
            "ALTER TABLE users ADD COLUMN age INT",
            "INSERT INTO t VALUES (1); drop table t",
        ] {
            assert!(
                matches!(
                    validate_statement(sql, &config),
                    Err(DbError::OperationBlocked { .. })
                ),
                "{sql} should be blocked"
            );
        }
    }

    #[test]
    fn test_write_allowed() {
        let config = DatabaseConfig::default();
        assert_eq!(
            validate_statement("UPDATE users SET name = 'a' WHERE id = 1", &config).unwrap(),
            1
        );
        assert_eq!(
            validate_statement(
                "INSERT INTO t (a) VALUES (1); DELETE FROM t WHERE a = 2",
                &config
            )
            .unwrap(),
            2
        );
    }

    #[test]
    fn test_read_only_mode_refuses_writes() {
        let config = DatabaseConfig {
            read_only: true,
            ..Default::default()
        };
        assert!(matches!(
            validate_statement("INSERT INTO t VALUES (1)", &config),
            Err(DbError::ReadOnly)
        ));
    }

    #[test]
    fn test_rows_as_json_applies_limit() {
        let stmt = validate_query("SELECT * FROM users;").unwrap();
        let wrapped = rows_as_json(&stmt, 11);
        assert!(wrapped.contains("FROM (SELECT * FROM users) AS q LIMIT 11"));
        assert!(!wrapped.contains(';'));
    }

    #[test]
    fn test_leading_keyword() {
        let stmts = parse("create table t (a int)").unwrap();
        assert_eq!(leading_keyword(&stmts[0]), "CREATE");
    }
}
