//! Guardrails applied by the database tools.

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Limits on what the database tools may do.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Refuse `executeDatabase` calls entirely.
    #[serde(default)]
    pub read_only: bool,

    /// Maximum rows returned by a single `queryDatabase` call.
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,

    /// Statement keywords that are never executed, regardless of `read_only`.
    #[serde(default = "default_blocked_operations")]
    pub blocked_operations: Vec<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            max_rows: default_max_rows(),
            blocked_operations: default_blocked_operations(),
        }
    }
}

impl DatabaseConfig {
    /// Whether a statement keyword (e.g. "DROP") is blocked. Case-insensitive.
    pub fn is_blocked(&self, keyword: &str) -> bool {
        self.blocked_operations
            .iter()
            .any(|op| op.eq_ignore_ascii_case(keyword))
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.max_rows == 0 || self.max_rows > MAX_ROWS_LIMIT {
            return Err(ConfigError::Validation {
                message: format!(
                    "database.max_rows must be between 1 and {}, got {}",
                    MAX_ROWS_LIMIT, self.max_rows
                ),
            });
        }
        Ok(())
    }
}

/// Largest accepted `max_rows`.
pub const MAX_ROWS_LIMIT: u64 = 1_000_000;

fn default_max_rows() -> u64 {
    1000
}

fn default_blocked_operations() -> Vec<String> {
    vec!["DROP".to_string(), "TRUNCATE".to_string(), "ALTER".to_string()]
}
