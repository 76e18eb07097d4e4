//! Process-wide environment handed to session actors.

use std::sync::Arc;

use crate::config::PgMcpConfig;

/// Read-only context passed from the HTTP layer, through each session actor,
/// to the tool registry.
///
/// Cloning is cheap; all clones share the same configuration.
#[derive(Debug, Clone)]
pub struct Environment {
    config: Arc<PgMcpConfig>,
    caller: Option<CallerIdentity>,
}

/// Identity of the caller a session is bound to.
///
/// Nothing populates this yet. It exists so that tool collections can later
/// register tools conditionally per caller without changing their signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// Stable subject identifier (e.g. a login name).
    pub subject: String,
    /// Capability names granted to the caller.
    pub capabilities: Vec<String>,
}

impl Environment {
    /// Create an environment with no caller bound.
    pub fn new(config: PgMcpConfig) -> Self {
        Self {
            config: Arc::new(config),
            caller: None,
        }
    }

    /// The loaded configuration.
    pub fn config(&self) -> &PgMcpConfig {
        &self.config
    }

    /// The caller bound to this environment, if any.
    pub fn caller(&self) -> Option<&CallerIdentity> {
        self.caller.as_ref()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(PgMcpConfig::default())
    }
}
