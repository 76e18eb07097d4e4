//! Contract for the process-wide connection resource.
//!
//! Session actors never own the database pool. They only hold a handle to a
//! [`ConnectionLifecycle`] service and ask it to release its resources when
//! they are evicted.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a connection lifecycle manager.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Releasing the pool failed.
    #[error("failed to close connections: {0}")]
    Close(String),
}

/// Shared connection resource with explicit release.
///
/// Implementations must tolerate concurrent callers and must treat closing an
/// already closed resource as success.
#[async_trait]
pub trait ConnectionLifecycle: Send + Sync {
    /// Release every connection currently held.
    async fn close_connections(&self) -> Result<(), ConnectionError>;
}
