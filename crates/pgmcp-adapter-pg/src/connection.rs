//! Process-wide Postgres pool with explicit release.

use crate::error::DbError;
use async_trait::async_trait;
use pgmcp_core::UpstreamConfig;
use pgmcp_mcp::{ConnectionError, ConnectionLifecycle};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use tokio::sync::Mutex;

/// Owns the shared connection pool.
///
/// The pool is created on the first [`acquire`](Self::acquire) and shared by
/// every session until [`close_connections`](ConnectionLifecycle::close_connections)
/// releases it. A later `acquire` builds a fresh pool.
pub struct PgConnectionManager {
    upstream: UpstreamConfig,
    pool: Mutex<Option<PgPool>>,
}

impl PgConnectionManager {
    pub fn new(upstream: UpstreamConfig) -> Self {
        Self {
            upstream,
            pool: Mutex::new(None),
        }
    }

    /// Return the shared pool, connecting if none is open.
    pub async fn acquire(&self) -> Result<PgPool, DbError> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref()
            && !pool.is_closed()
        {
            return Ok(pool.clone());
        }

        let settings = self.upstream.pool_config();
        let pool = PgPoolOptions::new()
            .min_connections(settings.min_connections)
            .max_connections(settings.max_connections)
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_seconds.into()))
            .idle_timeout(Some(Duration::from_secs(settings.idle_timeout_seconds.into())))
            .connect(&self.upstream.connection_string())
            .await
            .map_err(DbError::connect)?;

        tracing::info!(
            url = %self.upstream.redacted_connection_string(),
            max_connections = settings.max_connections,
            "Database pool created"
        );
        *slot = Some(pool.clone());
        Ok(pool)
    }

    /// Whether a pool is currently held.
    pub async fn is_open(&self) -> bool {
        self.pool
            .lock()
            .await
            .as_ref()
            .is_some_and(|pool| !pool.is_closed())
    }
}

#[async_trait]
impl ConnectionLifecycle for PgConnectionManager {
    async fn close_connections(&self) -> Result<(), ConnectionError> {
        let pool = self.pool.lock().await.take();
        match pool {
            Some(pool) => {
                pool.close().await;
                tracing::info!("Database pool closed");
            }
            None => tracing::debug!("No database pool to close"),
        }
        Ok(())
    }
}
