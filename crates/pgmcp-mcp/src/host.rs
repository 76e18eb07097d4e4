//! Session host: a keyed registry of live session actors.
//!
//! The host spawns an actor lazily the first time a message arrives for an
//! address, forwards messages to its inbox, and forgets it once the actor
//! task has finished cleaning up. Actors for different addresses run
//! concurrently; each actor processes its own inbox sequentially.

use crate::connection::ConnectionLifecycle;
use crate::error::McpError;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, ServerInfo};
use crate::session::{ActorContext, ActorMessage, SessionActor, SessionId};
use crate::tools::ToolRegistry;
use futures::FutureExt;
use futures::future::join_all;
use pgmcp_core::Environment;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Messages buffered per actor before senders wait.
const INBOX_CAPACITY: usize = 32;

struct SessionHandle {
    tx: mpsc::Sender<ActorMessage>,
    generation: u64,
    task: JoinHandle<()>,
}

impl SessionHandle {
    fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

struct HostInner {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    context: ActorContext,
    idle_timeout: Duration,
    max_sessions: usize,
    next_generation: AtomicU64,
}

/// Registry of session actors. Cheap to clone.
#[derive(Clone)]
pub struct SessionHost {
    inner: Arc<HostInner>,
}

impl SessionHost {
    /// Create a host whose actors register `registry` and release
    /// `connections` on eviction.
    ///
    /// Server identity, idle timeout and session limit come from the
    /// environment's configuration.
    pub fn new(
        environment: Environment,
        registry: ToolRegistry,
        connections: Arc<dyn ConnectionLifecycle>,
    ) -> Self {
        let config = environment.config();
        let info = ServerInfo::new(config.server.name.clone(), config.server.version.clone());
        let idle_timeout = config.mcp.idle_timeout();
        let max_sessions = config.mcp.max_sessions;

        Self {
            inner: Arc::new(HostInner {
                sessions: RwLock::new(HashMap::new()),
                context: ActorContext {
                    info,
                    environment,
                    registry: Arc::new(registry),
                    connections,
                },
                idle_timeout,
                max_sessions,
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.inner
            .sessions
            .read()
            .await
            .values()
            .filter(|h| h.is_live())
            .count()
    }

    /// Whether a live actor exists for `id`.
    pub async fn contains(&self, id: &SessionId) -> bool {
        self.inner
            .sessions
            .read()
            .await
            .get(id)
            .is_some_and(SessionHandle::is_live)
    }

    /// Ensure an actor exists for `id`, spawning it if needed.
    pub async fn activate(&self, id: &SessionId) -> Result<(), McpError> {
        self.sender_for(id).await.map(|_| ())
    }

    /// Deliver a protocol message to the actor for `id` and wait for its
    /// answer.
    ///
    /// If the existing actor terminated between lookup and delivery, the
    /// message is retried once on a freshly spawned actor.
    pub async fn dispatch(
        &self,
        id: &SessionId,
        request: JsonRpcRequest,
    ) -> Result<Option<JsonRpcResponse>, McpError> {
        for attempt in 0..2 {
            let tx = self.sender_for(id).await?;
            let (reply_tx, reply_rx) = oneshot::channel();
            let message = ActorMessage::Rpc {
                request: request.clone(),
                reply: reply_tx,
            };

            if tx.send(message).await.is_err() {
                debug!(session = %id, attempt, "Actor inbox closed, respawning");
                continue;
            }

            match reply_rx.await {
                Ok(result) => return result,
                Err(_) => debug!(session = %id, attempt, "Actor terminated before replying"),
            }
        }

        Err(McpError::SessionUnavailable { id: id.to_string() })
    }

    /// Evict the actor for `id` and wait until its cleanup has finished.
    ///
    /// Returns `false` if there was no such actor.
    pub async fn evict(&self, id: &SessionId) -> bool {
        let handle = self.inner.sessions.write().await.remove(id);
        let Some(handle) = handle else {
            return false;
        };

        // A closed inbox means the actor is already on its way out.
        let _ = handle.tx.send(ActorMessage::Evict).await;
        drop(handle.tx);
        if let Err(e) = handle.task.await {
            warn!(session = %id, error = %e, "Session task ended abnormally");
        }
        true
    }

    /// Evict `id` from a context that cannot await (e.g. a `Drop` impl).
    pub fn evict_in_background(&self, id: SessionId) {
        let host = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    host.evict(&id).await;
                });
            }
            Err(_) => warn!(session = %id, "No runtime available, session left to idle alarm"),
        }
    }

    /// Evict every session. Used on process shutdown.
    pub async fn shutdown(&self) {
        let handles: Vec<(SessionId, SessionHandle)> =
            self.inner.sessions.write().await.drain().collect();
        info!(sessions = handles.len(), "Shutting down sessions");

        join_all(handles.into_iter().map(|(id, handle)| async move {
            let _ = handle.tx.send(ActorMessage::Evict).await;
            drop(handle.tx);
            if let Err(e) = handle.task.await {
                warn!(session = %id, error = %e, "Session task ended abnormally");
            }
        }))
        .await;
    }

    async fn sender_for(&self, id: &SessionId) -> Result<mpsc::Sender<ActorMessage>, McpError> {
        if let Some(handle) = self.inner.sessions.read().await.get(id)
            && handle.is_live()
        {
            return Ok(handle.tx.clone());
        }

        let mut sessions = self.inner.sessions.write().await;
        if let Some(handle) = sessions.get(id)
            && handle.is_live()
        {
            return Ok(handle.tx.clone());
        }

        sessions.retain(|_, h| h.is_live());
        if sessions.len() >= self.inner.max_sessions {
            warn!(limit = self.inner.max_sessions, "Session limit reached");
            return Err(McpError::SessionLimitReached {
                limit: self.inner.max_sessions,
            });
        }

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let actor = SessionActor::new(id.clone(), self.inner.context.clone());
        let idle_timeout = self.inner.idle_timeout;
        let weak = Arc::downgrade(&self.inner);
        let task_id = id.clone();
        let connections = self.inner.context.connections.clone();

        let task = tokio::spawn(async move {
            if AssertUnwindSafe(actor.run(rx, idle_timeout))
                .catch_unwind()
                .await
                .is_err()
            {
                // The actor never reached its own cleanup.
                error!(session = %task_id, "Session actor panicked");
                if let Err(e) = connections.close_connections().await {
                    error!(session = %task_id, error = %e, "Error during database cleanup");
                }
            }
            if let Some(inner) = weak.upgrade() {
                let mut sessions = inner.sessions.write().await;
                if sessions
                    .get(&task_id)
                    .is_some_and(|h| h.generation == generation)
                {
                    sessions.remove(&task_id);
                }
            }
        });

        debug!(session = %id, generation, "Spawned session actor");
        sessions.insert(
            id.clone(),
            SessionHandle {
                tx: tx.clone(),
                generation,
                task,
            },
        );
        Ok(tx)
    }
}
