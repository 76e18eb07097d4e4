//! Session actors.
//!
//! A session actor owns one MCP server for the lifetime of a logical session.
//! Its lifecycle is:
//!
//! ```text
//! Uninitialized ──init──▶ Initialized ──(tool calls)*──▶ CleaningUp ──▶ Terminated
//! ```
//!
//! The server (and therefore every tool handler) only exists once `init` has
//! returned, so no tool can run before registration is complete. `cleanup`
//! releases the shared connection resource; it never fails and only its first
//! invocation has any effect.
//!
//! Actors run as a single tokio task draining an inbox, one message at a time.
//! See [`crate::host::SessionHost`] for how they are spawned and reclaimed.

use crate::connection::ConnectionLifecycle;
use crate::error::McpError;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, ServerInfo};
use crate::server::{McpServer, ServerBuilder};
use crate::tools::ToolRegistry;
use pgmcp_core::Environment;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Opaque session address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observable lifecycle stage of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initialized,
    CleaningUp,
    Terminated,
}

enum ActorState {
    Uninitialized,
    Serving(McpServer),
    CleaningUp,
    Terminated,
}

/// Reply channel for a dispatched message.
pub(crate) type Reply = oneshot::Sender<Result<Option<JsonRpcResponse>, McpError>>;

/// Messages delivered to an actor's inbox.
pub(crate) enum ActorMessage {
    Rpc {
        request: JsonRpcRequest,
        reply: Reply,
    },
    Evict,
}

/// Everything an actor needs besides its address. Shared by all actors of a
/// host.
#[derive(Clone)]
pub struct ActorContext {
    pub info: ServerInfo,
    pub environment: Environment,
    pub registry: Arc<ToolRegistry>,
    pub connections: Arc<dyn ConnectionLifecycle>,
}

/// A durable, address-keyed MCP session.
pub struct SessionActor {
    id: SessionId,
    context: ActorContext,
    state: ActorState,
}

impl SessionActor {
    /// Create an uninitialized actor.
    pub fn new(id: SessionId, context: ActorContext) -> Self {
        Self {
            id,
            context,
            state: ActorState::Uninitialized,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.state {
            ActorState::Uninitialized => Lifecycle::Uninitialized,
            ActorState::Serving(_) => Lifecycle::Initialized,
            ActorState::CleaningUp => Lifecycle::CleaningUp,
            ActorState::Terminated => Lifecycle::Terminated,
        }
    }

    /// The live server, once initialized.
    pub fn server(&self) -> Option<&McpServer> {
        match &self.state {
            ActorState::Serving(server) => Some(server),
            _ => None,
        }
    }

    /// Build this session's server by running the tool registry once.
    ///
    /// A registration failure leaves the actor uninitialized; the partially
    /// filled tool table is discarded.
    pub async fn init(&mut self) -> Result<(), McpError> {
        if !matches!(self.state, ActorState::Uninitialized) {
            return Err(McpError::AlreadyInitialized);
        }

        let mut builder = ServerBuilder::new(self.context.info.clone());
        self.context
            .registry
            .register(&mut builder, &self.context.environment)
            .map_err(|e| McpError::InitFailed(e.to_string()))?;

        let server = builder.build();
        info!(
            session = %self.id,
            tool_count = server.tool_names().len(),
            "Session initialized"
        );
        self.state = ActorState::Serving(server);
        Ok(())
    }

    /// Serve one protocol message.
    pub async fn handle(&self, request: JsonRpcRequest) -> Result<Option<JsonRpcResponse>, McpError> {
        match &self.state {
            ActorState::Serving(server) => Ok(server.handle_request(request).await),
            _ => Err(McpError::NotInitialized),
        }
    }

    /// Release the shared connection resource.
    ///
    /// Failures are logged and swallowed. Calls after the first are no-ops.
    pub async fn cleanup(&mut self) {
        if matches!(self.state, ActorState::CleaningUp | ActorState::Terminated) {
            debug!(session = %self.id, "Cleanup already performed");
            return;
        }

        self.state = ActorState::CleaningUp;
        match self.context.connections.close_connections().await {
            Ok(()) => info!(session = %self.id, "Database connections closed successfully"),
            Err(e) => error!(session = %self.id, error = %e, "Error during database cleanup"),
        }
        self.state = ActorState::Terminated;
    }

    /// Timer-driven eviction hook.
    pub async fn alarm(&mut self) {
        info!(session = %self.id, "Idle alarm fired");
        self.cleanup().await;
    }

    /// Actor task body: activate, serve the inbox, then clean up.
    ///
    /// Returns when the idle alarm fires, an eviction message arrives, or
    /// every sender has been dropped.
    pub(crate) async fn run(mut self, mut inbox: mpsc::Receiver<ActorMessage>, idle_timeout: Duration) {
        if let Err(e) = self.init().await {
            error!(session = %self.id, error = %e, "Session activation failed");
            inbox.close();
            let message = e.to_string();
            while let Some(pending) = inbox.recv().await {
                if let ActorMessage::Rpc { reply, .. } = pending {
                    let _ = reply.send(Err(McpError::InitFailed(message.clone())));
                }
            }
            self.cleanup().await;
            return;
        }

        let alarm = tokio::time::sleep_until(deadline(idle_timeout));
        tokio::pin!(alarm);

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(ActorMessage::Rpc { request, reply }) => {
                        let result = self.handle(request).await;
                        if reply.send(result).is_err() {
                            warn!(session = %self.id, "Caller went away before reply");
                        }
                        alarm.as_mut().reset(deadline(idle_timeout));
                    }
                    Some(ActorMessage::Evict) => {
                        info!(session = %self.id, "Session evicted");
                        break;
                    }
                    None => {
                        debug!(session = %self.id, "Inbox closed");
                        break;
                    }
                },
                () = &mut alarm => {
                    self.alarm().await;
                    break;
                }
            }
        }

        self.cleanup().await;
        debug!(session = %self.id, "Session terminated");
    }
}

/// Fallback horizon for timeouts too large to add to the current instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `after` from now, clamped when the addition would overflow.
fn deadline(after: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(after).unwrap_or_else(|| now + FAR_FUTURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionError;
    use crate::protocol::{ToolContent, ToolDefinition};
    use crate::tools::{ToolCollection, ToolHandler};
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingConnections {
        closes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ConnectionLifecycle for CountingConnections {
        async fn close_connections(&self) -> Result<(), ConnectionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ConnectionError::Close("socket already gone".to_string()))
            } else {
                Ok(())
            }
        }
    }

    /// Records whether registration had finished when the handler ran.
    struct Watch {
        registered: Arc<AtomicBool>,
        ran_before_registration: Arc<AtomicBool>,
    }

    #[async_trait]
    impl ToolHandler for Watch {
        async fn call(&self, _arguments: Value) -> Result<Vec<ToolContent>, McpError> {
            if !self.registered.load(Ordering::SeqCst) {
                self.ran_before_registration.store(true, Ordering::SeqCst);
            }
            Ok(vec![ToolContent::text("ok")])
        }
    }

    struct WatchCollection {
        registered: Arc<AtomicBool>,
        ran_before_registration: Arc<AtomicBool>,
        calls: AtomicUsize,
    }

    impl ToolCollection for WatchCollection {
        fn name(&self) -> &str {
            "watch"
        }

        fn register(&self, server: &mut ServerBuilder, _env: &Environment) -> Result<(), McpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            server.tool(
                ToolDefinition::new("watch", "watch", json!({"type": "object"})),
                Arc::new(Watch {
                    registered: self.registered.clone(),
                    ran_before_registration: self.ran_before_registration.clone(),
                }),
            )?;
            self.registered.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl ToolCollection for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn register(&self, _server: &mut ServerBuilder, _env: &Environment) -> Result<(), McpError> {
            Err(McpError::ExecutionFailed("collection unavailable".to_string()))
        }
    }

    fn watch_collection() -> Arc<WatchCollection> {
        Arc::new(WatchCollection {
            registered: Arc::new(AtomicBool::new(false)),
            ran_before_registration: Arc::new(AtomicBool::new(false)),
            calls: AtomicUsize::new(0),
        })
    }

    fn actor_with(
        registry: ToolRegistry,
        connections: Arc<CountingConnections>,
    ) -> SessionActor {
        SessionActor::new(
            SessionId::from("test-session"),
            ActorContext {
                info: ServerInfo::new("test", "0.0.0"),
                environment: Environment::default(),
                registry: Arc::new(registry),
                connections,
            },
        )
    }

    fn call_watch() -> JsonRpcRequest {
        JsonRpcRequest::new(1, "tools/call", Some(json!({"name": "watch", "arguments": {}})))
    }

    #[tokio::test]
    async fn test_handle_before_init_is_rejected() {
        let actor = actor_with(ToolRegistry::new(), Arc::default());
        let err = actor.handle(call_watch()).await.unwrap_err();
        assert!(matches!(err, McpError::NotInitialized));
        assert_eq!(actor.lifecycle(), Lifecycle::Uninitialized);
    }

    #[tokio::test]
    async fn test_no_handler_runs_before_init_returns() {
        let collection = watch_collection();
        let registry = ToolRegistry::new().with_collection(collection.clone());
        let mut actor = actor_with(registry, Arc::default());

        assert!(actor.server().is_none());
        actor.init().await.unwrap();
        let response = actor.handle(call_watch()).await.unwrap().unwrap();

        assert_eq!(response.result.unwrap()["isError"], false);
        assert!(!collection.ran_before_registration.load(Ordering::SeqCst));
        assert_eq!(collection.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_init_runs_once() {
        let collection = watch_collection();
        let registry = ToolRegistry::new().with_collection(collection.clone());
        let mut actor = actor_with(registry, Arc::default());

        actor.init().await.unwrap();
        assert!(matches!(actor.init().await, Err(McpError::AlreadyInitialized)));
        assert_eq!(collection.calls.load(Ordering::SeqCst), 1);
        assert_eq!(actor.lifecycle(), Lifecycle::Initialized);
    }

    #[tokio::test]
    async fn test_failed_registration_leaves_actor_uninitialized() {
        let registry = ToolRegistry::new().with_collection(Arc::new(Failing));
        let mut actor = actor_with(registry, Arc::default());

        let err = actor.init().await.unwrap_err();
        assert!(matches!(err, McpError::InitFailed(_)));
        assert_eq!(actor.lifecycle(), Lifecycle::Uninitialized);
        assert!(actor.server().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_twice_releases_once() {
        let connections = Arc::new(CountingConnections::default());
        let mut actor = actor_with(ToolRegistry::new(), connections.clone());
        actor.init().await.unwrap();

        actor.cleanup().await;
        actor.cleanup().await;

        assert_eq!(connections.closes.load(Ordering::SeqCst), 1);
        assert_eq!(actor.lifecycle(), Lifecycle::Terminated);
    }

    #[tokio::test]
    async fn test_cleanup_swallows_release_failure() {
        let connections = Arc::new(CountingConnections {
            fail: true,
            ..Default::default()
        });
        let mut actor = actor_with(ToolRegistry::new(), connections.clone());
        actor.init().await.unwrap();

        actor.alarm().await;

        assert_eq!(connections.closes.load(Ordering::SeqCst), 1);
        assert_eq!(actor.lifecycle(), Lifecycle::Terminated);
    }

    #[tokio::test]
    async fn test_terminated_actor_does_not_serve() {
        let mut actor = actor_with(ToolRegistry::new(), Arc::default());
        actor.init().await.unwrap();
        actor.cleanup().await;

        let err = actor
            .handle(JsonRpcRequest::new(1, "tools/list", None))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotInitialized));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_alarm_ends_run_loop() {
        let connections = Arc::new(CountingConnections::default());
        let actor = actor_with(ToolRegistry::new(), connections.clone());
        let (tx, rx) = mpsc::channel(4);

        let task = tokio::spawn(actor.run(rx, Duration::from_secs(60)));
        tokio::time::sleep(Duration::from_secs(61)).await;
        task.await.unwrap();

        assert_eq!(connections.closes.load(Ordering::SeqCst), 1);
        assert!(tx.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_idle_timeout_keeps_serving() {
        let connections = Arc::new(CountingConnections::default());
        let actor = actor_with(ToolRegistry::new(), connections.clone());
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(actor.run(rx, Duration::from_secs(u64::MAX)));

        for id in 1..=2 {
            let (reply, answer) = oneshot::channel();
            tx.send(ActorMessage::Rpc {
                request: JsonRpcRequest::new(id, "ping", None),
                reply,
            })
            .await
            .unwrap();
            assert!(answer.await.unwrap().unwrap().is_some());
        }

        tx.send(ActorMessage::Evict).await.unwrap();
        task.await.unwrap();
        assert_eq!(connections.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deadline_saturates() {
        assert!(deadline(Duration::MAX) > Instant::now());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
