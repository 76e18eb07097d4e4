//! HTTP transports for the MCP server.
//!
//! A single router serves both transport bindings:
//!
//! | Path                  | Binding                                         |
//! |-----------------------|-------------------------------------------------|
//! | `GET  /sse`           | event stream; opens a session                   |
//! | `POST /sse/message`   | event stream; message for `?sessionId=`         |
//! | `POST /mcp`           | stateless; session from `Mcp-Session-Id` header |
//! | `DELETE /mcp`         | stateless; ends the session in the header       |
//!
//! Any other path is answered with `404 Not found` without touching the
//! session host.

use crate::error::McpError;
use crate::host::SessionHost;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, error_codes};
use crate::session::SessionId;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use serde::Deserialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{RwLock, mpsc};
use tower_http::trace::TraceLayer;

/// Header carrying the session address on the stateless transport.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

/// Messages buffered per event stream.
const SSE_CHANNEL_CAPACITY: usize = 100;

/// Shared state of both transport bindings.
pub struct TransportState {
    host: SessionHost,
    base_path: String,
    keep_alive: Duration,
    /// Outbound channels of open event streams.
    sse_streams: RwLock<HashMap<SessionId, mpsc::Sender<Event>>>,
}

impl TransportState {
    /// Create transport state serving endpoints under `base_path` (either
    /// empty or "/segment").
    pub fn new(host: SessionHost, base_path: impl Into<String>, keep_alive: Duration) -> Self {
        Self {
            host,
            base_path: base_path.into(),
            keep_alive,
            sse_streams: RwLock::new(HashMap::new()),
        }
    }

    /// The session host behind the transports.
    pub fn host(&self) -> &SessionHost {
        &self.host
    }

    /// Number of open event streams.
    pub async fn open_streams(&self) -> usize {
        self.sse_streams.read().await.len()
    }

    /// End every open event stream.
    pub async fn close_streams(&self) {
        self.sse_streams.write().await.clear();
    }
}

/// Query parameters of `POST /sse/message`.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Create the HTTP router for MCP.
pub fn create_router(state: Arc<TransportState>) -> Router {
    let base = state.base_path.clone();
    Router::new()
        .route(&format!("{base}/sse"), get(handle_sse_connect))
        .route(&format!("{base}/sse/message"), post(handle_sse_message))
        .route(
            &format!("{base}/mcp"),
            post(handle_mcp_post).delete(handle_mcp_delete),
        )
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Removes the stream's channel and evicts its session when the client
/// disconnects.
struct SseStreamGuard {
    id: SessionId,
    state: Arc<TransportState>,
}

impl Drop for SseStreamGuard {
    fn drop(&mut self) {
        let id = self.id.clone();
        let state = self.state.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                state.sse_streams.write().await.remove(&id);
                tracing::debug!(session = %id, "Event stream closed");
                state.host.evict(&id).await;
            });
        } else {
            self.state.host.evict_in_background(id);
        }
    }
}

/// Handle `GET /sse`: open a session and its event stream.
async fn handle_sse_connect(State(state): State<Arc<TransportState>>) -> Response {
    let id = SessionId::generate();
    if let Err(e) = state.host.activate(&id).await {
        tracing::warn!(error = %e, "Could not open event stream session");
        return (e.status_code(), e.to_string()).into_response();
    }

    let (event_tx, event_rx) = mpsc::channel(SSE_CHANNEL_CAPACITY);
    state
        .sse_streams
        .write()
        .await
        .insert(id.clone(), event_tx);

    let endpoint = format!("{}/sse/message?sessionId={}", state.base_path, id);
    tracing::info!(session = %id, "Event stream opened");

    let guard = SseStreamGuard {
        id,
        state: state.clone(),
    };
    let stream = async_stream::stream! {
        let _guard = guard;
        let mut rx = event_rx;
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        while let Some(event) = rx.recv().await {
            yield Ok(event);
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(state.keep_alive).text("ping"))
        .into_response()
}

/// Handle `POST /sse/message?sessionId=...`: deliver a message whose answer
/// is pushed on the session's event stream.
async fn handle_sse_message(
    State(state): State<Arc<TransportState>>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let Some(raw_id) = query.session_id.filter(|s| !s.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing sessionId").into_response();
    };
    let id = SessionId::from(raw_id);

    let Some(stream) = state.sse_streams.read().await.get(&id).cloned() else {
        return (StatusCode::NOT_FOUND, "Session not found").into_response();
    };

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(response) => return (StatusCode::BAD_REQUEST, Json(response)).into_response(),
    };

    let request_id = request.id.clone();
    let reply = match state.host.dispatch(&id, request).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(session = %id, error = %e, "Dispatch failed");
            Some(JsonRpcResponse::error(
                request_id,
                error_codes::INTERNAL_ERROR,
                e.to_string(),
            ))
        }
    };

    if let Some(response) = reply {
        let event = match Event::default().event("message").json_data(&response) {
            Ok(event) => event,
            Err(e) => {
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
        };
        if stream.send(event).await.is_err() {
            return (StatusCode::GONE, "Event stream closed").into_response();
        }
    }

    (StatusCode::ACCEPTED, "Accepted").into_response()
}

/// Handle `POST /mcp`: stateless request/response.
async fn handle_mcp_post(
    State(state): State<Arc<TransportState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let id = session_header(&headers).unwrap_or_else(SessionId::generate);

    let mut response = match parse_request(&body) {
        Ok(request) => {
            let request_id = request.id.clone();
            match state.host.dispatch(&id, request).await {
                Ok(Some(reply)) => (StatusCode::OK, Json(reply)).into_response(),
                Ok(None) => StatusCode::ACCEPTED.into_response(),
                Err(e) => error_response(request_id, &e),
            }
        }
        Err(response) => (StatusCode::BAD_REQUEST, Json(response)).into_response(),
    };

    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
    }
    response
}

/// Handle `DELETE /mcp`: end the session named in the header.
async fn handle_mcp_delete(
    State(state): State<Arc<TransportState>>,
    headers: HeaderMap,
) -> Response {
    let Some(id) = session_header(&headers) else {
        return (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response();
    };

    if state.host.evict(&id).await {
        tracing::info!(session = %id, "Session deleted by client");
        StatusCode::NO_CONTENT.into_response()
    } else {
        (StatusCode::NOT_FOUND, "Session not found").into_response()
    }
}

fn session_header(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(SessionId::from)
}

fn parse_request(body: &[u8]) -> Result<JsonRpcRequest, JsonRpcResponse> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        JsonRpcResponse::error(None, error_codes::PARSE_ERROR, format!("Parse error: {}", e))
    })?;
    serde_json::from_value(value).map_err(|e| {
        JsonRpcResponse::error(
            None,
            error_codes::INVALID_REQUEST,
            format!("Invalid request: {}", e),
        )
    })
}

fn error_response(id: Option<serde_json::Value>, error: &McpError) -> Response {
    tracing::warn!(error = %error, "Request failed");
    (
        error.status_code(),
        Json(JsonRpcResponse::error(
            id,
            error_codes::INTERNAL_ERROR,
            error.to_string(),
        )),
    )
        .into_response()
}

/// HTTP server for the MCP transports.
pub struct HttpServer {
    addr: String,
    state: Arc<TransportState>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: impl Into<String>, state: Arc<TransportState>) -> Self {
        Self {
            addr: addr.into(),
            state,
        }
    }

    /// Serve until `shutdown` resolves, then close streams and evict every
    /// session.
    pub async fn run<F>(self, shutdown: F) -> Result<(), McpError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.addr).await.map_err(|e| {
            McpError::StartupFailed(format!("Failed to bind to {}: {}", self.addr, e))
        })?;

        tracing::info!(address = %self.addr, "MCP HTTP server listening");

        let app = create_router(self.state.clone());
        let state = self.state.clone();
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown requested, closing event streams");
            state.close_streams().await;
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await?;

        self.state.host().shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionError, ConnectionLifecycle};
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use futures::{Stream, StreamExt};
    use pgmcp_core::Environment;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct CountingConnections {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionLifecycle for CountingConnections {
        async fn close_connections(&self) -> Result<(), ConnectionError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn counted_state() -> (Arc<TransportState>, Arc<CountingConnections>) {
        let connections = Arc::new(CountingConnections::default());
        let host = SessionHost::new(
            Environment::default(),
            ToolRegistry::new(),
            connections.clone(),
        );
        let state = Arc::new(TransportState::new(host, "", Duration::from_secs(30)));
        (state, connections)
    }

    fn state() -> Arc<TransportState> {
        counted_state().0
    }

    /// Read the next `\n\n`-terminated event from an SSE body.
    async fn next_event<S>(body: &mut S, buffer: &mut String) -> String
    where
        S: Stream<Item = Result<Bytes, axum::Error>> + Unpin,
    {
        loop {
            if let Some(end) = buffer.find("\n\n") {
                let event = buffer[..end].to_string();
                buffer.drain(..end + 2);
                return event;
            }
            let chunk = body.next().await.unwrap().unwrap();
            buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }

    fn event_field<'a>(event: &'a str, field: &str) -> Option<&'a str> {
        event
            .lines()
            .find_map(|line| line.strip_prefix(field)?.strip_prefix(": "))
    }

    #[tokio::test]
    async fn test_sse_round_trip_and_disconnect() {
        let (state, connections) = counted_state();
        let app = create_router(state.clone());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/sse").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response.headers()["content-type"]
                .to_str()
                .unwrap()
                .starts_with("text/event-stream")
        );

        let mut body = response.into_body().into_data_stream();
        let mut buffer = String::new();

        let endpoint_event = next_event(&mut body, &mut buffer).await;
        assert_eq!(event_field(&endpoint_event, "event"), Some("endpoint"));
        let endpoint = event_field(&endpoint_event, "data").unwrap().to_string();
        assert!(endpoint.starts_with("/sse/message?sessionId="));
        assert_eq!(state.host().session_count().await, 1);
        assert_eq!(state.open_streams().await, 1);

        let response = app
            .oneshot(post_json(&endpoint, r#"{"jsonrpc":"2.0","id":9,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let message = next_event(&mut body, &mut buffer).await;
        assert_eq!(event_field(&message, "event"), Some("message"));
        let reply: serde_json::Value =
            serde_json::from_str(event_field(&message, "data").unwrap()).unwrap();
        assert_eq!(reply["id"], 9);
        assert_eq!(reply["result"], serde_json::json!({}));

        drop(body);
        for _ in 0..50 {
            if connections.closes.load(Ordering::SeqCst) > 0 && state.open_streams().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(state.host().session_count().await, 0);
        assert_eq!(state.open_streams().await, 0);
        assert_eq!(connections.closes.load(Ordering::SeqCst), 1);
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let state = state();
        let app = create_router(state.clone());

        let response = app
            .oneshot(Request::builder().uri("/unknown").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Not found");
        assert_eq!(state.host().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_mcp_post_assigns_session() {
        let state = state();
        let app = create_router(state.clone());

        let response = app
            .oneshot(post_json("/mcp", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(MCP_SESSION_ID_HEADER));
        assert_eq!(state.host().session_count().await, 1);
    }

    #[tokio::test]
    async fn test_mcp_notification_is_accepted() {
        let app = create_router(state());

        let response = app
            .oneshot(post_json(
                "/mcp",
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_mcp_parse_error() {
        let state = state();
        let app = create_router(state.clone());

        let response = app.oneshot(post_json("/mcp", "{not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(state.host().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_mcp_delete_requires_header() {
        let app = create_router(state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/mcp")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sse_message_without_session_id() {
        let app = create_router(state());

        let response = app
            .oneshot(post_json("/sse/message", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_sse_message_unknown_session() {
        let state = state();
        let app = create_router(state.clone());

        let response = app
            .oneshot(post_json(
                "/sse/message?sessionId=missing",
                r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.host().session_count().await, 0);
    }

    #[tokio::test]
    async fn test_base_path_prefixes_routes() {
        let host = SessionHost::new(
            Environment::default(),
            ToolRegistry::new(),
            Arc::new(CountingConnections::default()),
        );
        let state = Arc::new(TransportState::new(host, "/v1", Duration::from_secs(30)));
        let app = create_router(state);

        let response = app
            .clone()
            .oneshot(post_json("/mcp", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(post_json("/v1/mcp", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
