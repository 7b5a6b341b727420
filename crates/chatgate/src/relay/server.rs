//! HTTP surface of the relay
//!
//! Three routes: a health probe, the caller-visible entity listing, and the
//! chat relay itself. Setup failures come back as JSON error responses;
//! failures after the first streamed byte become a terminal error frame on
//! the open stream.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::HeaderMap,
    response::Response,
    routing::{get, post},
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::budget::RequestBudgeter;
use crate::catalog::{AllowAll, Catalog, DirectoryClient, EntityCatalog, EntityPolicy};
use crate::chat::{CallerIdentity, ChatRequest};
use crate::config::Config;
use crate::error::{RelayError, Result, classify_upstream};
use crate::tokens::SharedTokenizer;
use crate::upstream::UpstreamRouter;

use super::frames;
use super::transcode::StreamTranscoder;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Relay configuration
    pub config: Config,
    /// HTTP client for upstream requests
    pub client: reqwest::Client,
    /// Upstream API key, read once at startup
    pub api_key: String,
    /// Per-user entity visibility policy
    pub policy: Arc<dyn EntityPolicy>,
}

/// The relay server
pub struct RelayServer {
    config: Config,
    policy: Arc<dyn EntityPolicy>,
}

impl RelayServer {
    /// Create a server that keeps every directory entity visible.
    pub fn new(config: Config) -> Self {
        Self::with_policy(config, Arc::new(AllowAll))
    }

    pub fn with_policy(config: Config, policy: Arc<dyn EntityPolicy>) -> Self {
        Self { config, policy }
    }

    /// Start the relay server and listen for requests.
    pub async fn serve(&self) -> Result<()> {
        let api_key = std::env::var(&self.config.upstream.api_key_env).map_err(|_| {
            RelayError::Config(format!(
                "Upstream API key not set; export {}",
                self.config.upstream.api_key_env
            ))
        })?;

        // No client timeout: completion streams legitimately stay open for
        // minutes.
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| RelayError::Config(format!("Failed to create HTTP client: {e}")))?;

        let app_state = Arc::new(AppState {
            config: self.config.clone(),
            client,
            api_key,
            policy: self.policy.clone(),
        });

        let app = create_router(app_state);

        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| RelayError::Config(format!("Invalid listen address: {e}")))?;

        tracing::info!("Starting relay server on {addr}");
        tracing::info!("Entity directory: {}", self.config.upstream.directory_url);
        tracing::info!("Completion API: {}", self.config.upstream.completions_url);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Config(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RelayError::General(format!("Server error: {e}")))?;

        tracing::info!("Relay server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/entities", get(entities_handler))
        .route("/api/chat", post(chat_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// List the entities visible to the caller, with the elected default.
async fn entities_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<Catalog> {
    let identity = CallerIdentity::from_headers(&headers);
    Json(resolve_catalog(&state, &identity).await)
}

/// Relay one chat request to the upstream completion API.
async fn chat_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    let identity = CallerIdentity::from_headers(&headers);

    let catalog = resolve_catalog(&state, &identity).await;
    let entity = catalog.find(&request.model_id).ok_or_else(|| {
        RelayError::ForbiddenModel(format!(
            "entity {:?} is not available to this caller",
            request.model_id
        ))
    })?;

    let budgeter = RequestBudgeter::new(&SharedTokenizer, &state.config.defaults);
    let budgeted = budgeter.build(entity, &request)?;

    let router = UpstreamRouter::new(&state.config.upstream, &state.config.defaults);
    let routed = router.route(
        &budgeted,
        &request.selected_addons,
        request.assistant_model_id.as_deref(),
    );

    tracing::debug!(
        "Relaying conversation {} to {} ({} tokens)",
        request.id,
        routed.url,
        budgeted.token_count
    );

    let response = router
        .send(&state.client, &routed, &state.api_key, &request.id, &identity)
        .send()
        .await
        .map_err(|e| RelayError::General(format!("Upstream request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        return Err(classify_upstream(status.as_u16(), &body));
    }

    let body = Body::from_stream(relay_stream(response.bytes_stream()));
    Response::builder()
        .status(200)
        .header("content-type", "application/octet-stream")
        .body(body)
        .map_err(|e| RelayError::General(format!("Failed to build response: {e}")))
}

/// Build the per-request catalog for a caller.
async fn resolve_catalog(state: &AppState, identity: &CallerIdentity) -> Catalog {
    let directory = DirectoryClient::new(
        state.client.clone(),
        &state.config.upstream.directory_url,
        &state.api_key,
    );
    EntityCatalog::new(&directory, state.policy.as_ref(), &state.config.defaults)
        .resolve(identity)
        .await
}

type UpstreamStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Pulls upstream bytes through the transcoder one downstream frame at a
/// time, so client backpressure propagates to the upstream connection.
struct RelayPump {
    upstream: Option<UpstreamStream>,
    transcoder: StreamTranscoder,
    pending: VecDeque<Bytes>,
}

impl RelayPump {
    fn new(upstream: UpstreamStream) -> Self {
        Self {
            upstream: Some(upstream),
            transcoder: StreamTranscoder::new(),
            pending: VecDeque::new(),
        }
    }

    async fn next_frame(&mut self) -> Option<Bytes> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(frame);
            }
            // Once the terminal trigger arrived, drop the upstream
            // connection instead of draining it.
            if self.transcoder.is_done() {
                self.upstream = None;
            }
            let upstream = self.upstream.as_mut()?;

            match upstream.next().await {
                Some(Ok(chunk)) => {
                    // Frames from events parsed before a mid-chunk failure
                    // still flush ahead of the terminal error frame.
                    let (frames, error) = self.transcoder.push(&chunk);
                    self.pending.extend(frames);
                    if let Some(e) = error {
                        self.abort(e);
                    }
                }
                Some(Err(e)) => {
                    self.abort(RelayError::StreamTransport(format!(
                        "upstream stream failed: {e}"
                    )));
                }
                None => {
                    let (frames, error) = self.transcoder.finish();
                    self.pending.extend(frames);
                    if let Some(e) = error {
                        self.abort(e);
                    }
                    self.upstream = None;
                }
            }
        }
    }

    /// Log the raw failure, queue the terminal error frame and stop reading.
    fn abort(&mut self, error: RelayError) {
        tracing::error!("Relay stream aborted: {error}");
        self.pending.push_back(frames::error(error.client_message()));
        self.upstream = None;
    }
}

/// Adapt an upstream SSE byte stream into the NUL-framed downstream body.
fn relay_stream(
    upstream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let pump = RelayPump::new(Box::pin(upstream));
    futures::stream::unfold(pump, |mut pump| async move {
        pump.next_frame().await.map(|frame| (Ok(frame), pump))
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn create_test_state() -> Arc<AppState> {
        let mut config = Config::default();
        // A port nothing listens on, so directory fetches fail fast.
        config.upstream.directory_url = "http://127.0.0.1:1".to_string();
        config.upstream.completions_url = "http://127.0.0.1:1".to_string();

        Arc::new(AppState {
            config,
            client: reqwest::Client::new(),
            api_key: "test-key".to_string(),
            policy: Arc::new(AllowAll),
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(body_str.contains("\"status\":\"ok\""));
    }

    #[tokio::test]
    async fn test_entities_with_unreachable_directory_is_empty() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/entities")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let catalog: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(catalog["entities"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_chat_with_unknown_entity_is_forbidden() {
        let app = create_router(create_test_state());

        let request_body = serde_json::json!({
            "modelId": "nope",
            "id": "0e46e65e-8a9b-4c55-9d82-6c8e54a1f3d7",
            "messages": [{"role": "user", "content": "hi"}],
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(Body::from(request_body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_relay_stream_happy_path() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"id\":\"r1\",\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n",
            )),
            Ok(Bytes::from_static(b"data: [DONE]\n\n")),
        ];

        let frames: Vec<Bytes> = relay_stream(futures::stream::iter(chunks))
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        let body: Vec<u8> = frames.iter().flat_map(|b| b.to_vec()).collect();
        assert_eq!(
            body,
            b"{\"responseId\":\"r1\"}\0{\"content\":\"Hi\"}\0".to_vec()
        );
    }

    #[tokio::test]
    async fn test_relay_stream_malformed_event_ends_with_error_frame() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![
            Ok(Bytes::from_static(
                b"data: {\"id\":\"r1\",\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n",
            )),
            Ok(Bytes::from_static(b"data: {broken\n\n")),
        ];

        let frames: Vec<Bytes> = relay_stream(futures::stream::iter(chunks))
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        let last = frames.last().unwrap();
        assert!(last.starts_with(b"{\"errorMessage\":"));
        assert!(last.ends_with(b"\0\0"));
    }

    #[tokio::test]
    async fn test_relay_stream_keeps_frames_preceding_mid_chunk_failure() {
        // Valid event and malformed event arrive in a single network chunk.
        let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(Bytes::from_static(
            b"data: {\"id\":\"r1\",\"choices\":[{\"delta\":{\"content\":\"Hi\"},\"finish_reason\":null}]}\n\n\
              data: {broken\n\n",
        ))];

        let frames: Vec<Bytes> = relay_stream(futures::stream::iter(chunks))
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].as_ref(), b"{\"responseId\":\"r1\"}\0".as_slice());
        assert_eq!(frames[1].as_ref(), b"{\"content\":\"Hi\"}\0".as_slice());
        assert!(frames[2].starts_with(b"{\"errorMessage\":"));
        assert!(frames[2].ends_with(b"\0\0"));
    }

    #[tokio::test]
    async fn test_relay_stream_eof_without_done_flushes_tail() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(Bytes::from_static(
            b"data: {\"id\":\"r1\",\"choices\":[{\"delta\":{\"content\":\"tail\"},\"finish_reason\":null}]}",
        ))];

        let frames: Vec<Bytes> = relay_stream(futures::stream::iter(chunks))
            .map(|frame| frame.unwrap())
            .collect()
            .await;

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].as_ref(), b"{\"content\":\"tail\"}\0".as_slice());
    }
}
