//! HTTP transport: one mount point serving the split channel.
//!
//! GET opens the long-lived SSE stream that carries console-to-peer pushes;
//! POST carries everything the peer sends back (responses, its own requests,
//! notifications). CORS is wide open and exposes the session header so
//! browser-hosted peers can read their assigned id.

mod post;
mod sse;

use std::{io, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::Instrument;

use crate::{
    model::{ErrorObject, JsonRpcMessage},
    session::SessionRegistry,
};

pub const HEADER_SESSION_ID: &str = "Mcp-Session-Id";
pub const EVENT_STREAM_MIME_TYPE: &str = "text/event-stream";

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ConsoleServerConfig {
    pub bind: SocketAddr,
    /// Mount point for both the GET stream and POSTed messages.
    pub path: String,
    /// When set, every request must carry `Authorization: Bearer <token>`.
    pub auth_token: Option<String>,
    /// Idle gap after which a comment frame keeps the stream alive.
    pub sse_keep_alive: Duration,
    pub ct: CancellationToken,
}

impl Default for ConsoleServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            path: "/mcp".to_string(),
            auth_token: None,
            sse_keep_alive: DEFAULT_HEARTBEAT_INTERVAL,
            ct: CancellationToken::new(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<ConsoleServerConfig>,
}

/// `?sessionId=...` fallback for peers that cannot set custom headers.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SessionQuery {
    pub session_id: Option<String>,
}

pub fn router(registry: Arc<SessionRegistry>, config: ConsoleServerConfig) -> Router {
    let state = AppState {
        registry,
        config: Arc::new(config),
    };
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static("mcp-session-id")]);
    let path = state.config.path.clone();
    Router::new()
        .route(&path, get(sse::handle_get).post(post::handle_post))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve in a background task. Returns the actual bound address
/// (relevant when the configured port is 0); the server runs until the
/// config's cancellation token fires.
pub async fn serve(
    registry: Arc<SessionRegistry>,
    mut config: ConsoleServerConfig,
) -> io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    config.bind = listener.local_addr()?;
    let bind = config.bind;
    let ct = config.ct.clone();
    let app = router(registry, config);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        ct.cancelled().await;
        tracing::info!("console server cancelled");
    });
    tokio::spawn(
        async move {
            if let Err(e) = server.await {
                tracing::error!(error = %e, "console server shutdown with error");
            }
        }
        .instrument(tracing::info_span!("mcp-console-server", bind_address = %bind)),
    );
    Ok(bind)
}

/// Session id from the `Mcp-Session-Id` header, falling back to the
/// `sessionId` query parameter.
pub(crate) fn session_id_from(headers: &HeaderMap, query: &SessionQuery) -> Option<String> {
    headers
        .get(HEADER_SESSION_ID)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or_else(|| query.session_id.clone())
}

pub(crate) fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.config.auth_token.as_deref() else {
        return true;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

/// A JSON-RPC error envelope carried on an HTTP error status. Used for
/// transport-level rejections (bad auth, malformed bodies).
pub(crate) fn rpc_error_response(status: StatusCode, error: ErrorObject) -> Response {
    let body = serde_json::json!({ "jsonrpc": "2.0", "error": error });
    (
        status,
        [(header::CONTENT_TYPE.as_str(), "application/json")],
        body.to_string(),
    )
        .into_response()
}

pub(crate) fn unauthorized() -> Response {
    rpc_error_response(
        StatusCode::UNAUTHORIZED,
        ErrorObject::invalid_request("Unauthorized"),
    )
}

/// A synchronous JSON-RPC reply written back on the POST that carried the
/// peer's request.
pub(crate) fn json_reply(message: JsonRpcMessage, session_id: &str) -> Response {
    match serde_json::to_string(&message) {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE.as_str(), "application/json".to_string()),
                (HEADER_SESSION_ID, session_id.to_string()),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode json-rpc reply");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// 202 with no body, echoing the session id: the acknowledgement for
/// notifications and responses.
pub(crate) fn accepted(session_id: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        [(HEADER_SESSION_ID, session_id.to_string())],
    )
        .into_response()
}
