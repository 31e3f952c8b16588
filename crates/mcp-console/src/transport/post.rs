//! The POST side of the split channel: every message the peer sends arrives
//! here as exactly one JSON-RPC envelope.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use serde_json::Value;

use crate::{
    error::ConsoleError,
    model::{
        ErrorObject, InitializeParams, JsonRpcMessage, RequestId, initialize_result,
    },
    session::{Session, SessionRegistry, ToolOutcome},
};

use super::{AppState, SessionQuery, accepted, json_reply, rpc_error_response, session_id_from, unauthorized};

pub(crate) async fn handle_post(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if !super::authorized(&state, &headers) {
        return unauthorized();
    }

    let message: JsonRpcMessage = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "rejecting malformed json-rpc body");
            return rpc_error_response(
                StatusCode::BAD_REQUEST,
                ErrorObject::invalid_request("Invalid JSON"),
            );
        }
    };

    // Session resolution: the named session if the registry knows it, else
    // any session that can carry traffic (covers peers that restarted with a
    // stale id), else a brand-new session.
    let session = match session_id_from(&headers, &query).and_then(|id| state.registry.get(&id)) {
        Some(session) => session,
        None => match state.registry.select_active() {
            Some(session) => {
                tracing::debug!(
                    session_id = %session.id,
                    "unknown or missing session id, routing to active session"
                );
                session
            }
            None => state.registry.create_session(),
        },
    };

    match message {
        JsonRpcMessage::Request {
            id, method, params, ..
        } => handle_request(&session, id, &method, params),
        JsonRpcMessage::Notification { method, params, .. } => {
            handle_notification(&state.registry, &session, &method, params)
        }
        JsonRpcMessage::Response { id, result, .. } => {
            handle_response(&state.registry, &session, id, Ok(result))
        }
        JsonRpcMessage::Error { id, error, .. } => {
            handle_response(&state.registry, &session, id, Err(ConsoleError::Peer(error)))
        }
    }
}

/// The peer's own requests are answered synchronously on this POST, never via
/// the SSE stream.
fn handle_request(
    session: &Arc<Session>,
    id: RequestId,
    method: &str,
    params: Option<Value>,
) -> Response {
    match method {
        "initialize" => {
            let params: InitializeParams = params
                .map(|value| serde_json::from_value(value).unwrap_or_default())
                .unwrap_or_default();
            tracing::info!(
                session_id = %session.id,
                client = %params.client_info.name,
                version = %params.client_info.version,
                "peer initializing"
            );
            session.set_client_info(params.client_info);
            json_reply(JsonRpcMessage::response(id, initialize_result()), &session.id)
        }
        "ping" => json_reply(
            JsonRpcMessage::response(id, serde_json::json!({})),
            &session.id,
        ),
        other => {
            tracing::debug!(session_id = %session.id, method = other, "unknown peer request");
            json_reply(
                JsonRpcMessage::error(id, ErrorObject::method_not_found(other)),
                &session.id,
            )
        }
    }
}

fn handle_notification(
    registry: &Arc<SessionRegistry>,
    session: &Arc<Session>,
    method: &str,
    _params: Option<Value>,
) -> Response {
    if method == "notifications/initialized" {
        session.set_initialized();
        tracing::info!(session_id = %session.id, "peer initialized");
        // Reconnect churn leaves half-open sessions behind; sweep them now
        // that the peer has settled on this one.
        registry.cleanup_stale(&session.id);
    } else {
        tracing::debug!(session_id = %session.id, method, "peer notification");
    }
    accepted(&session.id)
}

/// A response to something this console pushed over SSE. Correlation is by
/// id: the resolved session first, then every session as a last-resort
/// fallback for peers that restarted mid-flight.
fn handle_response(
    registry: &Arc<SessionRegistry>,
    session: &Arc<Session>,
    id: RequestId,
    outcome: ToolOutcome,
) -> Response {
    // Pick the owning table before consuming the outcome: the resolved
    // session first, then the cross-session fallback.
    let owner = if session.pending.contains(&id) {
        Some(session.clone())
    } else {
        registry.find_pending(&id).inspect(|owner| {
            tracing::debug!(
                session_id = %session.id,
                owner_session = %owner.id,
                request_id = %id,
                "response correlated across sessions"
            );
        })
    };

    match owner.and_then(|owner| owner.pending.resolve(&id, outcome).map(|meta| (owner, meta))) {
        Some((owner, meta)) => {
            tracing::debug!(
                session_id = %owner.id,
                request_id = %id,
                method = %meta.method,
                elapsed = ?meta.sent_at.elapsed(),
                "response correlated"
            );
        }
        // Unknown, already resolved, or lost a race with a timeout: the
        // original caller observes this as a timeout, never an error.
        None => tracing::warn!(request_id = %id, "discarding response for unknown request id"),
    }
    accepted(&session.id)
}
