//! The long-lived GET stream: drains the session's outbound queue into SSE
//! frames and keeps idle connections alive with comment heartbeats.

use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::MissedTickBehavior;

use crate::session::{OutboundEvent, Session};

use super::{
    AppState, EVENT_STREAM_MIME_TYPE, HEADER_SESSION_ID, SessionQuery, session_id_from,
    unauthorized,
};

/// Clears `active` when the stream is dropped, whether the peer disconnected
/// or the server shut the stream down. The session itself is kept so trailing
/// POSTs can still be correlated.
struct StreamGuard {
    session: Arc<Session>,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.session.mark_inactive();
    }
}

pub(crate) async fn handle_get(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Response {
    if !super::authorized(&state, &headers) {
        return unauthorized();
    }

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());
    if !accept.is_some_and(|value| value.contains(EVENT_STREAM_MIME_TYPE)) {
        return (
            StatusCode::NOT_ACCEPTABLE,
            "Not Acceptable: client must accept text/event-stream",
        )
            .into_response();
    }

    // Reuse the named session only if no stream has consumed its queue yet.
    // A second GET for a consumed session is a reconnect and gets a fresh
    // session; the abandoned one is swept by the next stale cleanup.
    let named = session_id_from(&headers, &query).and_then(|id| state.registry.get(&id));
    let (session, rx) = match named.and_then(|s| s.take_outbound_rx().map(|rx| (s, rx))) {
        Some((session, rx)) => (session, rx),
        None => {
            let session = state.registry.create_session();
            let rx = session
                .take_outbound_rx()
                .expect("freshly created session has its receiver");
            (session, rx)
        }
    };

    tracing::info!(session_id = %session.id, "sse stream established");

    let stream = event_stream(session.clone(), rx, state.config.sse_keep_alive);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE.as_str(), EVENT_STREAM_MIME_TYPE.to_string()),
            (header::CACHE_CONTROL.as_str(), "no-cache".to_string()),
            (HEADER_SESSION_ID, session.id.to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// The frame source for one connection. A single generator yields whole
/// frames, so writes are serialized per connection by construction, and the
/// wait on the queue is bounded by the heartbeat interval: no busy-polling,
/// no unbounded block.
fn event_stream(
    session: Arc<Session>,
    mut rx: UnboundedReceiver<OutboundEvent>,
    keep_alive: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        let guard = StreamGuard { session };
        yield Ok(Bytes::from_static(b": connected\n\n"));

        let mut heartbeat =
            tokio::time::interval_at(tokio::time::Instant::now() + keep_alive, keep_alive);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                item = rx.recv() => {
                    match item {
                        Some(event) => match event.to_frame() {
                            Ok(frame) => {
                                tracing::debug!(
                                    session_id = %guard.session.id,
                                    event = event.event,
                                    "sse event sent"
                                );
                                yield Ok(frame);
                            }
                            Err(e) => {
                                tracing::error!(
                                    session_id = %guard.session.id,
                                    error = %e,
                                    "failed to encode sse event, skipping"
                                );
                            }
                        },
                        // Queue sender gone: the session was torn down.
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(Bytes::from_static(b": heartbeat\n\n"));
                }
            }
        }
    }
}
