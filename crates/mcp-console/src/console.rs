//! Outbound request primitives: push a JSON-RPC request onto a session's
//! stream and wait for the peer's POSTed response, either blocking the
//! caller or through a single-shot callback.

use std::{sync::Arc, time::Duration};

use serde_json::Value;

use crate::{
    error::ConsoleError,
    model::{JsonRpcMessage, ListToolsResult, Tool},
    session::{OutboundEvent, RequestMeta, Session, SessionRegistry, ToolOutcome},
};

/// Tools that stream or run long get a wider response window than quick
/// diagnostic calls.
const STREAMING_TOOLS: &[&str] = &[
    "trace",
    "watch",
    "stack",
    "tt",
    "monitor",
    "dashboard",
    "profiler",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Quick,
    Streaming,
}

impl TimeoutClass {
    pub fn for_tool(name: &str) -> Self {
        if STREAMING_TOOLS.contains(&name) {
            TimeoutClass::Streaming
        } else {
            TimeoutClass::Quick
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            TimeoutClass::Quick => Duration::from_secs(30),
            TimeoutClass::Streaming => Duration::from_secs(60),
        }
    }
}

/// Allocate an id, register the continuation, and queue the request for the
/// SSE stream. The returned receiver resolves with the peer's response or a
/// session-closed error; timeouts are layered on by the callers below.
fn dispatch(
    registry: &SessionRegistry,
    session: &Session,
    method: &str,
    params: Option<Value>,
    meta: RequestMeta,
) -> (crate::model::RequestId, tokio::sync::oneshot::Receiver<ToolOutcome>) {
    let id = registry.next_request_id();
    let rx = session.pending.register(id.clone(), meta);
    session.enqueue(OutboundEvent::message(JsonRpcMessage::request(
        id.clone(),
        method,
        params,
    )));
    tracing::debug!(session_id = %session.id, request_id = %id, method, "request queued");
    (id, rx)
}

/// Blocking variant: waits up to `timeout` for the peer's response. On
/// expiry the pending entry is deregistered and a timeout is reported; a
/// response that arrives later is discarded by the dispatcher.
pub async fn send_request(
    registry: &SessionRegistry,
    session: &Session,
    method: &str,
    params: Option<Value>,
    timeout: Duration,
) -> ToolOutcome {
    let meta = RequestMeta::new(method);
    let (id, rx) = dispatch(registry, session, method, params, meta);
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(outcome)) => outcome,
        // Sender dropped without resolving: only session teardown does that.
        Ok(Err(_closed)) => Err(ConsoleError::SessionClosed),
        Err(_elapsed) => {
            session.pending.remove(&id);
            tracing::warn!(session_id = %session.id, request_id = %id, method, "request timed out");
            Err(ConsoleError::Timeout(timeout))
        }
    }
}

/// Callback variant: never blocks the caller. The callback fires exactly
/// once, with the peer's result, the peer's error, a timeout, or a
/// session-closed error when the session is torn down first.
pub fn send_request_with(
    registry: &Arc<SessionRegistry>,
    session: &Arc<Session>,
    method: &str,
    params: Option<Value>,
    timeout: Duration,
    meta: RequestMeta,
    callback: impl FnOnce(ToolOutcome) + Send + 'static,
) {
    let (id, rx) = dispatch(registry, session, method, params, meta);
    let session = session.clone();
    let method = method.to_string();
    tokio::spawn(async move {
        let outcome = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_closed)) => Err(ConsoleError::SessionClosed),
            Err(_elapsed) => {
                session.pending.remove(&id);
                tracing::warn!(
                    session_id = %session.id,
                    request_id = %id,
                    method = %method,
                    "request timed out"
                );
                Err(ConsoleError::Timeout(timeout))
            }
        };
        callback(outcome);
    });
}

/// Ask the active peer for its tool list. Quick timeout class; blocking.
pub async fn list_tools(registry: &SessionRegistry) -> Result<Vec<Tool>, ConsoleError> {
    let session = registry.select_active().ok_or(ConsoleError::NoSession)?;
    let result = send_request(
        registry,
        &session,
        "tools/list",
        None,
        TimeoutClass::Quick.duration(),
    )
    .await?;
    let parsed: ListToolsResult = serde_json::from_value(result)
        .map_err(|_| ConsoleError::UnexpectedResponse("tools/list result"))?;
    Ok(parsed.tools)
}

/// Invoke a tool on the active peer. Delivery is via callback so an
/// interactive caller stays responsive while a long tool runs; the timeout
/// class is chosen from the tool name.
pub fn call_tool(
    registry: &Arc<SessionRegistry>,
    name: &str,
    arguments: Value,
    callback: impl FnOnce(ToolOutcome) + Send + 'static,
) -> Result<(), ConsoleError> {
    let session = registry.select_active().ok_or(ConsoleError::NoSession)?;
    let timeout = TimeoutClass::for_tool(name).duration();
    let params = serde_json::json!({ "name": name, "arguments": arguments });
    send_request_with(
        registry,
        &session,
        "tools/call",
        Some(params),
        timeout,
        RequestMeta::for_tool(name),
        callback,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::RequestId;

    #[test]
    fn streaming_tools_get_the_wide_window() {
        for tool in ["trace", "watch", "stack", "tt", "monitor", "dashboard", "profiler"] {
            assert_eq!(TimeoutClass::for_tool(tool), TimeoutClass::Streaming);
        }
        assert_eq!(TimeoutClass::for_tool("jvm"), TimeoutClass::Quick);
        assert_eq!(TimeoutClass::for_tool("thread_count"), TimeoutClass::Quick);
        assert!(TimeoutClass::Streaming.duration() > TimeoutClass::Quick.duration());
    }

    #[tokio::test]
    async fn blocking_send_times_out_and_deregisters() {
        let registry = SessionRegistry::new();
        let session = registry.create_session();
        // Nothing consumes the queue, so the request can only age out.
        let outcome = send_request(
            &registry,
            &session,
            "tools/list",
            None,
            Duration::from_millis(50),
        )
        .await;
        assert!(matches!(outcome, Err(ConsoleError::Timeout(_))));
        assert!(session.pending.is_empty());
    }

    #[tokio::test]
    async fn blocking_send_resolves_with_peer_response() {
        let registry = SessionRegistry::new();
        let session = registry.create_session();

        let registry2 = registry.clone();
        let session2 = session.clone();
        let responder = tokio::spawn(async move {
            // Wait until the request is registered, then answer it.
            loop {
                if let Some(owner) = registry2.find_pending(&RequestId::Number(1)) {
                    owner
                        .pending
                        .resolve(&RequestId::Number(1), Ok(json!({"tools": []})));
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            drop(session2);
        });

        let outcome = send_request(
            &registry,
            &session,
            "tools/list",
            None,
            Duration::from_secs(2),
        )
        .await;
        assert_eq!(outcome.unwrap(), json!({"tools": []}));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn callback_fires_on_session_close() {
        let registry = SessionRegistry::new();
        let session = registry.create_session();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        send_request_with(
            &registry,
            &session,
            "tools/call",
            Some(json!({"name": "trace"})),
            Duration::from_secs(10),
            RequestMeta::for_tool("trace"),
            move |outcome| {
                let _ = done_tx.send(outcome);
            },
        );

        registry.remove(&session.id);
        let outcome = tokio::time::timeout(Duration::from_secs(1), done_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, Err(ConsoleError::SessionClosed)));
    }

    #[tokio::test]
    async fn list_tools_without_selectable_session_fails_fast() {
        let registry = SessionRegistry::new();
        // A session that never initialized is not selectable.
        let _session = registry.create_session();
        match list_tools(&registry).await {
            Err(ConsoleError::NoSession) => {}
            other => panic!("expected no-session, got {other:?}"),
        }
    }
}
