//! Per-peer session state.
//!
//! A [`Session`] groups everything the transport knows about one connected
//! peer: its identity, the outbound event queue drained by the SSE stream,
//! and the [`CorrelationTable`] that matches the peer's POSTed responses back
//! to the requests this console pushed over the stream.
//!
//! The session object outlives its SSE stream on purpose: after the peer
//! disconnects, trailing POSTs may still carry responses for requests that
//! are already in flight, so the stream handler only flips `active` and
//! leaves the rest in place.

mod registry;

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

pub use registry::SessionRegistry;

use crate::{
    error::ConsoleError,
    model::{ClientInfo, JsonRpcMessage, RequestId},
};

pub type SessionId = Arc<str>;

pub fn session_id() -> SessionId {
    uuid::Uuid::new_v4().to_string().into()
}

/// Outcome of one outbound request, delivered through the correlation table.
pub type ToolOutcome = Result<Value, ConsoleError>;

/// Caller-supplied context attached to a pending request. Used for
/// diagnostics only; correlation is by id alone.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: String,
    pub tool: Option<String>,
    pub sent_at: Instant,
}

impl RequestMeta {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            tool: None,
            sent_at: Instant::now(),
        }
    }

    pub fn for_tool(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        Self {
            method: "tools/call".to_string(),
            tool: Some(tool),
            sent_at: Instant::now(),
        }
    }
}

/// One frame queued for delivery over the session's SSE stream.
#[derive(Debug)]
pub struct OutboundEvent {
    pub event: &'static str,
    pub data: JsonRpcMessage,
}

impl OutboundEvent {
    pub fn message(data: JsonRpcMessage) -> Self {
        Self {
            event: "message",
            data,
        }
    }

    /// Render as one complete SSE frame. Frames are always written whole so
    /// two writers can never interleave partial frames on one connection.
    pub fn to_frame(&self) -> Result<Bytes, serde_json::Error> {
        let data = serde_json::to_string(&self.data)?;
        Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", self.event, data)))
    }
}

struct PendingRequest {
    tx: oneshot::Sender<ToolOutcome>,
    meta: RequestMeta,
}

/// Maps in-flight request ids to their single-shot continuations.
///
/// Exactly-once resolution is enforced by construction: resolving removes the
/// entry and consumes its oneshot sender, so a second response (or a timeout
/// racing a response) finds nothing to fire.
#[derive(Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl CorrelationTable {
    /// Register a pending request and hand back the receiving half of its
    /// continuation. Ids come from the registry's monotonic counter, so a
    /// collision here would be a bug; the previous entry is never silently
    /// overwritten.
    pub fn register(&self, id: RequestId, meta: RequestMeta) -> oneshot::Receiver<ToolOutcome> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock().expect("correlation table poisoned");
        debug_assert!(!entries.contains_key(&id), "duplicate request id {id}");
        entries.insert(id, PendingRequest { tx, meta });
        rx
    }

    /// Resolve the entry for `id`, if still pending. Returns the metadata of
    /// the resolved request, or `None` when the id is unknown or already
    /// resolved (late and duplicate responses are no-ops).
    pub fn resolve(&self, id: &RequestId, outcome: ToolOutcome) -> Option<RequestMeta> {
        let pending = self
            .entries
            .lock()
            .expect("correlation table poisoned")
            .remove(id)?;
        // The receiver may have given up already (timeout); that is fine.
        let _ = pending.tx.send(outcome);
        Some(pending.meta)
    }

    /// Deregister without firing the continuation. Used by the timeout path,
    /// which reports the timeout to its caller directly.
    pub fn remove(&self, id: &RequestId) -> Option<RequestMeta> {
        self.entries
            .lock()
            .expect("correlation table poisoned")
            .remove(id)
            .map(|pending| pending.meta)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.entries
            .lock()
            .expect("correlation table poisoned")
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("correlation table poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve every outstanding entry with an error produced per entry.
    /// The table is empty afterwards.
    pub fn fail_all(&self, error: impl Fn() -> ConsoleError) {
        let drained: Vec<PendingRequest> = {
            let mut entries = self.entries.lock().expect("correlation table poisoned");
            entries.drain().map(|(_, pending)| pending).collect()
        };
        for pending in drained {
            let _ = pending.tx.send(Err(error()));
        }
    }
}

/// One connected peer.
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    client_info: Mutex<Option<ClientInfo>>,
    initialized: AtomicBool,
    active: AtomicBool,
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<OutboundEvent>>>,
    pub pending: CorrelationTable,
}

impl Session {
    pub(crate) fn new(id: SessionId) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            id,
            created_at: Utc::now(),
            client_info: Mutex::new(None),
            initialized: AtomicBool::new(false),
            active: AtomicBool::new(true),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            pending: CorrelationTable::default(),
        })
    }

    /// Queue an event for the SSE stream. Enqueueing onto a session whose
    /// stream is gone is allowed; the request will simply age out.
    pub fn enqueue(&self, event: OutboundEvent) {
        if self.outbound_tx.send(event).is_err() {
            tracing::debug!(session_id = %self.id, "outbound queue dropped, event discarded");
        }
    }

    /// Hand the queue's single consumer end to an SSE stream. Returns `None`
    /// if a stream already consumed it; the caller then treats the GET as a
    /// reconnect and creates a fresh session.
    pub(crate) fn take_outbound_rx(&self) -> Option<mpsc::UnboundedReceiver<OutboundEvent>> {
        self.outbound_rx
            .lock()
            .expect("outbound receiver lock poisoned")
            .take()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// A session can carry new commands only while its stream is attached and
    /// the handshake has completed.
    pub fn is_selectable(&self) -> bool {
        self.is_active() && self.is_initialized()
    }

    pub fn set_client_info(&self, info: ClientInfo) {
        *self.client_info.lock().expect("client info lock poisoned") = Some(info);
    }

    pub fn client_info(&self) -> Option<ClientInfo> {
        self.client_info
            .lock()
            .expect("client info lock poisoned")
            .clone()
    }

    pub fn set_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Flip `active` off, exactly once. Called when the SSE stream ends or
    /// the session is closed; pending entries are left for their timeouts
    /// unless `close` is used.
    pub fn mark_inactive(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::info!(session_id = %self.id, "session stream ended");
        }
    }

    /// Terminal shutdown: no continuation may be left unresolved.
    pub fn close(&self) {
        self.mark_inactive();
        self.pending.fail_all(|| ConsoleError::SessionClosed);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("initialized", &self.is_initialized())
            .field("active", &self.is_active())
            .field("pending", &self.pending.len())
            .finish()
    }
}
