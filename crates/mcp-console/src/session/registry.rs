//! Process-wide session registry.
//!
//! One registry is created per process and shared by every connection
//! handler; there is no ambient global state. The inner lock guards only map
//! mutation and is never held across an await.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use crate::model::RequestId;

use super::{Session, SessionId, session_id};

#[derive(Default)]
pub struct SessionRegistry {
    // Insertion order doubles as the `select_active` tie-break, so the
    // single-peer policy stays deterministic within a process run.
    sessions: Mutex<Vec<Arc<Session>>>,
    request_ids: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Allocate the next request id. Process-wide and monotonic: an id is
    /// never reused, even across sessions, which is what makes the
    /// cross-session response fallback safe.
    pub fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.request_ids.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn create_session(&self) -> Arc<Session> {
        let session = Session::new(session_id());
        self.sessions
            .lock()
            .expect("session map poisoned")
            .push(session.clone());
        tracing::info!(session_id = %session.id, "session created");
        session
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .iter()
            .find(|session| session.id.as_ref() == id)
            .cloned()
    }

    /// Close the session and drop it from the registry. Every pending
    /// continuation resolves with a session-closed error.
    pub fn remove(&self, id: &str) {
        let removed = {
            let mut sessions = self.sessions.lock().expect("session map poisoned");
            let position = sessions.iter().position(|s| s.id.as_ref() == id);
            position.map(|index| sessions.remove(index))
        };
        if let Some(session) = removed {
            session.close();
            tracing::info!(session_id = %session.id, "session removed");
        }
    }

    /// First session, in insertion order, that can carry new commands.
    pub fn select_active(&self) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .iter()
            .find(|session| session.is_selectable())
            .cloned()
    }

    /// Cross-session search for a pending request id. Last-resort fallback
    /// for responses from a peer that restarted and is now bound to a
    /// different session than the one that issued the request.
    pub fn find_pending(&self, id: &RequestId) -> Option<Arc<Session>> {
        self.sessions
            .lock()
            .expect("session map poisoned")
            .iter()
            .find(|session| session.pending.contains(id))
            .cloned()
    }

    /// Drop every session other than `keep` that is inactive or never
    /// finished its handshake. Triggered by `notifications/initialized` so
    /// reconnect churn cannot accumulate half-open sessions. Known gap: a
    /// second peer that is mid-handshake at that moment loses its session.
    pub fn cleanup_stale(&self, keep: &SessionId) {
        let stale: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.lock().expect("session map poisoned");
            let (kept, stale): (Vec<_>, Vec<_>) = std::mem::take(&mut *sessions)
                .into_iter()
                .partition(|s| s.id == *keep || s.is_selectable());
            *sessions = kept;
            stale
        };
        for session in stale {
            tracing::info!(session_id = %session.id, "removing stale session");
            session.close();
        }
    }

    /// Snapshot for diagnostics and the interactive `sessions` command.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().expect("session map poisoned").clone()
    }
}
