use std::time::Duration;

use crate::model::ErrorObject;

/// Unified error type for operations issued against a connected peer.
///
/// `Peer` means the peer answered with a JSON-RPC error; `Timeout` means it
/// never answered within the allotted window. Callers rely on being able to
/// tell those apart.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error("peer reported an error: {0}")]
    Peer(ErrorObject),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("session closed")]
    SessionClosed,
    #[error("no active initialized session")]
    NoSession,
    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(&'static str),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
