//! mcp-console: a control-plane console for reverse-connecting MCP agents.
//!
//! The usual MCP roles are inverted here. A diagnostics agent embedded in a
//! target process dials *out* to this console: it holds a long-lived SSE
//! stream open (GET) on which the console pushes JSON-RPC requests, and it
//! POSTs its responses, notifications, and its own handshake requests back
//! on the same mount point. The console therefore has to solve session
//! identity, request/response correlation, reconnection, and stream
//! keep-alive itself, without a symmetric request/reply socket.

mod error;

pub mod cli;
pub mod console;
pub mod model;
pub mod session;
pub mod transport;

pub use console::{TimeoutClass, call_tool, list_tools, send_request, send_request_with};
pub use error::ConsoleError;
pub use session::{CorrelationTable, OutboundEvent, RequestMeta, Session, SessionRegistry, ToolOutcome};
pub use transport::{ConsoleServerConfig, HEADER_SESSION_ID, router, serve};
