//! Shared harness: a real console server bound to an ephemeral port, driven
//! with a plain reqwest client.

use std::{pin::Pin, sync::Arc, time::Duration};

use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use mcp_console::{ConsoleServerConfig, SessionRegistry};

pub const ACCEPT_SSE: &str = "text/event-stream";

pub struct Console {
    pub url: String,
    pub registry: Arc<SessionRegistry>,
    pub ct: CancellationToken,
}

impl Drop for Console {
    fn drop(&mut self) {
        self.ct.cancel();
    }
}

pub async fn start_console(auth_token: Option<&str>) -> Console {
    let ct = CancellationToken::new();
    let registry = SessionRegistry::new();
    let config = ConsoleServerConfig {
        bind: "127.0.0.1:0".parse().expect("loopback addr"),
        path: "/mcp".to_string(),
        auth_token: auth_token.map(str::to_string),
        sse_keep_alive: Duration::from_millis(500),
        ct: ct.clone(),
    };
    let bind = mcp_console::serve(registry.clone(), config)
        .await
        .expect("bind console server");
    Console {
        url: format!("http://{bind}/mcp"),
        registry,
        ct,
    }
}

/// Splits an SSE byte stream into whole frames.
pub struct SseReader {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>,
    buffer: String,
}

impl SseReader {
    pub fn new(resp: reqwest::Response) -> Self {
        Self {
            stream: Box::pin(resp.bytes_stream()),
            buffer: String::new(),
        }
    }

    pub async fn next_frame(&mut self) -> Option<String> {
        loop {
            if let Some(pos) = self.buffer.find("\n\n") {
                let frame = self.buffer[..pos].to_string();
                self.buffer.drain(..pos + 2);
                return Some(frame);
            }
            let chunk = self.stream.next().await?.ok()?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    /// Next `event: message` frame, decoded; comment frames are skipped.
    pub async fn next_message(&mut self) -> Option<Value> {
        while let Some(frame) = self.next_frame().await {
            if let Some(data) = frame
                .strip_prefix("event: message\n")
                .and_then(|rest| rest.strip_prefix("data: "))
            {
                return serde_json::from_str(data).ok();
            }
        }
        None
    }
}

/// Open the SSE stream, run the initialize handshake, and return the
/// assigned session id together with the live stream reader.
pub async fn connect_and_initialize(
    client: &reqwest::Client,
    console: &Console,
) -> (String, SseReader) {
    let resp = client
        .get(&console.url)
        .header("Accept", ACCEPT_SSE)
        .send()
        .await
        .expect("GET sse stream");
    assert_eq!(resp.status(), 200);
    let session_id = resp
        .headers()
        .get("Mcp-Session-Id")
        .expect("session id header")
        .to_str()
        .expect("ascii session id")
        .to_string();

    let mut reader = SseReader::new(resp);
    assert_eq!(reader.next_frame().await.as_deref(), Some(": connected"));

    let resp = client
        .post(&console.url)
        .header("Mcp-Session-Id", &session_id)
        .json(&json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "clientInfo": { "name": "probe", "version": "0.1.0" }
            }
        }))
        .send()
        .await
        .expect("POST initialize");
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(&console.url)
        .header("Mcp-Session-Id", &session_id)
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .expect("POST initialized notification");
    assert_eq!(resp.status(), 202);

    (session_id, reader)
}

/// POST one JSON-RPC envelope with a session header.
pub async fn post_message(
    client: &reqwest::Client,
    console: &Console,
    session_id: &str,
    body: &Value,
) -> reqwest::Response {
    client
        .post(&console.url)
        .header("Mcp-Session-Id", session_id)
        .json(body)
        .send()
        .await
        .expect("POST message")
}
