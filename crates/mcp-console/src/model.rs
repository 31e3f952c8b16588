//! Wire-level JSON-RPC 2.0 types.
//!
//! Every HTTP body is decoded once, at the boundary, into a [`JsonRpcMessage`]
//! and matched exhaustively from there. A message with `method` and `id` is a
//! request, `method` without `id` is a notification, and `result`/`error`
//! without `method` is a response to something this console sent earlier.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The `jsonrpc` version marker. Serializes as the string `"2.0"` and refuses
/// to deserialize anything else, which keeps the untagged envelope decode
/// strict.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion2_0;

impl Serialize for JsonRpcVersion2_0 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("2.0")
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion2_0 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version: std::borrow::Cow<'de, str> = Deserialize::deserialize(deserializer)?;
        if version == "2.0" {
            Ok(JsonRpcVersion2_0)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version: {version}"
            )))
        }
    }
}

/// A JSON-RPC request id. Ids this console allocates are always numeric, but
/// the peer may use strings for its own requests and we must echo them back
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(Arc<str>),
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        RequestId::Number(id)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => n.fmt(f),
            RequestId::String(s) => s.fmt(f),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.0, self.message)?;
        if let Some(data) = &self.data {
            write!(f, " ({data})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i32);

impl ErrorCode {
    pub const INVALID_REQUEST: Self = Self(-32600);
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
}

/// One JSON-RPC envelope, classified by shape.
///
/// The variant order matters: `Request` must be tried before `Notification`
/// so that the presence of `id` decides between them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request {
        jsonrpc: JsonRpcVersion2_0,
        id: RequestId,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Notification {
        jsonrpc: JsonRpcVersion2_0,
        method: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        params: Option<Value>,
    },
    Response {
        jsonrpc: JsonRpcVersion2_0,
        id: RequestId,
        result: Value,
    },
    Error {
        jsonrpc: JsonRpcVersion2_0,
        id: RequestId,
        error: ErrorObject,
    },
}

impl JsonRpcMessage {
    pub fn request(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        JsonRpcMessage::Request {
            jsonrpc: JsonRpcVersion2_0,
            id: id.into(),
            method: method.into(),
            params,
        }
    }

    pub fn response(id: RequestId, result: Value) -> Self {
        JsonRpcMessage::Response {
            jsonrpc: JsonRpcVersion2_0,
            id,
            result,
        }
    }

    pub fn error(id: RequestId, error: ErrorObject) -> Self {
        JsonRpcMessage::Error {
            jsonrpc: JsonRpcVersion2_0,
            id,
            error,
        }
    }
}

/// Peer identity reported in the `initialize` request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub client_info: ClientInfo,
    #[serde(default)]
    pub protocol_version: Option<String>,
}

pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SERVER_NAME: &str = "mcp-console";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The body of a successful `initialize` response.
pub fn initialize_result() -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": { "listChanged": true }
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": SERVER_VERSION,
        }
    })
}

/// A tool as advertised by the peer in a `tools/list` result. Input schemas
/// are carried opaquely; this console never validates against them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<Tool>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_shape_decodes_as_request() {
        let msg: JsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 7,
            "method": "initialize",
            "params": {"clientInfo": {"name": "probe", "version": "1.2.3"}}
        }))
        .unwrap();
        match msg {
            JsonRpcMessage::Request { id, method, .. } => {
                assert_eq!(id, RequestId::Number(7));
                assert_eq!(method, "initialize");
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn method_without_id_decodes_as_notification() {
        let msg: JsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized"
        }))
        .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Notification { method, .. } if method == "notifications/initialized"));
    }

    #[test]
    fn result_without_method_decodes_as_response() {
        let msg: JsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 42,
            "result": {"tools": []}
        }))
        .unwrap();
        assert!(matches!(msg, JsonRpcMessage::Response { id: RequestId::Number(42), .. }));
    }

    #[test]
    fn error_shape_decodes_as_error() {
        let msg: JsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32000, "message": "boom"}
        }))
        .unwrap();
        match msg {
            JsonRpcMessage::Error { error, .. } => assert_eq!(error.code, ErrorCode(-32000)),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn string_ids_round_trip() {
        let msg: JsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "ping"
        }))
        .unwrap();
        let JsonRpcMessage::Request { id, .. } = &msg else {
            panic!("expected request");
        };
        assert_eq!(id.to_string(), "abc");
        let echoed = serde_json::to_value(JsonRpcMessage::response(id.clone(), json!({}))).unwrap();
        assert_eq!(echoed["id"], "abc");
    }

    #[test]
    fn wrong_version_is_rejected() {
        let result: Result<JsonRpcMessage, _> = serde_json::from_value(json!({
            "jsonrpc": "1.0",
            "id": 1,
            "method": "ping"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn bare_envelope_is_rejected() {
        let result: Result<JsonRpcMessage, _> =
            serde_json::from_value(json!({"jsonrpc": "2.0", "id": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn outbound_request_omits_missing_params() {
        let value = serde_json::to_value(JsonRpcMessage::request(9u64, "tools/list", None)).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "id": 9, "method": "tools/list"}));
    }
}
