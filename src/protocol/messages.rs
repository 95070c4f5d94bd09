//! MCP JSON-RPC message types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use super::{Content, Info, ServerCapabilities, Tool};

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID
    pub id: RequestId,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC notification (no id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC response
///
/// `id` is always serialized, as `null` when the request id was null or
/// could not be determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,
    /// Request ID, echoed verbatim
    pub id: RequestId,
    /// Result (on success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (on failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: RequestId, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Whether this response carries an error object
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Optional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Request ID (string, number, or null)
///
/// Numbers are kept as [`serde_json::Number`] so integer and float ids are
/// echoed back exactly as the client sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String ID
    String(String),
    /// Numeric ID
    Number(Number),
    /// Explicit `null` ID
    Null,
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A decoded inbound document, classified by JSON-RPC envelope shape.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Carries an `id`: exactly one response is owed
    Request(JsonRpcRequest),
    /// No `id`: never answered
    Notification(JsonRpcNotification),
    /// A `result`/`error` object sent by the client; the server issues no
    /// requests, so these are only logged
    Response(Value),
    /// Valid JSON that is not a JSON-RPC message. `id` is `None` when the
    /// document was shaped like a notification, in which case no error
    /// response is sent.
    Invalid {
        /// Id to answer with, if any
        id: Option<RequestId>,
        /// Human-readable reason
        reason: String,
    },
}

impl IncomingMessage {
    /// Classify a parsed JSON document.
    ///
    /// The presence of the `id` key (not its value) decides between a
    /// request and a notification, so `"id": null` is a request.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        let Value::Object(mut obj) = value else {
            return Self::invalid(Some(RequestId::Null), "expected a JSON object");
        };

        let id = match obj.get("id") {
            None => None,
            Some(raw) => match serde_json::from_value::<RequestId>(raw.clone()) {
                Ok(id) => Some(id),
                Err(_) => {
                    return Self::invalid(
                        Some(RequestId::Null),
                        "id must be a string, number, or null",
                    );
                }
            },
        };

        let method = match obj.remove("method") {
            Some(Value::String(method)) => method,
            Some(_) => return Self::invalid(Some(id.unwrap_or(RequestId::Null)), "method must be a string"),
            None if obj.contains_key("result") || obj.contains_key("error") => {
                return Self::Response(Value::Object(obj));
            }
            None => return Self::invalid(Some(id.unwrap_or(RequestId::Null)), "missing method"),
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Self::invalid(id, "jsonrpc must be \"2.0\"");
        }

        let params = match obj.remove("params") {
            None | Some(Value::Null) => None,
            Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p),
            Some(_) => return Self::invalid(id, "params must be an object or array"),
        };

        match id {
            Some(id) => Self::Request(JsonRpcRequest {
                jsonrpc: "2.0".to_string(),
                id,
                method,
                params,
            }),
            None => Self::Notification(JsonRpcNotification {
                jsonrpc: "2.0".to_string(),
                method,
                params,
            }),
        }
    }

    fn invalid(id: Option<RequestId>, reason: &str) -> Self {
        Self::Invalid {
            id,
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// Initialize
// ============================================================================

/// Initialize request params
///
/// Every field is optional on the way in: `initialize` never fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol version requested by the client
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,
    /// Client capabilities
    #[serde(default)]
    pub capabilities: Map<String, Value>,
    /// Client info
    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<Info>,
}

/// Initialize result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities
    pub capabilities: ServerCapabilities,
    /// Server info
    #[serde(rename = "serverInfo")]
    pub server_info: Info,
    /// Optional instructions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ============================================================================
// Tools
// ============================================================================

/// Tools list result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// List of tools
    pub tools: Vec<Tool>,
    /// Next cursor for pagination
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Tools call request params
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallParams {
    /// Tool name
    pub name: String,
    /// Tool arguments
    #[serde(default)]
    pub arguments: Value,
}

/// Tools call result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallResult {
    /// Content items
    pub content: Vec<Content>,
    /// Whether result is an error
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolsCallResult {
    /// Text of the content block at `index`, if it is a text block
    #[must_use]
    pub fn text(&self, index: usize) -> Option<&str> {
        self.content.get(index).map(|c| match c {
            Content::Text { text } => text.as_str(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
