//! The fixed tool set: `http_get`, `http_post` and `http_request`.
//!
//! Definitions are built once at startup and never change. Turning a
//! `tools/call` into a [`FetchRequest`] is lenient on purpose: a missing
//! `url` or a malformed optional argument is carried through to the
//! gateway, which answers with its uniform validation failure.

use serde_json::{Map, Value, json};

use crate::gateway::{FetchRequest, RequestBody};
use crate::protocol::{Tool, ToolAnnotations, ToolsListResult};
use crate::{Error, Result};

/// Methods accepted by `http_request`
pub const SUPPORTED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// One of the three built-in tools
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// GET a URL
    HttpGet,
    /// POST to a URL
    HttpPost,
    /// Any supported method
    HttpRequest,
}

impl ToolKind {
    /// All tools, in listing order
    pub const ALL: [Self; 3] = [Self::HttpGet, Self::HttpPost, Self::HttpRequest];

    /// Wire name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::HttpGet => "http_get",
            Self::HttpPost => "http_post",
            Self::HttpRequest => "http_request",
        }
    }

    /// Look up a tool by wire name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn definition(self) -> Tool {
        let url = json!({
            "type": "string",
            "description": "Absolute http(s) URL to fetch"
        });
        let headers = json!({
            "type": "object",
            "description": "Extra request headers",
            "additionalProperties": { "type": "string" }
        });
        let body = json!({
            "description": "Request body. Strings are sent as-is; any other JSON value is sent as application/json"
        });

        match self {
            Self::HttpGet => Tool {
                name: self.name().to_string(),
                title: Some("HTTP GET".to_string()),
                description: "Fetch a URL with GET through the security gateway. \
                              Returns the response body and gateway metadata."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "url": url, "headers": headers },
                    "required": ["url"]
                }),
                annotations: Some(ToolAnnotations {
                    read_only_hint: Some(true),
                    destructive_hint: Some(false),
                    idempotent_hint: Some(true),
                    open_world_hint: Some(true),
                }),
            },
            Self::HttpPost => Tool {
                name: self.name().to_string(),
                title: Some("HTTP POST".to_string()),
                description: "Send a POST request through the security gateway. \
                              Returns the response body and gateway metadata."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "url": url, "headers": headers, "body": body },
                    "required": ["url"]
                }),
                annotations: Some(ToolAnnotations {
                    read_only_hint: Some(false),
                    destructive_hint: Some(false),
                    idempotent_hint: Some(false),
                    open_world_hint: Some(true),
                }),
            },
            Self::HttpRequest => Tool {
                name: self.name().to_string(),
                title: Some("HTTP request".to_string()),
                description: "Send an HTTP request with any supported method through the \
                              security gateway. Returns the response body and gateway metadata."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "url": url,
                        "method": {
                            "type": "string",
                            "enum": SUPPORTED_METHODS,
                            "default": "GET"
                        },
                        "headers": headers,
                        "body": body
                    },
                    "required": ["url"]
                }),
                annotations: Some(ToolAnnotations {
                    read_only_hint: Some(false),
                    destructive_hint: Some(true),
                    idempotent_hint: Some(false),
                    open_world_hint: Some(true),
                }),
            },
        }
    }
}

/// Immutable registry of the tool definitions
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<Tool>,
    list_result: Value,
}

impl ToolRegistry {
    /// Build the registry and pre-render the `tools/list` result.
    #[must_use]
    pub fn new() -> Self {
        let tools: Vec<Tool> = ToolKind::ALL.into_iter().map(ToolKind::definition).collect();
        let list_result = serde_json::to_value(ToolsListResult {
            tools: tools.clone(),
            next_cursor: None,
        })
        .unwrap_or_else(|_| json!({ "tools": [] }));
        Self { tools, list_result }
    }

    /// Tool definitions
    #[must_use]
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// The `tools/list` result, identical on every call
    #[must_use]
    pub fn list_result(&self) -> &Value {
        &self.list_result
    }

    /// Number of tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry has no tools
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve a tool name.
    ///
    /// # Errors
    ///
    /// Returns `Error::ToolNotFound` for names outside the fixed set.
    pub fn resolve(&self, name: &str) -> Result<ToolKind> {
        ToolKind::from_name(name).ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }

    /// Turn tool arguments into a request description.
    #[must_use]
    pub fn build_request(&self, kind: ToolKind, arguments: &Map<String, Value>) -> FetchRequest {
        let mut request = FetchRequest {
            method: match kind {
                ToolKind::HttpGet => "GET".to_string(),
                ToolKind::HttpPost => "POST".to_string(),
                ToolKind::HttpRequest => "GET".to_string(),
            },
            url: arguments
                .get("url")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            ..FetchRequest::default()
        };

        if kind == ToolKind::HttpRequest {
            match arguments.get("method") {
                None | Some(Value::Null) => {}
                Some(Value::String(m)) => {
                    let upper = m.trim().to_ascii_uppercase();
                    if SUPPORTED_METHODS.contains(&upper.as_str()) {
                        request.method = upper;
                    } else {
                        request.invalid_argument = Some(format!("Unsupported method: {m}"));
                    }
                }
                Some(_) => request.invalid_argument = Some("method must be a string".to_string()),
            }
        }

        match arguments.get("headers") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (name, value) in map {
                    let value = match value {
                        Value::String(s) => s.clone(),
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        _ => {
                            request
                                .invalid_argument
                                .get_or_insert_with(|| format!("Header '{name}' must be a string"));
                            continue;
                        }
                    };
                    request.headers.push((name.clone(), value));
                }
            }
            Some(_) => {
                request
                    .invalid_argument
                    .get_or_insert_with(|| "headers must be an object".to_string());
            }
        }

        if kind != ToolKind::HttpGet {
            request.body = match arguments.get("body") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) => Some(RequestBody::Text(s.clone())),
                Some(other) => Some(RequestBody::Json(other.clone())),
            };
        }

        request
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize `tools/call` arguments: an object, a JSON-encoded object
/// string, or absent/null (treated as `{}`).
///
/// # Errors
///
/// Returns `Error::InvalidParams` for anything else.
pub fn parse_tool_arguments(arguments: Value) -> Result<Map<String, Value>> {
    match arguments {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::InvalidParams(
                "arguments string must encode a JSON object".to_string(),
            )),
            Err(e) => Err(Error::InvalidParams(format!(
                "arguments string is not valid JSON: {e}"
            ))),
        },
        _ => Err(Error::InvalidParams("arguments must be an object".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        parse_tool_arguments(v).unwrap()
    }

    // ── Registry ──────────────────────────────────────────────────────

    #[test]
    fn lists_three_tools_with_required_url() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());

        let tools = registry.list_result()["tools"].as_array().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["http_get", "http_post", "http_request"]);
        for tool in tools {
            assert_eq!(tool["inputSchema"]["type"], "object");
            assert_eq!(tool["inputSchema"]["properties"]["url"]["type"], "string");
            assert_eq!(tool["inputSchema"]["required"], json!(["url"]));
        }
        assert!(registry.list_result().get("nextCursor").is_none());
    }

    #[test]
    fn http_request_schema_lists_methods() {
        let registry = ToolRegistry::new();
        let schema = &registry.tools()[2].input_schema;
        assert_eq!(schema["properties"]["method"]["enum"], json!(SUPPORTED_METHODS));
    }

    #[test]
    fn resolve_known_and_unknown() {
        let registry = ToolRegistry::new();
        assert_eq!(registry.resolve("http_post").unwrap(), ToolKind::HttpPost);
        let err = registry.resolve("nonexistent_tool").unwrap_err();
        assert_eq!(err.to_string(), "Tool not found: nonexistent_tool");
    }

    // ── build_request ─────────────────────────────────────────────────

    #[test]
    fn get_request_ignores_body() {
        let registry = ToolRegistry::new();
        let req = registry.build_request(
            ToolKind::HttpGet,
            &args(json!({"url": " https://example.test/get ", "body": "x"})),
        );
        assert_eq!(req.method, "GET");
        assert_eq!(req.url.as_deref(), Some("https://example.test/get"));
        assert!(req.body.is_none());
        assert!(req.invalid_argument.is_none());
    }

    #[test]
    fn post_request_carries_text_or_json_body() {
        let registry = ToolRegistry::new();
        let text = registry.build_request(
            ToolKind::HttpPost,
            &args(json!({"url": "https://a.test", "body": "raw"})),
        );
        assert_eq!(text.method, "POST");
        assert_eq!(text.body, Some(RequestBody::Text("raw".to_string())));

        let json_body = registry.build_request(
            ToolKind::HttpPost,
            &args(json!({"url": "https://a.test", "body": {"k": [1, 2]}})),
        );
        assert_eq!(json_body.body, Some(RequestBody::Json(json!({"k": [1, 2]}))));
    }

    #[test]
    fn generic_request_method_handling() {
        let registry = ToolRegistry::new();
        let put = registry.build_request(
            ToolKind::HttpRequest,
            &args(json!({"url": "https://a.test", "method": "put"})),
        );
        assert_eq!(put.method, "PUT");

        let default = registry.build_request(ToolKind::HttpRequest, &args(json!({"url": "https://a.test"})));
        assert_eq!(default.method, "GET");

        let bad = registry.build_request(
            ToolKind::HttpRequest,
            &args(json!({"url": "https://a.test", "method": "TRACE"})),
        );
        assert_eq!(bad.invalid_argument.as_deref(), Some("Unsupported method: TRACE"));
    }

    #[test]
    fn missing_or_empty_url_is_carried_as_none() {
        let registry = ToolRegistry::new();
        assert!(registry.build_request(ToolKind::HttpGet, &Map::new()).url.is_none());
        assert!(registry
            .build_request(ToolKind::HttpGet, &args(json!({"url": ""})))
            .url
            .is_none());
        assert!(registry
            .build_request(ToolKind::HttpGet, &args(json!({"url": 42})))
            .url
            .is_none());
    }

    #[test]
    fn headers_are_collected_and_scalars_stringified() {
        let registry = ToolRegistry::new();
        let req = registry.build_request(
            ToolKind::HttpGet,
            &args(json!({"url": "https://a.test", "headers": {"Accept": "text/plain", "X-Retry": 3}})),
        );
        assert!(req.headers.contains(&("Accept".to_string(), "text/plain".to_string())));
        assert!(req.headers.contains(&("X-Retry".to_string(), "3".to_string())));

        let bad = registry.build_request(
            ToolKind::HttpGet,
            &args(json!({"url": "https://a.test", "headers": ["nope"]})),
        );
        assert_eq!(bad.invalid_argument.as_deref(), Some("headers must be an object"));
    }

    // ── parse_tool_arguments ──────────────────────────────────────────

    #[test]
    fn arguments_accept_object_string_and_null() {
        assert_eq!(args(json!({"url": "u"}))["url"], "u");
        assert_eq!(args(json!("{\"url\":\"u\"}"))["url"], "u");
        assert!(args(Value::Null).is_empty());
    }

    #[test]
    fn arguments_reject_other_shapes() {
        assert!(matches!(parse_tool_arguments(json!([1])), Err(Error::InvalidParams(_))));
        assert!(matches!(parse_tool_arguments(json!("[1]")), Err(Error::InvalidParams(_))));
        assert!(matches!(parse_tool_arguments(json!("{oops")), Err(Error::InvalidParams(_))));
    }
}
