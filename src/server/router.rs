//! JSON-RPC method routing for the MCP session

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::session::{ClientDetails, Session};
use crate::config::ServerConfig;
use crate::gateway::FetchGateway;
use crate::protocol::{
    Info, InitializeParams, InitializeResult, JsonRpcNotification, JsonRpcRequest,
    JsonRpcResponse, KNOWN_CLIENT_VERSIONS, PROTOCOL_VERSION, ServerCapabilities,
    ToolsCallParams, ToolsCapability,
};
use crate::tools::{ToolRegistry, parse_tool_arguments};
use crate::{Error, Result, SERVER_NAME};

/// Routes requests and notifications to their handlers.
pub struct Router {
    tools: ToolRegistry,
    gateway: Arc<dyn FetchGateway>,
    require_initialization: bool,
    instructions: Option<String>,
}

impl Router {
    /// Create a router over the fixed tool set
    pub fn new(config: &ServerConfig, gateway: Arc<dyn FetchGateway>) -> Self {
        Self {
            tools: ToolRegistry::new(),
            gateway,
            require_initialization: config.require_initialization,
            instructions: config.instructions.clone(),
        }
    }

    /// Tool registry
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer one request. Always produces exactly one response.
    pub async fn handle_request(&self, session: &Session, request: JsonRpcRequest) -> JsonRpcResponse {
        let JsonRpcRequest { id, method, params, .. } = request;
        debug!(id = %id, method = %method, "Handling request");

        match self.dispatch(session, &method, params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                debug!(id = %id, method = %method, error = %e, "Request failed");
                JsonRpcResponse::error(id, e.to_rpc_code(), e.to_string())
            }
        }
    }

    async fn dispatch(&self, session: &Session, method: &str, params: Option<Value>) -> Result<Value> {
        match method {
            "initialize" => Ok(self.handle_initialize(session, params)),
            "ping" => Ok(json!({})),
            "tools/list" => {
                self.ensure_ready(session, method)?;
                Ok(self.tools.list_result().clone())
            }
            "tools/call" => {
                self.ensure_ready(session, method)?;
                self.handle_tools_call(params).await
            }
            _ => Err(Error::MethodNotFound(method.to_string())),
        }
    }

    /// Handle a notification. Never produces a response.
    pub fn handle_notification(&self, session: &Session, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                if session.mark_initialized() {
                    info!(session = %session.id(), "Client initialized");
                } else {
                    debug!(session = %session.id(), "Duplicate initialized notification");
                }
            }
            "notifications/cancelled" => {
                // Requests run to completion; the response is still sent
                debug!(params = ?notification.params, "Cancellation requested");
            }
            other => debug!(method = other, "Ignoring notification"),
        }
    }

    /// Reject tool methods before the handshake in strict mode.
    fn ensure_ready(&self, session: &Session, method: &str) -> Result<()> {
        if session.is_initialized() {
            return Ok(());
        }
        if self.require_initialization {
            return Err(Error::NotInitialized);
        }
        debug!(method, "Serving request before initialization");
        Ok(())
    }

    fn handle_initialize(&self, session: &Session, params: Option<Value>) -> Value {
        // initialize never fails: unreadable params are treated as empty
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();

        let requested = params.protocol_version.as_deref().unwrap_or("");
        if !KNOWN_CLIENT_VERSIONS.contains(&requested) {
            debug!(requested, answered = PROTOCOL_VERSION, "Client requested an unfamiliar protocol version");
        }
        info!(
            session = %session.id(),
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            client_version = params.client_info.as_ref().map_or("", |c| c.version.as_str()),
            protocol_version = requested,
            "Initialize request"
        );

        session.record_client(ClientDetails {
            info: params.client_info,
            protocol_version: params.protocol_version,
        });

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
            },
            server_info: Info {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
            },
            instructions: self.instructions.clone(),
        };
        serde_json::to_value(result).unwrap_or_else(|_| json!({}))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> Result<Value> {
        let params = params.ok_or_else(|| Error::InvalidParams("missing params".to_string()))?;
        let ToolsCallParams { name, arguments } = serde_json::from_value(params)
            .map_err(|e| Error::InvalidParams(e.to_string()))?;

        let kind = self.tools.resolve(&name).inspect_err(|_| {
            warn!(tool = %name, "Unknown tool requested");
        })?;
        let arguments = parse_tool_arguments(arguments)?;
        let request = self.tools.build_request(kind, &arguments);

        let result = self.gateway.invoke(kind.name(), request).await;
        Ok(serde_json::to_value(result)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::rpc_codes;
    use crate::gateway::FetchRequest;
    use crate::protocol::{Content, RequestId, ToolsCallResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Records calls and echoes the request back as text.
    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<(String, FetchRequest)>>,
    }

    #[async_trait]
    impl FetchGateway for RecordingGateway {
        async fn invoke(&self, tool_name: &str, request: FetchRequest) -> ToolsCallResult {
            let text = format!("{} {}", request.method, request.url.clone().unwrap_or_default());
            self.calls.lock().push((tool_name.to_string(), request));
            ToolsCallResult {
                content: vec![Content::text(text)],
                is_error: false,
            }
        }
    }

    fn router(require_initialization: bool) -> (Router, Arc<RecordingGateway>) {
        let gateway = Arc::new(RecordingGateway::default());
        let config = ServerConfig {
            require_initialization,
            instructions: Some("Fetch things safely".to_string()),
            ..ServerConfig::default()
        };
        (Router::new(&config, gateway.clone()), gateway)
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: RequestId::from(1),
            method: method.to_string(),
            params,
        }
    }

    fn notification(method: &str) -> JsonRpcNotification {
        JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: None,
        }
    }

    // ── initialize / ping ─────────────────────────────────────────────

    #[tokio::test]
    async fn initialize_returns_server_identity() {
        let (router, _) = router(false);
        let session = Session::new();
        let resp = router
            .handle_request(
                &session,
                request(
                    "initialize",
                    Some(json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": {},
                        "clientInfo": {"name": "test-client", "version": "1.0"}
                    })),
                ),
            )
            .await;

        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["capabilities"], json!({"tools": {}}));
        assert_eq!(result["serverInfo"]["name"], "palaryn-mcp-bridge");
        assert_eq!(result["serverInfo"]["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(result["instructions"], "Fetch things safely");

        // initialize does not transition
        assert!(!session.is_initialized());
        assert_eq!(session.client().unwrap().info.unwrap().name, "test-client");
    }

    #[tokio::test]
    async fn initialize_tolerates_garbage_params() {
        let (router, _) = router(true);
        let resp = router
            .handle_request(&Session::new(), request("initialize", Some(json!([1, 2]))))
            .await;
        assert_eq!(resp.result.unwrap()["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn ping_works_in_every_state() {
        let (router, _) = router(true);
        let session = Session::new();
        let resp = router.handle_request(&session, request("ping", None)).await;
        assert_eq!(resp.result, Some(json!({})));
    }

    // ── Lifecycle ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn strict_mode_rejects_tools_before_initialized() {
        let (router, _) = router(true);
        let session = Session::new();

        let resp = router.handle_request(&session, request("tools/list", None)).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, rpc_codes::NOT_INITIALIZED);
        assert_eq!(err.message, "Server not initialized");

        router.handle_notification(&session, &notification("notifications/initialized"));
        assert!(session.is_initialized());
        let resp = router.handle_request(&session, request("tools/list", None)).await;
        assert!(resp.result.is_some());
    }

    #[tokio::test]
    async fn permissive_mode_serves_tools_before_initialized() {
        let (router, _) = router(false);
        let resp = router
            .handle_request(&Session::new(), request("tools/list", None))
            .await;
        assert_eq!(resp.result.unwrap()["tools"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn unknown_notifications_are_ignored() {
        let (router, _) = router(false);
        let session = Session::new();
        router.handle_notification(&session, &notification("notifications/whatever"));
        router.handle_notification(&session, &notification("notifications/cancelled"));
        assert!(!session.is_initialized());
    }

    // ── Dispatch errors ───────────────────────────────────────────────

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let (router, _) = router(false);
        let resp = router
            .handle_request(&Session::new(), request("resources/list", None))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, rpc_codes::METHOD_NOT_FOUND);
        assert_eq!(err.message, "Method not found: resources/list");
        assert_eq!(resp.id, RequestId::from(1));
    }

    #[tokio::test]
    async fn tools_call_without_name_is_invalid_params() {
        let (router, gateway) = router(false);
        let session = Session::new();
        for params in [None, Some(json!({})), Some(json!({"name": 5}))] {
            let resp = router.handle_request(&session, request("tools/call", params)).await;
            assert_eq!(resp.error.unwrap().code, rpc_codes::INVALID_PARAMS);
        }
        assert!(gateway.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_error_response() {
        let (router, gateway) = router(false);
        let resp = router
            .handle_request(
                &Session::new(),
                request("tools/call", Some(json!({"name": "nonexistent_tool", "arguments": {}}))),
            )
            .await;
        assert!(resp.result.is_none());
        let err = resp.error.unwrap();
        assert_eq!(err.code, rpc_codes::INVALID_PARAMS);
        assert_eq!(err.message, "Tool not found: nonexistent_tool");
        assert!(gateway.calls.lock().is_empty());
    }

    // ── Delegation ────────────────────────────────────────────────────

    #[tokio::test]
    async fn tools_call_delegates_to_gateway() {
        let (router, gateway) = router(false);
        let resp = router
            .handle_request(
                &Session::new(),
                request(
                    "tools/call",
                    Some(json!({
                        "name": "http_post",
                        "arguments": "{\"url\":\"https://example.test/post\",\"body\":\"x\"}"
                    })),
                ),
            )
            .await;

        let result = resp.result.unwrap();
        assert_eq!(result["content"][0]["text"], "POST https://example.test/post");
        assert_eq!(result["isError"], false);

        let calls = gateway.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "http_post");
    }

    #[tokio::test]
    async fn missing_url_still_reaches_gateway() {
        let (router, gateway) = router(false);
        router
            .handle_request(
                &Session::new(),
                request("tools/call", Some(json!({"name": "http_get"}))),
            )
            .await;
        let calls = gateway.calls.lock();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1.url.is_none());
    }
}
