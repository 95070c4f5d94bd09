//! Fetch gateway: the boundary between the MCP server and the network.
//!
//! The server hands every tool call to a [`FetchGateway`]. The production
//! implementation is [`HttpGateway`]; tests inject their own.

mod http;
mod metadata;

use async_trait::async_trait;
use serde_json::Value;

use crate::protocol::ToolsCallResult;

pub use self::http::HttpGateway;
pub use self::metadata::{
    GatewayMetadata, METADATA_MARKER, MetadataStatus, parse_metadata, render_result,
};

/// Outbound request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Sent as-is
    Text(String),
    /// Serialized and sent as `application/json`
    Json(Value),
}

/// Method-specific description of an outbound request, built from tool
/// arguments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    /// Upper-case HTTP method
    pub method: String,
    /// Target URL; `None` when the caller did not supply one
    pub url: Option<String>,
    /// Extra request headers, in argument order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<RequestBody>,
    /// First argument problem found while building the request
    pub invalid_argument: Option<String>,
}

/// Executes tool calls on behalf of the server.
///
/// Infallible by contract: denials and failures are expressed in the
/// returned result (`isError: true` plus metadata), never as an `Err`.
#[async_trait]
pub trait FetchGateway: Send + Sync {
    /// Run one tool call
    async fn invoke(&self, tool_name: &str, request: FetchRequest) -> ToolsCallResult;
}
