//! Error types for the Palaryn MCP server

use std::io;

use thiserror::Error;

/// Result type alias for the Palaryn MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// Palaryn MCP server errors
///
/// Gateway denials (SSRF, policy, DLP) are not errors: they are reported
/// inside a successful `tools/call` result. Everything here is either a
/// protocol-level failure answered with a JSON-RPC `error` object, or a
/// startup failure.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not a valid JSON-RPC request object
    #[error("Invalid Request: {0}")]
    InvalidRequest(String),

    /// Unknown JSON-RPC method
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    /// Malformed or missing method parameters
    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// `tools/call` named a tool that is not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool methods called before the handshake completed (strict mode only)
    #[error("Server not initialized")]
    NotInitialized,

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        match self {
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => rpc_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => rpc_codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) | Self::ToolNotFound(_) => rpc_codes::INVALID_PARAMS,
            Self::NotInitialized => rpc_codes::NOT_INITIALIZED,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}

/// Standard JSON-RPC error codes
pub mod rpc_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - Not a valid Request object
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server not initialized (implementation-defined server error range)
    pub const NOT_INITIALIZED: i32 = -32002;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_errors_map_to_standard_codes() {
        assert_eq!(
            Error::MethodNotFound("x".into()).to_rpc_code(),
            rpc_codes::METHOD_NOT_FOUND
        );
        assert_eq!(
            Error::InvalidRequest("x".into()).to_rpc_code(),
            rpc_codes::INVALID_REQUEST
        );
        assert_eq!(
            Error::InvalidParams("x".into()).to_rpc_code(),
            rpc_codes::INVALID_PARAMS
        );
    }

    #[test]
    fn unknown_tool_is_an_invalid_params_error() {
        let err = Error::ToolNotFound("http_delete".into());
        assert_eq!(err.to_rpc_code(), -32602);
        assert_eq!(err.to_string(), "Tool not found: http_delete");
    }

    #[test]
    fn not_initialized_uses_server_error_range() {
        assert_eq!(Error::NotInitialized.to_rpc_code(), -32002);
    }

    #[test]
    fn everything_else_is_internal() {
        assert_eq!(Error::Internal("boom".into()).to_rpc_code(), -32603);
        assert_eq!(Error::Transport("closed".into()).to_rpc_code(), -32603);
        assert_eq!(Error::Config("bad".into()).to_rpc_code(), -32603);
    }
}
