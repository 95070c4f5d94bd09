//! Palaryn MCP bridge
//!
//! An MCP server on stdio exposing three HTTP tools (`http_get`,
//! `http_post`, `http_request`). Every call passes through a fetch gateway
//! that validates and sanitizes input, applies rate limits and request
//! policies, blocks SSRF targets, and scans responses for sensitive data
//! before they reach the model.
//!
//! # Protocol Version
//!
//! Answers every `initialize` with MCP protocol version 2025-03-26.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod security;
pub mod server;
pub mod tools;
pub mod transport;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Name reported in `serverInfo`
pub const SERVER_NAME: &str = "palaryn-mcp-bridge";

/// Setup tracing/logging.
///
/// Logs always go to stderr: stdout carries the JSON-RPC stream.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
            .try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
