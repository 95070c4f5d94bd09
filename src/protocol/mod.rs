//! MCP Protocol types (version 2025-03-26)

mod messages;
mod types;

pub use messages::*;
pub use types::*;

/// MCP Protocol version announced in every `initialize` response
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// Protocol versions clients are known to request from this server.
///
/// The server always answers with [`PROTOCOL_VERSION`]; anything outside
/// this list is only logged.
pub const KNOWN_CLIENT_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];
