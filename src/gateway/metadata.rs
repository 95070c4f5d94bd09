//! Gateway metadata attached to every tool result.
//!
//! Block 0 of a result is the fetched body (or a denial message); block 1
//! is [`METADATA_MARKER`] followed by the metadata as pretty-printed JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::{Content, ToolsCallResult};
use crate::security::{DlpReport, PolicyVerdict};

/// First line of the metadata content block
pub const METADATA_MARKER: &str = "--- Gateway Metadata ---";

/// Overall outcome of a tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataStatus {
    /// Upstream responded (any HTTP status)
    Ok,
    /// Refused by the security layer
    Blocked,
    /// Invalid input or upstream failure
    Error,
}

/// Per-call audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMetadata {
    /// Unique id for log correlation
    pub request_id: String,
    /// Outcome
    pub status: MetadataStatus,
    /// Tool that issued the request
    pub tool: String,
    /// HTTP method
    pub method: String,
    /// Requested URL (null if none was given)
    pub url: Option<String>,
    /// Last URL requested, when redirects were followed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    /// Upstream HTTP status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Upstream Content-Type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Body bytes returned to the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_bytes: Option<usize>,
    /// Whether the body was cut at the size limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    /// Hex SHA-256 of the body as received
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_sha256: Option<String>,
    /// Security decision
    pub policy: PolicyVerdict,
    /// DLP scan result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dlp: Option<DlpReport>,
    /// Wall-clock time spent in the gateway
    pub duration_ms: u64,
    /// When the call started
    pub timestamp: DateTime<Utc>,
}

impl GatewayMetadata {
    /// Fresh record for a call; response fields are filled in as the
    /// pipeline progresses.
    pub fn new(tool: &str, method: &str, url: Option<&str>, policy: PolicyVerdict) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            status: MetadataStatus::Ok,
            tool: tool.to_string(),
            method: method.to_string(),
            url: url.map(str::to_string),
            final_url: None,
            http_status: None,
            content_type: None,
            body_bytes: None,
            truncated: None,
            body_sha256: None,
            policy,
            dlp: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }
}

/// Build the two-block tool result. `isError` is set for every outcome
/// other than [`MetadataStatus::Ok`].
#[must_use]
pub fn render_result(text: String, metadata: &GatewayMetadata) -> ToolsCallResult {
    let json = serde_json::to_string_pretty(metadata)
        .unwrap_or_else(|e| format!("{{\"error\": \"metadata serialization failed: {e}\"}}"));
    ToolsCallResult {
        content: vec![
            Content::text(text),
            Content::text(format!("{METADATA_MARKER}\n{json}")),
        ],
        is_error: metadata.status != MetadataStatus::Ok,
    }
}

/// Recover the metadata from a rendered result.
#[must_use]
pub fn parse_metadata(result: &ToolsCallResult) -> Option<GatewayMetadata> {
    let block = result.text(1)?;
    let json = block.strip_prefix(METADATA_MARKER)?.trim_start_matches('\n');
    serde_json::from_str(json).ok()
}
