//! Security layer for the fetch gateway.
//!
//! Input sanitization, SSRF protection, request policies, rate limiting
//! and DLP scanning of fetched content.

pub mod dlp;
pub mod policy;
pub mod rate_limit;
pub mod sanitize;
pub mod ssrf;

use serde::{Deserialize, Serialize};

pub use dlp::{DlpAction, DlpConfig, DlpFinding, DlpReport, DlpScanner};
pub use policy::{Decision, PolicyAction, PolicyConfig, PolicyVerdict, RequestPolicy};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use ssrf::{SsrfConfig, SsrfGuard, SsrfViolation};

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Reject null bytes and strip control characters from request inputs
    pub sanitize_input: bool,
    /// SSRF protection
    pub ssrf: SsrfConfig,
    /// Request policy
    pub policy: PolicyConfig,
    /// DLP scanning of responses
    pub dlp: DlpConfig,
    /// Outbound rate limit
    pub rate_limit: RateLimitConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            sanitize_input: true,
            ssrf: SsrfConfig::default(),
            policy: PolicyConfig::default(),
            dlp: DlpConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
