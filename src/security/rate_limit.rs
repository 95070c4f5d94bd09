//! Outbound request rate limiting

use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota};
use serde::{Deserialize, Serialize};

/// Rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,
    /// Sustained requests per second
    pub requests_per_second: u32,
    /// Burst size
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            requests_per_second: 10,
            burst_size: 20,
        }
    }
}

/// Rate limiter shared by every tool call on a server
pub struct RateLimiter {
    inner: Option<DefaultDirectRateLimiter>,
}

impl RateLimiter {
    /// Create a new rate limiter. A disabled config yields a limiter that
    /// always grants.
    #[must_use]
    pub fn new(config: &RateLimitConfig) -> Self {
        let inner = config.enabled.then(|| {
            let quota = Quota::per_second(NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN))
                .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN));
            DefaultDirectRateLimiter::direct(quota)
        });
        Self { inner }
    }

    /// Try to acquire a permit
    pub fn try_acquire(&self) -> bool {
        self.inner.as_ref().is_none_or(|limiter| limiter.check().is_ok())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("enabled", &self.inner.is_some())
            .finish()
    }
}
