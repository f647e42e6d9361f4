//! Rate-limit decisions on top of [`CacheService::increment_rate_limit`].
//!
//! The counter reports 0 when the backend fails. [`RateLimitPolicy`] turns
//! that into an explicit allow or deny instead of leaving it to callers.

use std::time::Duration;

use tracing::warn;

use crate::config::RateLimitConfig;
use crate::service::{CacheService, DEFAULT_RATE_WINDOW};

/// What to do when the counter cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Allow,
    Deny,
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// The request may proceed.
    pub allowed: bool,
    /// The caller is above the steady limit but within the burst allowance.
    pub throttled: bool,
    /// Requests counted in the current window; 0 if the backend failed.
    pub count: u64,
    /// Steady limit per window.
    pub limit: u64,
}

impl RateDecision {
    /// Requests left before throttling starts.
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }
}

/// Fixed-window limit: `limit` requests per `window`, hard cap at `burst`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u64,
    pub burst: u64,
    pub window: Duration,
    pub on_backend_failure: FailureMode,
}

impl RateLimitPolicy {
    /// `limit` requests per minute with no burst allowance, failing open.
    pub fn per_minute(limit: u64) -> Self {
        Self {
            limit,
            burst: limit,
            window: DEFAULT_RATE_WINDOW,
            on_backend_failure: FailureMode::Allow,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            limit: config.per_minute,
            burst: config.burst.max(config.per_minute),
            window: DEFAULT_RATE_WINDOW,
            on_backend_failure: if config.fail_open {
                FailureMode::Allow
            } else {
                FailureMode::Deny
            },
        }
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.on_backend_failure = mode;
        self
    }

    /// Counts one request for `key` and decides whether it may proceed.
    pub async fn check(&self, cache: &CacheService, key: &str) -> RateDecision {
        let count = cache.increment_rate_limit(key, self.window).await;
        if count == 0 {
            let allowed = self.on_backend_failure == FailureMode::Allow;
            warn!(key = %key, allowed, "Rate limit counter unavailable");
            return RateDecision {
                allowed,
                throttled: false,
                count,
                limit: self.limit,
            };
        }
        RateDecision {
            allowed: count <= self.burst,
            throttled: count > self.limit,
            count,
            limit: self.limit,
        }
    }
}
