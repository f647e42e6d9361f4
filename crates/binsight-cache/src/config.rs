//! Configuration for the cache backend, the overlay and rate limiting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Use Redis. When false (or unreachable) the local backend is used.
    #[serde(default)]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379/0")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Wait/create/recycle timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    2000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

/// TTLs and thresholds of the cache overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub status_ttl_secs: u64,
    pub message_ttl_secs: u64,
    pub analytics_ttl_secs: u64,
    pub detection_ttl_secs: u64,
    pub connection_ttl_secs: u64,
    /// Fill level (percent) above which a bin is critical.
    pub critical_fill_threshold: u8,
    /// First topic segment of per-bin message topics.
    pub message_topic_root: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            status_ttl_secs: 3600,
            message_ttl_secs: 300,
            analytics_ttl_secs: 1800,
            detection_ttl_secs: 900,
            connection_ttl_secs: 3600,
            critical_fill_threshold: 80,
            message_topic_root: "waste_bins".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.status_ttl_secs)
    }

    pub fn message_ttl(&self) -> Duration {
        Duration::from_secs(self.message_ttl_secs)
    }

    pub fn analytics_ttl(&self) -> Duration {
        Duration::from_secs(self.analytics_ttl_secs)
    }

    pub fn detection_ttl(&self) -> Duration {
        Duration::from_secs(self.detection_ttl_secs)
    }

    pub fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_ttl_secs)
    }
}

/// Request rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests per minute before a caller is throttled.
    pub per_minute: u64,
    /// Requests per minute before a caller is rejected.
    pub burst: u64,
    /// Allow requests when the counter cannot be read.
    pub fail_open: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 100,
            burst: 200,
            fail_open: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cache = CacheConfig::default();
        assert_eq!(cache.status_ttl(), Duration::from_secs(3600));
        assert_eq!(cache.message_ttl(), Duration::from_secs(300));
        assert_eq!(cache.critical_fill_threshold, 80);

        let redis: RedisConfig = serde_json::from_str("{}").unwrap();
        assert!(!redis.enabled);
        assert_eq!(redis.pool_size, 10);

        let limits = RateLimitConfig::default();
        assert!(limits.burst >= limits.per_minute);
    }
}
