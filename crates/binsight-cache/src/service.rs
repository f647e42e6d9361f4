//! The cache overlay used by ingestion and the API layer.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::backend::CacheBackend;
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::keys;

/// Default window of [`CacheService::increment_rate_limit`].
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// TTL-scoped cache over one shared [`CacheBackend`].
///
/// Every operation is fail-open: backend and decoding failures are logged,
/// counted in `cache_backend_errors_total{op}` and reported as a miss, an
/// empty result, `false` or `0`. Nothing here returns an error.
#[derive(Debug, Clone)]
pub struct CacheService {
    backend: CacheBackend,
    config: CacheConfig,
}

fn record_backend_error(op: &'static str, key: &str, err: &CacheError) {
    warn!(op, key = %key, error = %err, "Cache backend error");
    metrics::counter!("cache_backend_errors_total", "op" => op).increment(1);
}

/// Turns a backend failure into `None` after recording it.
fn absorb<T>(op: &'static str, key: &str, result: CacheResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            record_backend_error(op, key, &err);
            None
        }
    }
}

fn record_lookup(hit: bool) {
    if hit {
        metrics::counter!("cache_hits_total").increment(1);
    } else {
        metrics::counter!("cache_misses_total").increment(1);
    }
}

/// Reads the fill level of a cached status; missing or non-numeric counts as 0.
fn fill_level(status: &Value) -> f64 {
    status
        .get("fill_level")
        .or_else(|| status.get("fillLevel"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

impl CacheService {
    pub fn new(backend: CacheBackend, config: CacheConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &CacheBackend {
        &self.backend
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    async fn put<T: Serialize + ?Sized>(
        &self,
        op: &'static str,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> bool {
        let result = match serde_json::to_string(value) {
            Ok(text) => self.backend.set_ex(key, text, ttl).await,
            Err(e) => Err(CacheError::from(e)),
        };
        let stored = absorb(op, key, result).is_some();
        if stored {
            debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached value");
        }
        stored
    }

    async fn fetch<T: DeserializeOwned>(&self, op: &'static str, key: &str) -> Option<T> {
        let text = absorb(op, key, self.backend.get(key).await).flatten();
        let value = text.and_then(|text| match serde_json::from_str(&text) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                None
            }
        });
        record_lookup(value.is_some());
        value
    }

    /// Caches a status snapshot under `bin:status:{entity_id}`.
    ///
    /// `ttl` defaults to `cache.status_ttl_secs`.
    pub async fn cache_status<T: Serialize + ?Sized>(
        &self,
        entity_id: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.config.status_ttl());
        self.put("cache_status", &keys::status_key(entity_id), value, ttl)
            .await
    }

    pub async fn get_cached_status<T: DeserializeOwned>(&self, entity_id: &str) -> Option<T> {
        self.fetch("get_cached_status", &keys::status_key(entity_id))
            .await
    }

    /// Caches the latest message of `topic`.
    ///
    /// `ttl` defaults to `cache.message_ttl_secs`.
    pub async fn cache_message<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.config.message_ttl());
        self.put("cache_message", &keys::message_key(topic), value, ttl)
            .await
    }

    /// Returns up to `limit` cached messages of topics under
    /// `{message_topic_root}/{entity_id}/`, in topic order.
    pub async fn get_recent_messages(&self, entity_id: &str, limit: usize) -> Vec<Value> {
        const OP: &str = "get_recent_messages";
        if limit == 0 {
            return Vec::new();
        }
        let pattern = keys::entity_messages_pattern(&self.config.message_topic_root, entity_id);
        let Some(mut found) = absorb(OP, &pattern, self.backend.keys(&pattern).await) else {
            return Vec::new();
        };
        found.sort();
        found.truncate(limit);

        let values = absorb(OP, &pattern, self.backend.mget(&found).await).unwrap_or_default();
        values
            .into_iter()
            .flatten()
            .filter_map(|text| serde_json::from_str(&text).ok())
            .collect()
    }

    pub async fn cache_analytics<T: Serialize + ?Sized>(
        &self,
        kind: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.config.analytics_ttl());
        self.put("cache_analytics", &keys::analytics_key(kind), value, ttl)
            .await
    }

    pub async fn get_cached_analytics<T: DeserializeOwned>(&self, kind: &str) -> Option<T> {
        self.fetch("get_cached_analytics", &keys::analytics_key(kind))
            .await
    }

    pub async fn cache_detection<T: Serialize + ?Sized>(
        &self,
        entity_id: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.config.detection_ttl());
        self.put("cache_detection", &keys::detection_key(entity_id), value, ttl)
            .await
    }

    pub async fn get_cached_detection<T: DeserializeOwned>(&self, entity_id: &str) -> Option<T> {
        self.fetch("get_cached_detection", &keys::detection_key(entity_id))
            .await
    }

    /// Fixed-window counter: increments `key` and starts its `window` on the
    /// first hit.
    ///
    /// Returns the count in the current window, or 0 if the backend failed.
    /// If the process dies between the increment and the expiry, the key
    /// keeps counting without a window.
    pub async fn increment_rate_limit(&self, key: &str, window: Duration) -> u64 {
        const OP: &str = "increment_rate_limit";
        let Some(count) = absorb(OP, key, self.backend.incr(key).await) else {
            return 0;
        };
        if count == 1 {
            absorb(OP, key, self.backend.expire(key, window).await);
        }
        u64::try_from(count).unwrap_or(0)
    }

    /// Removes the status, detection and message entries of an entity.
    pub async fn clear_entity_cache(&self, entity_id: &str) {
        const OP: &str = "clear_entity_cache";
        let mut doomed = vec![keys::status_key(entity_id), keys::detection_key(entity_id)];
        let pattern = keys::entity_messages_pattern(&self.config.message_topic_root, entity_id);
        if let Some(messages) = absorb(OP, &pattern, self.backend.keys(&pattern).await) {
            doomed.extend(messages);
        }
        if let Some(removed) = absorb(OP, entity_id, self.backend.del(&doomed).await) {
            info!(entity_id = %entity_id, removed, "Cleared entity cache");
        }
    }

    /// Scans every cached status and returns the ids whose fill level
    /// (`fill_level` or `fillLevel`) is strictly above `threshold`, sorted.
    ///
    /// `threshold` defaults to `cache.critical_fill_threshold`. The scan is
    /// linear in the number of cached statuses.
    pub async fn list_critical_entities(&self, threshold: Option<f64>) -> Vec<String> {
        const OP: &str = "list_critical_entities";
        let threshold =
            threshold.unwrap_or_else(|| f64::from(self.config.critical_fill_threshold));
        let pattern = keys::status_pattern();
        let Some(found) = absorb(OP, &pattern, self.backend.keys(&pattern).await) else {
            return Vec::new();
        };
        let Some(values) = absorb(OP, &pattern, self.backend.mget(&found).await) else {
            return Vec::new();
        };

        let mut critical: Vec<String> = found
            .iter()
            .zip(values)
            .filter_map(|(key, text)| {
                let status: Value = serde_json::from_str(&text?).ok()?;
                (fill_level(&status) > threshold)
                    .then(|| key.strip_prefix(keys::STATUS_PREFIX).map(str::to_string))
                    .flatten()
            })
            .collect();
        critical.sort();
        critical
    }

    /// Records that `conn_id` belongs to `identity_id`. An identity may own
    /// any number of connections.
    ///
    /// `ttl` defaults to `cache.connection_ttl_secs`.
    pub async fn track_connection(
        &self,
        conn_id: &str,
        identity_id: &str,
        ttl: Option<Duration>,
    ) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.config.connection_ttl());
        self.put("track_connection", &keys::connection_key(conn_id), identity_id, ttl)
            .await
    }

    pub async fn untrack_connection(&self, conn_id: &str) -> bool {
        let key = keys::connection_key(conn_id);
        absorb("untrack_connection", &key, self.backend.del(&[key.clone()]).await)
            .is_some_and(|removed| removed > 0)
    }

    /// Returns the identity owning `conn_id`, if tracked.
    pub async fn get_connection_owner(&self, conn_id: &str) -> Option<String> {
        self.fetch("get_connection_owner", &keys::connection_key(conn_id))
            .await
    }

    /// Returns true if the backend is reachable.
    pub async fn is_backend_available(&self) -> bool {
        self.backend.is_available().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service() -> CacheService {
        CacheService::new(CacheBackend::new_local(), CacheConfig::default())
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let cache = service();
        let status = json!({"bin_id": "bin-1", "fill_level": 42});
        assert!(cache.cache_status("bin-1", &status, None).await);
        assert_eq!(cache.get_cached_status::<Value>("bin-1").await, Some(status));
        assert_eq!(cache.get_cached_status::<Value>("bin-2").await, None);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_a_miss() {
        let cache = service();
        cache
            .backend()
            .set_ex("analytics:daily", "{not json".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_cached_analytics::<Value>("daily").await, None);
    }

    #[test]
    fn test_fill_level_alias_and_missing() {
        assert_eq!(fill_level(&json!({"fillLevel": 91})), 91.0);
        assert_eq!(fill_level(&json!({"fill_level": 55.5})), 55.5);
        assert_eq!(fill_level(&json!({"state": "active"})), 0.0);
        assert_eq!(fill_level(&json!({"fill_level": "90"})), 0.0);
    }

    #[tokio::test]
    async fn test_connection_tracking() {
        let cache = service();
        assert!(cache.track_connection("c1", "user-7", None).await);
        assert!(cache.track_connection("c2", "user-7", None).await);
        assert_eq!(cache.get_connection_owner("c1").await.as_deref(), Some("user-7"));
        assert_eq!(cache.get_connection_owner("c2").await.as_deref(), Some("user-7"));

        assert!(cache.untrack_connection("c1").await);
        assert!(!cache.untrack_connection("c1").await);
        assert_eq!(cache.get_connection_owner("c1").await, None);
    }

    #[tokio::test]
    async fn test_zero_limit_returns_nothing() {
        let cache = service();
        cache.cache_message("waste_bins/bin-1/fill", &json!({"level": 1}), None).await;
        assert!(cache.get_recent_messages("bin-1", 0).await.is_empty());
    }
}
