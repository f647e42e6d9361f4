//! Cache overlay behaviour on the local backend.

use std::time::Duration;

use binsight_cache::{CacheBackend, CacheConfig, CacheService};
use binsight_core::models::{BinState, BinStatusSnapshot};
use serde_json::{Value, json};

fn overlay() -> CacheService {
    CacheService::new(CacheBackend::new_local(), CacheConfig::default())
}

#[tokio::test]
async fn rate_limit_counts_then_resets_after_window() {
    let cache = overlay();
    let window = Duration::from_millis(200);

    for expected in 1..=5 {
        assert_eq!(cache.increment_rate_limit("rl:10.0.0.1", window).await, expected);
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(cache.increment_rate_limit("rl:10.0.0.1", window).await, 1);
    assert_eq!(cache.increment_rate_limit("rl:10.0.0.2", window).await, 1);
}

#[tokio::test]
async fn status_round_trip_and_expiry() {
    let cache = overlay();
    let snapshot = BinStatusSnapshot {
        bin_id: "bin-1".into(),
        fill_level: 73,
        state: BinState::Active,
        last_detection: None,
        detection_confidence: Some(0.91),
        battery_level: Some(3.9),
    };

    assert!(
        cache
            .cache_status("bin-1", &snapshot, Some(Duration::from_millis(100)))
            .await
    );
    assert_eq!(
        cache.get_cached_status::<BinStatusSnapshot>("bin-1").await,
        Some(snapshot)
    );

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(cache.get_cached_status::<BinStatusSnapshot>("bin-1").await, None);
}

#[tokio::test]
async fn critical_scan_uses_strict_threshold() {
    let cache = overlay();
    cache.cache_status("bin-1", &json!({"fill_level": 90}), None).await;
    cache.cache_status("bin-2", &json!({"fill_level": 50}), None).await;

    assert_eq!(cache.list_critical_entities(None).await, vec!["bin-1"]);

    cache.cache_status("bin-3", &json!({"fillLevel": 80}), None).await;
    cache.cache_status("bin-0", &json!({"fillLevel": 81}), None).await;
    cache.cache_status("bin-4", &json!({"state": "offline"}), None).await;
    assert_eq!(cache.list_critical_entities(None).await, vec!["bin-0", "bin-1"]);
    assert_eq!(
        cache.list_critical_entities(Some(40.0)).await,
        vec!["bin-0", "bin-1", "bin-2", "bin-3"]
    );
}

#[tokio::test]
async fn clearing_an_unknown_entity_is_a_no_op() {
    let cache = overlay();
    cache.cache_status("bin-1", &json!({"fill_level": 10}), None).await;

    cache.clear_entity_cache("bin-404").await;
    cache.clear_entity_cache("bin-404").await;

    assert!(cache.get_cached_status::<Value>("bin-1").await.is_some());
}

#[tokio::test]
async fn clear_removes_status_detection_and_messages() {
    let cache = overlay();
    cache.cache_status("bin-1", &json!({"fill_level": 10}), None).await;
    cache.cache_detection("bin-1", &json!({"objects": ["can"]}), None).await;
    cache
        .cache_message("waste_bins/bin-1/fill", &json!({"level": 10}), None)
        .await;
    cache
        .cache_message("waste_bins/bin-2/fill", &json!({"level": 20}), None)
        .await;

    cache.clear_entity_cache("bin-1").await;

    assert!(cache.get_cached_status::<Value>("bin-1").await.is_none());
    assert!(cache.get_cached_detection::<Value>("bin-1").await.is_none());
    assert!(cache.get_recent_messages("bin-1", 10).await.is_empty());
    assert_eq!(cache.get_recent_messages("bin-2", 10).await.len(), 1);
}

#[tokio::test]
async fn recent_messages_respect_limit_and_escape_ids() {
    let cache = overlay();
    for sensor in ["battery", "fill", "temperature"] {
        cache
            .cache_message(
                &format!("waste_bins/bin-1/{sensor}"),
                &json!({"sensor": sensor}),
                None,
            )
            .await;
    }
    cache
        .cache_message("waste_bins/bin-10/fill", &json!({"sensor": "other"}), None)
        .await;

    let messages = cache.get_recent_messages("bin-1", 2).await;
    assert_eq!(
        messages,
        vec![json!({"sensor": "battery"}), json!({"sensor": "fill"})]
    );

    assert!(cache.get_recent_messages("bin-*", 10).await.is_empty());
}

#[tokio::test]
async fn analytics_and_detection_round_trip() {
    let cache = overlay();
    let daily = json!({"collections": 12, "avg_fill": 64.5});
    assert!(cache.cache_analytics("daily", &daily, None).await);
    assert_eq!(cache.get_cached_analytics::<Value>("daily").await, Some(daily));
    assert_eq!(cache.get_cached_analytics::<Value>("weekly").await, None);

    assert!(cache.cache_detection("bin-1", &json!({"confidence": 0.8}), None).await);
    assert_eq!(
        cache.get_cached_detection::<Value>("bin-1").await,
        Some(json!({"confidence": 0.8}))
    );
    assert!(cache.is_backend_available().await);
}

#[tokio::test]
async fn explicit_ttls_override_configured_defaults() {
    let cache = overlay();
    let short = Some(Duration::from_millis(100));

    assert!(cache.cache_message("waste_bins/bin-5/fill", &json!({"level": 5}), short).await);
    assert!(cache.cache_analytics("hourly", &json!({"count": 3}), short).await);
    assert!(cache.cache_detection("bin-5", &json!({"objects": []}), short).await);
    assert!(cache.track_connection("conn-5", "user-5", short).await);

    assert!(cache.cache_analytics("daily", &json!({"count": 9}), None).await);
    assert!(cache.track_connection("conn-6", "user-6", None).await);

    assert_eq!(cache.get_recent_messages("bin-5", 10).await.len(), 1);
    assert!(cache.get_cached_analytics::<Value>("hourly").await.is_some());
    assert!(cache.get_cached_detection::<Value>("bin-5").await.is_some());
    assert_eq!(cache.get_connection_owner("conn-5").await.as_deref(), Some("user-5"));

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(cache.get_recent_messages("bin-5", 10).await.is_empty());
    assert_eq!(cache.get_cached_analytics::<Value>("hourly").await, None);
    assert_eq!(cache.get_cached_detection::<Value>("bin-5").await, None);
    assert_eq!(cache.get_connection_owner("conn-5").await, None);
    assert!(!cache.untrack_connection("conn-5").await);

    assert!(cache.get_cached_analytics::<Value>("daily").await.is_some());
    assert_eq!(cache.get_connection_owner("conn-6").await.as_deref(), Some("user-6"));
}
