//! Repository laws checked against the in-memory backend.

use binsight_core::field_map;
use binsight_core::models::{AlertLog, AlertSeverity, Bin, DetectionRecord};
use binsight_db_memory::MemoryStore;
use binsight_storage::{DocumentFilter, Page, SortKey};
use serde_json::json;

fn alert(bin_id: &str, severity: &str) -> binsight_core::FieldMap {
    field_map(json!({
        "bin_id": bin_id,
        "alert_type": "critical_fill",
        "severity": severity,
        "message": format!("{bin_id} is nearly full")
    }))
    .unwrap()
}

#[tokio::test]
async fn create_then_get_returns_the_same_record() {
    let store = MemoryStore::new();
    let alerts = store.relational::<AlertLog>();

    let created = alerts.create(alert("bin-1", "high")).await.unwrap();
    let read = alerts.get_by_id(created.id).await.unwrap().unwrap();

    assert_eq!(read, created);
    assert_eq!(read.severity, AlertSeverity::High);
    assert!(!read.acknowledged);
}

#[tokio::test]
async fn partial_update_changes_only_supplied_columns() {
    let store = MemoryStore::new();
    let alerts = store.relational::<AlertLog>();
    let created = alerts.create(alert("bin-1", "low")).await.unwrap();

    let updated = alerts
        .update(
            created.id,
            field_map(json!({"acknowledged": true, "acknowledged_by": 4})).unwrap(),
        )
        .await
        .unwrap()
        .unwrap();

    assert!(updated.acknowledged);
    assert_eq!(updated.acknowledged_by, Some(4));
    assert_eq!(updated.message, created.message);
    assert_eq!(updated.severity, created.severity);
    assert_eq!(updated.created_at, created.created_at);

    let unchanged = alerts
        .update(created.id, Default::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(unchanged, updated);

    assert!(alerts.update(999, Default::default()).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_is_idempotent() {
    let store = MemoryStore::new();
    let alerts = store.relational::<AlertLog>();
    let created = alerts.create(alert("bin-1", "low")).await.unwrap();

    assert!(alerts.delete(created.id).await.unwrap());
    assert!(!alerts.delete(created.id).await.unwrap());
    assert!(alerts.get_by_id(created.id).await.unwrap().is_none());
}

#[tokio::test]
async fn filtered_pages_do_not_overlap() {
    let store = MemoryStore::new();
    let alerts = store.relational::<AlertLog>();
    for i in 0..7 {
        let severity = if i % 2 == 0 { "critical" } else { "low" };
        alerts
            .create(alert(&format!("bin-{i}"), severity))
            .await
            .unwrap();
    }

    let filters = field_map(json!({"severity": "critical"})).unwrap();
    let first = alerts.get_many(Page::new(0, 2), &filters).await.unwrap();
    let second = alerts.get_many(Page::new(2, 2), &filters).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert!(first.iter().chain(&second).all(|a| a.severity == AlertSeverity::Critical));
    assert!(first.last().unwrap().id < second[0].id);

    let all = alerts.get_many(Page::unbounded(), &filters).await.unwrap();
    assert_eq!(all.len(), 4);

    let unacknowledged = field_map(json!({"acknowledged_by": null})).unwrap();
    assert_eq!(
        alerts
            .get_many(Page::unbounded(), &unacknowledged)
            .await
            .unwrap()
            .len(),
        7
    );
}

#[tokio::test]
async fn documents_round_trip_and_query() {
    let store = MemoryStore::new();
    let detections = store.documents::<DetectionRecord>();

    for (bin, level) in [("bin-1", 30), ("bin-1", 88), ("bin-2", 91)] {
        detections
            .create(
                field_map(json!({
                    "bin_id": bin,
                    "fill_level": level,
                    "confidence": 0.9,
                    "objects_detected": ["bottle"]
                }))
                .unwrap(),
            )
            .await
            .unwrap();
    }

    let filter = DocumentFilter::parse(&json!({
        "bin_id": "bin-1",
        "objects_detected": "bottle"
    }))
    .unwrap();
    let latest = detections
        .find_many(&filter, Page::new(0, 1), &[SortKey::desc("fill_level")])
        .await
        .unwrap();
    assert_eq!(latest[0].fill_level, 88);
    assert_eq!(detections.count(Some(&filter)).await.unwrap(), 2);

    let bins = store.documents::<Bin>();
    assert!(bins.find_one(&DocumentFilter::all()).await.unwrap().is_none());
}
