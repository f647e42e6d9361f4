//! Relational models.
//!
//! Serde names equal column names; optional columns are `Option`s and
//! columns with a database default carry a matching `#[serde(default)]` so
//! that every backend fills them the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AlertSeverity, Role, RouteStatus, WasteType};
use crate::record::{Record, RecordId};

fn default_true() -> bool {
    true
}

fn default_one() -> i32 {
    1
}

fn default_capacity() -> i32 {
    100
}

/// A system user (operator, supervisor, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: RecordId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Record for User {
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "username",
        "email",
        "password_hash",
        "role",
        "is_active",
        "created_at",
        "updated_at",
    ];
    const UNIQUE: &'static [&'static str] = &["username", "email"];
    const TOUCH_ON_UPDATE: Option<&'static str> = Some("updated_at");

    fn id(&self) -> RecordId {
        self.id
    }
}

/// One fill-level observation of a bin, kept for analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinAnalytics {
    pub id: RecordId,
    pub bin_id: String,
    pub fill_level: i32,
    #[serde(default = "default_one")]
    pub detection_count: i32,
    #[serde(default)]
    pub collection_count: i32,
    pub detected_at: DateTime<Utc>,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
    #[serde(default)]
    pub waste_type: Option<WasteType>,
    pub confidence: f64,
    #[serde(default)]
    pub location_address: Option<String>,
}

impl Record for BinAnalytics {
    const TABLE: &'static str = "bin_analytics";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "bin_id",
        "fill_level",
        "detection_count",
        "collection_count",
        "detected_at",
        "coordinates",
        "waste_type",
        "confidence",
        "location_address",
    ];

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A bin emptying performed by an operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: RecordId,
    pub bin_id: String,
    pub operator_id: RecordId,
    pub collection_time: DateTime<Utc>,
    pub fill_before: i32,
    #[serde(default = "default_capacity")]
    pub estimated_capacity: i32,
    #[serde(default)]
    pub route_optimized: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Record for Collection {
    const TABLE: &'static str = "collections";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "bin_id",
        "operator_id",
        "collection_time",
        "fill_before",
        "estimated_capacity",
        "route_optimized",
        "notes",
        "created_at",
    ];

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A planned sequence of bins to collect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionRoute {
    pub id: RecordId,
    pub route_name: String,
    pub operator_id: RecordId,
    pub bin_ids: Vec<String>,
    pub planned_time: DateTime<Utc>,
    #[serde(default)]
    pub actual_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: RouteStatus,
    #[serde(default)]
    pub efficiency_score: Option<f64>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Record for CollectionRoute {
    const TABLE: &'static str = "collection_routes";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "route_name",
        "operator_id",
        "bin_ids",
        "planned_time",
        "actual_time",
        "status",
        "efficiency_score",
        "created_at",
    ];

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A sampled system metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetric {
    pub id: RecordId,
    pub metric_type: String,
    pub metric_value: f64,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

impl Record for SystemMetric {
    const TABLE: &'static str = "system_metrics";
    const COLUMNS: &'static [&'static str] =
        &["id", "metric_type", "metric_value", "metadata", "recorded_at"];

    fn id(&self) -> RecordId {
        self.id
    }
}

/// An alert raised for a bin (critical fill, offline, low battery, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertLog {
    pub id: RecordId,
    pub bin_id: String,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub acknowledged_by: Option<RecordId>,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Record for AlertLog {
    const TABLE: &'static str = "alert_logs";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "bin_id",
        "alert_type",
        "severity",
        "message",
        "acknowledged",
        "acknowledged_by",
        "acknowledged_at",
        "resolved_at",
        "created_at",
    ];

    fn id(&self) -> RecordId {
        self.id
    }
}
