//! Waste-bin domain models.
//!
//! - [`relational`]: rows persisted in PostgreSQL tables.
//! - [`document`]: bin and device state persisted in document collections.
//! - [`status`]: the status snapshot served from the cache overlay.

pub mod document;
pub mod relational;
pub mod status;

use serde::{Deserialize, Serialize};

pub use document::{Bin, BinLocation, BinMetadata, BinStatus, DetectionRecord, SensorReading};
pub use relational::{AlertLog, BinAnalytics, Collection, CollectionRoute, SystemMetric, User};
pub use status::BinStatusSnapshot;

/// Access role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Supervisor,
    #[default]
    Operator,
    Viewer,
}

/// Waste category reported by the detection pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WasteType {
    Organic,
    Plastic,
    Glass,
    Metal,
    Mixed,
}

/// Operational state of a bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BinState {
    #[default]
    Active,
    Collected,
    Maintenance,
    Offline,
}

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Lifecycle of a planned collection route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    #[default]
    Planned,
    InProgress,
    Completed,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Supervisor => write!(f, "supervisor"),
            Self::Operator => write!(f, "operator"),
            Self::Viewer => write!(f, "viewer"),
        }
    }
}
