//! Document models: bin state, detections and raw sensor readings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BinState;
use crate::record::Document;

/// Where a bin is installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BinLocation {
    #[serde(default)]
    pub address: Option<String>,
    /// `[longitude, latitude]`
    pub coordinates: [f64; 2],
}

/// Latest known fill state of a bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BinStatus {
    /// Percentage in `0..=100`.
    #[serde(default)]
    pub fill_level: u8,
    #[serde(default)]
    pub state: BinState,
    #[serde(default)]
    pub last_detection: Option<DateTime<Utc>>,
    /// Confidence of the last detection in `0.0..=1.0`.
    #[serde(default)]
    pub detection_confidence: Option<f64>,
}

/// Device attached to a bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BinMetadata {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub battery_level: Option<f64>,
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// A monitored bin (collection `bins`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    #[serde(rename = "_id")]
    pub id: String,
    pub bin_id: String,
    #[serde(default)]
    pub location: BinLocation,
    #[serde(default)]
    pub status: BinStatus,
    #[serde(default)]
    pub metadata: BinMetadata,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Document for Bin {
    const COLLECTION: &'static str = "bins";

    fn id(&self) -> &str {
        &self.id
    }
}

/// Output of one image detection run (collection `detections`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub bin_id: String,
    pub fill_level: u8,
    pub confidence: f64,
    #[serde(default)]
    pub objects_detected: Vec<String>,
    #[serde(default)]
    pub bounding_boxes: Vec<Value>,
    #[serde(default)]
    pub image_processed: bool,
    #[serde(default = "Utc::now")]
    pub detection_time: DateTime<Utc>,
}

impl Document for DetectionRecord {
    const COLLECTION: &'static str = "detections";

    fn id(&self) -> &str {
        &self.id
    }
}

/// A raw reading reported by a bin's sensor board (collection `sensor_readings`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(rename = "_id")]
    pub id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// Centimetres from the sensor to the waste surface.
    pub ultrasonic_distance: f64,
    pub battery_level: f64,
    #[serde(default)]
    pub wifi_signal: Option<i32>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
}

impl Document for SensorReading {
    const COLLECTION: &'static str = "sensor_readings";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bin_uses_underscore_id() {
        let bin: Bin = serde_json::from_value(json!({
            "_id": "doc-1",
            "bin_id": "bin-1",
            "status": {"fill_level": 42}
        }))
        .unwrap();
        assert_eq!(bin.id(), "doc-1");
        assert_eq!(bin.status.fill_level, 42);
        assert_eq!(bin.status.state, BinState::Active);

        let fields = bin.to_fields().unwrap();
        assert_eq!(fields["_id"], "doc-1");
        assert!(!fields.contains_key("id"));
    }

    #[test]
    fn test_fill_level_out_of_range_rejected() {
        let result = serde_json::from_value::<DetectionRecord>(json!({
            "_id": "d",
            "bin_id": "bin-1",
            "fill_level": 300,
            "confidence": 0.9
        }));
        assert!(result.is_err());
    }
}
