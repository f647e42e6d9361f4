use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Bin, BinState};

/// Compact bin status cached under `bin:status:{bin_id}`.
///
/// The critical-bin scan reads `fill_level` from this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinStatusSnapshot {
    pub bin_id: String,
    pub fill_level: u8,
    pub state: BinState,
    pub last_detection: Option<DateTime<Utc>>,
    pub detection_confidence: Option<f64>,
    pub battery_level: Option<f64>,
}

impl From<&Bin> for BinStatusSnapshot {
    fn from(bin: &Bin) -> Self {
        Self {
            bin_id: bin.bin_id.clone(),
            fill_level: bin.status.fill_level,
            state: bin.status.state,
            last_detection: bin.status.last_detection,
            detection_confidence: bin.status.detection_confidence,
            battery_level: bin.metadata.battery_level,
        }
    }
}

impl BinStatusSnapshot {
    /// Returns true if the fill level is strictly above `threshold`.
    pub fn is_critical(&self, threshold: u8) -> bool {
        self.fill_level > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_from_bin() {
        let bin: Bin = serde_json::from_value(json!({
            "_id": "x",
            "bin_id": "bin-9",
            "status": {"fill_level": 81, "state": "active"},
            "metadata": {"battery_level": 3.7}
        }))
        .unwrap();

        let snapshot = BinStatusSnapshot::from(&bin);
        assert_eq!(snapshot.bin_id, "bin-9");
        assert_eq!(snapshot.battery_level, Some(3.7));
        assert!(snapshot.is_critical(80));
        assert!(!snapshot.is_critical(81));
    }
}
