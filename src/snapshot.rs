use crate::analytics::CrowdAnalysis;
use crate::detector::Detection;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemStatus {
    #[serde(rename = "Ready")]
    Ready,
    #[serde(rename = "Monitoring Active")]
    MonitoringActive,
    #[serde(rename = "Processing Video")]
    ProcessingVideo,
    #[serde(rename = "Image Processed")]
    ImageProcessed,
}

/// Aggregate crowd state pushed to subscribers. Always replaced as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub person_count: usize,
    pub face_count: usize,
    pub crowd_density: String,
    pub alert_level: String,
    pub last_activity: String,
    pub system_status: SystemStatus,
    pub timestamp: DateTime<Utc>,
    pub person_detections: Vec<Detection>,
    pub face_detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<CrowdAnalysis>,
}

/// Holder for the current snapshot. The lock only guards a pointer swap, so
/// readers observe either the old or the new snapshot in full.
#[derive(Debug)]
pub struct SnapshotCell {
    current: RwLock<Arc<StatsSnapshot>>,
}

impl SnapshotCell {
    pub fn new(initial: StatsSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn load(&self) -> Arc<StatsSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn store(&self, snapshot: StatsSnapshot) -> Arc<StatsSnapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write() = Arc::clone(&snapshot);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::Analytics;

    #[test]
    fn test_store_replaces_whole_snapshot() {
        let analytics = Analytics::default();
        let cell = SnapshotCell::new(analytics.idle_snapshot("System ready"));
        let before = cell.load();

        let mut next = analytics.idle_snapshot("busy");
        next.person_count = 7;
        next.crowd_density = "HIGH".to_string();
        cell.store(next);

        assert_eq!(before.person_count, 0);
        assert_eq!(before.last_activity, "System ready");
        let after = cell.load();
        assert_eq!(after.person_count, 7);
        assert_eq!(after.crowd_density, "HIGH");
    }

    #[test]
    fn test_status_serializes_with_display_names() {
        let json = serde_json::to_string(&SystemStatus::MonitoringActive).unwrap();
        assert_eq!(json, "\"Monitoring Active\"");
        let snapshot = Analytics::default().idle_snapshot("idle");
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["system_status"], "Ready");
        assert!(value.get("analysis").is_none());
    }
}
