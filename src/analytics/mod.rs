mod behavior;
mod metrics;
mod thresholds;

pub use behavior::{analyze_behavior, BehaviorFlag, CrowdAnalysis, FlowPattern, RiskLevel};
pub use metrics::{
    activity_description, alert_level, alert_score, density, engagement_level, Engagement,
};
pub use thresholds::{ThresholdTable, Tier};

use crate::config::AnalyticsConfig;
use crate::detector::Detection;
use crate::snapshot::{StatsSnapshot, SystemStatus};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Which analytics flavour feeds the snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsMode {
    /// Density, alert level and activity only
    #[default]
    Basic,
    /// Adds the behaviour analysis block with the finer density table
    Retail,
}

/// Turns detector output into the snapshot shown to clients
#[derive(Debug, Clone)]
pub struct Analytics {
    config: AnalyticsConfig,
}

impl Analytics {
    pub fn new(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn density_table(&self) -> &ThresholdTable {
        match self.config.mode {
            AnalyticsMode::Basic => &self.config.density,
            AnalyticsMode::Retail => &self.config.retail_density,
        }
    }

    pub fn summarize(
        &self,
        person_detections: Vec<Detection>,
        face_detections: Vec<Detection>,
        frame_size: (u32, u32),
        system_status: SystemStatus,
    ) -> StatsSnapshot {
        let person_count = person_detections.len();
        let face_count = face_detections.len();

        let analysis = match self.config.mode {
            AnalyticsMode::Basic => None,
            AnalyticsMode::Retail => Some(analyze_behavior(
                &person_detections,
                &face_detections,
                frame_size,
                &self.config,
            )),
        };

        StatsSnapshot {
            person_count,
            face_count,
            crowd_density: density(person_count, self.density_table()).to_string(),
            alert_level: alert_level(
                person_count,
                face_count,
                self.config.face_weight,
                &self.config.alert,
            )
            .to_string(),
            last_activity: activity_description(person_count, face_count),
            system_status,
            timestamp: Utc::now(),
            person_detections,
            face_detections,
            analysis,
        }
    }

    /// Zeroed snapshot: nobody in view, lowest tiers, `Ready`.
    pub fn idle_snapshot<S: Into<String>>(&self, message: S) -> StatsSnapshot {
        StatsSnapshot {
            person_count: 0,
            face_count: 0,
            crowd_density: density(0, self.density_table()).to_string(),
            alert_level: alert_level(0, 0, self.config.face_weight, &self.config.alert)
                .to_string(),
            last_activity: message.into(),
            system_status: SystemStatus::Ready,
            timestamp: Utc::now(),
            person_detections: Vec::new(),
            face_detections: Vec::new(),
            analysis: None,
        }
    }
}

impl Default for Analytics {
    fn default() -> Self {
        Self::new(AnalyticsConfig::default())
    }
}
