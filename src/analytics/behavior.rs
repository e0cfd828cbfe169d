use super::metrics::{alert_level, engagement_level, Engagement};
use crate::config::AnalyticsConfig;
use crate::detector::Detection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorFlag {
    NoCustomers,
    ModerateTraffic,
    BusyPeriod,
    Overcrowded,
    CloseInteractions,
    GroupFormation,
    HighEngagement,
    LowVisibility,
    HighTrafficFlow,
    CustomerBrowsing,
    AttentionRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlowPattern {
    /// More people near the frame edges than in the centre
    Transitional,
    Stationary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Retail/security reading of a single frame's detections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrowdAnalysis {
    pub density: String,
    pub congestion_score: f64,
    pub alert_level: String,
    pub behavior_flags: Vec<BehaviorFlag>,
    pub engagement_level: Engagement,
    pub flow_pattern: FlowPattern,
    pub occupancy_rate: f64,
    pub close_interactions: usize,
    pub risk_level: RiskLevel,
    pub attention_needed: bool,
}

pub fn analyze_behavior(
    persons: &[Detection],
    faces: &[Detection],
    frame_size: (u32, u32),
    config: &AnalyticsConfig,
) -> CrowdAnalysis {
    let (width, height) = (frame_size.0.max(1) as f64, frame_size.1.max(1) as f64);
    let total = persons.len();
    let mut flags = Vec::new();

    let table = &config.retail_density;
    let density = table.label(total as f64).to_string();
    let congestion_score = table.score(total as f64);
    if let Some(flag) = density_flag(&density) {
        flags.push(flag);
    }

    let close_interactions = count_close_pairs(persons, width.min(height), config.proximity_ratio);
    if close_interactions > 0 {
        flags.push(BehaviorFlag::CloseInteractions);
        if close_interactions >= total / 2 {
            flags.push(BehaviorFlag::GroupFormation);
        }
    }

    let engagement = engagement_level(total, faces.len());
    if total > 0 {
        match engagement {
            Engagement::High => flags.push(BehaviorFlag::HighEngagement),
            Engagement::Low => flags.push(BehaviorFlag::LowVisibility),
            Engagement::Medium => {}
        }
    }

    let flow_pattern = flow_pattern(persons, width, height, config.edge_margin);
    flags.push(match flow_pattern {
        FlowPattern::Transitional => BehaviorFlag::HighTrafficFlow,
        FlowPattern::Stationary => BehaviorFlag::CustomerBrowsing,
    });

    let covered: f64 = persons.iter().map(|p| p.area() as f64).sum();
    let occupancy_rate = (covered / (width * height)).min(1.0);

    let mut risk_score = 0.0;
    if congestion_score > 0.8 {
        risk_score += 0.3;
    }
    if close_interactions as f64 > total as f64 * 0.5 {
        risk_score += 0.2;
    }
    if engagement == Engagement::Low && total > 3 {
        risk_score += 0.2;
    }
    let risk_level = if risk_score > 0.6 {
        flags.push(BehaviorFlag::AttentionRequired);
        RiskLevel::High
    } else if risk_score > 0.3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    CrowdAnalysis {
        density,
        congestion_score: round3(congestion_score),
        alert_level: alert_level(total, faces.len(), config.face_weight, &config.alert).to_string(),
        behavior_flags: flags,
        engagement_level: engagement,
        flow_pattern,
        occupancy_rate: round3(occupancy_rate),
        close_interactions,
        risk_level,
        attention_needed: risk_level != RiskLevel::Low,
    }
}

fn density_flag(label: &str) -> Option<BehaviorFlag> {
    match label {
        "EMPTY" => Some(BehaviorFlag::NoCustomers),
        "MEDIUM" => Some(BehaviorFlag::ModerateTraffic),
        "HIGH" => Some(BehaviorFlag::BusyPeriod),
        "VERY_HIGH" => Some(BehaviorFlag::Overcrowded),
        _ => None,
    }
}

fn count_close_pairs(persons: &[Detection], reference: f64, ratio: f64) -> usize {
    let centers: Vec<(f64, f64)> = persons.iter().map(Detection::center).collect();
    let mut close = 0;
    for (i, a) in centers.iter().enumerate() {
        for b in &centers[i + 1..] {
            let distance = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
            if distance / reference < ratio {
                close += 1;
            }
        }
    }
    close
}

fn flow_pattern(persons: &[Detection], width: f64, height: f64, margin: f64) -> FlowPattern {
    let (low_x, high_x) = (width * margin, width * (1.0 - margin));
    let (low_y, high_y) = (height * margin, height * (1.0 - margin));

    let edge = persons
        .iter()
        .map(Detection::center)
        .filter(|(x, y)| *x < low_x || *x > high_x || *y < low_y || *y > high_y)
        .count();

    if edge > persons.len() - edge {
        FlowPattern::Transitional
    } else {
        FlowPattern::Stationary
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
