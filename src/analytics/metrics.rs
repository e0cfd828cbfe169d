use super::thresholds::ThresholdTable;
use serde::{Deserialize, Serialize};

/// How well faces are visible relative to the people in view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Engagement {
    Low,
    Medium,
    High,
}

pub fn density(person_count: usize, table: &ThresholdTable) -> &str {
    table.label(person_count as f64)
}

pub fn alert_score(person_count: usize, face_count: usize, face_weight: f64) -> f64 {
    person_count as f64 + face_weight * face_count as f64
}

pub fn alert_level(
    person_count: usize,
    face_count: usize,
    face_weight: f64,
    table: &ThresholdTable,
) -> &str {
    table.label(alert_score(person_count, face_count, face_weight))
}

pub fn activity_description(person_count: usize, face_count: usize) -> String {
    match (person_count, face_count) {
        (0, 0) => "No detections - area appears empty".to_string(),
        (0, faces) => format!("{} face(s) detected - partial person visibility", faces),
        (people, 0) => format!("{} person(s) detected - faces not clearly visible", people),
        (people, faces) => format!(
            "{} person(s), {} face(s) detected - good visibility",
            people, faces
        ),
    }
}

/// Face-to-person ratio: `>= 0.8` high, `>= 0.5` medium, else low.
pub fn engagement_level(person_count: usize, face_count: usize) -> Engagement {
    if person_count == 0 {
        return Engagement::Low;
    }

    let ratio = face_count as f64 / person_count as f64;
    if ratio >= 0.8 {
        Engagement::High
    } else if ratio >= 0.5 {
        Engagement::Medium
    } else {
        Engagement::Low
    }
}
