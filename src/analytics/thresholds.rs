use serde::{Deserialize, Serialize};

/// One qualitative bucket. `max` is the inclusive upper bound; the last tier
/// of a table has no bound and absorbs everything above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub score: f64,
}

impl Tier {
    pub fn bounded<S: Into<String>>(label: S, max: f64, score: f64) -> Self {
        Self {
            label: label.into(),
            max: Some(max),
            score,
        }
    }

    pub fn overflow<S: Into<String>>(label: S, score: f64) -> Self {
        Self {
            label: label.into(),
            max: None,
            score,
        }
    }
}

/// Ordered tier table mapping a numeric value to a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable {
    tiers: Vec<Tier>,
}

impl ThresholdTable {
    pub fn new(tiers: Vec<Tier>) -> Result<Self, String> {
        let table = Self { tiers };
        table.validate()?;
        Ok(table)
    }

    /// `0 -> EMPTY, <=2 -> LOW, <=5 -> MEDIUM, else HIGH`
    pub fn default_density() -> Self {
        Self {
            tiers: vec![
                Tier::bounded("EMPTY", 0.0, 0.0),
                Tier::bounded("LOW", 2.0, 0.2),
                Tier::bounded("MEDIUM", 5.0, 0.5),
                Tier::overflow("HIGH", 0.8),
            ],
        }
    }

    /// Finer density split used for retail analysis. Scores double as the
    /// congestion score.
    pub fn retail_density() -> Self {
        Self {
            tiers: vec![
                Tier::bounded("EMPTY", 0.0, 0.0),
                Tier::bounded("LOW", 2.0, 0.2),
                Tier::bounded("MEDIUM", 5.0, 0.5),
                Tier::bounded("HIGH", 10.0, 0.8),
                Tier::overflow("VERY_HIGH", 1.0),
            ],
        }
    }

    /// `<=3 -> NORMAL, <=6 -> CAUTION, else ALERT`
    pub fn default_alert() -> Self {
        Self {
            tiers: vec![
                Tier::bounded("NORMAL", 3.0, 0.0),
                Tier::bounded("CAUTION", 6.0, 0.5),
                Tier::overflow("ALERT", 1.0),
            ],
        }
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// Index of the tier `value` falls into. Higher index means a higher tier.
    pub fn rank(&self, value: f64) -> usize {
        self.tiers
            .iter()
            .position(|tier| match tier.max {
                Some(max) => value <= max,
                None => true,
            })
            .unwrap_or_else(|| self.tiers.len().saturating_sub(1))
    }

    pub fn classify(&self, value: f64) -> Option<&Tier> {
        self.tiers.get(self.rank(value))
    }

    pub fn label(&self, value: f64) -> &str {
        self.classify(value)
            .map(|tier| tier.label.as_str())
            .unwrap_or("UNKNOWN")
    }

    pub fn score(&self, value: f64) -> f64 {
        self.classify(value).map(|tier| tier.score).unwrap_or(0.0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tiers.is_empty() {
            return Err("table must contain at least one tier".to_string());
        }

        let mut previous: Option<f64> = None;
        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.label.trim().is_empty() {
                return Err(format!("tier {} has an empty label", index));
            }
            if self.tiers[..index].iter().any(|t| t.label == tier.label) {
                return Err(format!("duplicate tier label '{}'", tier.label));
            }

            let is_last = index + 1 == self.tiers.len();
            match tier.max {
                None if !is_last => {
                    return Err(format!(
                        "only the last tier may omit its bound ('{}')",
                        tier.label
                    ));
                }
                Some(max) => {
                    if !max.is_finite() {
                        return Err(format!("tier '{}' has a non-finite bound", tier.label));
                    }
                    if let Some(prev) = previous {
                        if max <= prev {
                            return Err(format!(
                                "tier bounds must strictly increase ('{}' has {} after {})",
                                tier.label, max, prev
                            ));
                        }
                    }
                    previous = Some(max);
                }
                None => {}
            }
        }

        Ok(())
    }
}
