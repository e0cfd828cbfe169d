use crate::config::TrackingConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const RUN_FILE: &str = "run.json";

/// One tracked run: the parameters a model load used and what it measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub experiment: String,
    pub model_name: String,
    pub model_version: String,
    pub recorded_at: DateTime<Utc>,
    pub params: BTreeMap<String, serde_json::Value>,
    pub metrics: BTreeMap<String, f64>,
}

/// Writes run records as JSON under `<dir>/<experiment>/<run_id>/run.json`
#[derive(Debug, Clone)]
pub struct ExperimentTracker {
    config: TrackingConfig,
}

impl ExperimentTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self { config }
    }

    /// `None` when tracking is switched off
    pub fn from_config(config: &TrackingConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(config.clone()))
    }

    pub fn experiment_dir(&self) -> PathBuf {
        Path::new(&self.config.dir).join(&self.config.experiment_name)
    }

    pub fn record(
        &self,
        params: BTreeMap<String, serde_json::Value>,
        metrics: BTreeMap<String, f64>,
    ) -> Result<PathBuf> {
        let record = RunRecord {
            run_id: Uuid::new_v4(),
            experiment: self.config.experiment_name.clone(),
            model_name: self.config.model_name.clone(),
            model_version: self.config.model_version.clone(),
            recorded_at: Utc::now(),
            params,
            metrics,
        };

        let run_dir = self.experiment_dir().join(record.run_id.to_string());
        std::fs::create_dir_all(&run_dir)?;

        let path = run_dir.join(RUN_FILE);
        std::fs::write(&path, serde_json::to_vec_pretty(&record)?)?;

        info!(
            "Recorded run {} for {} v{}",
            record.run_id, record.model_name, record.model_version
        );
        Ok(path)
    }

    /// Record in the background; failures are only logged
    pub fn spawn_record(
        self: &Arc<Self>,
        params: BTreeMap<String, serde_json::Value>,
        metrics: BTreeMap<String, f64>,
    ) {
        let tracker = Arc::clone(self);
        tokio::task::spawn_blocking(move || match tracker.record(params, metrics) {
            Ok(path) => debug!("Run record written to {}", path.display()),
            Err(e) => warn!("Failed to write run record: {}", e),
        });
    }
}
