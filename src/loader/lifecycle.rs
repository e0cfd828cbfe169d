use super::ComponentFactory;
use crate::config::{CameraConfig, CrowdwatchConfig};
use crate::detector::Detector;
use crate::error::StartError;
use crate::events::{LoadStatus, MonitorEvent, Publisher};
use crate::source::FrameGrabber;
use crate::tracking::ExperimentTracker;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub const TOTAL_STEPS: u32 = 5;

pub const READY_MESSAGE: &str = "All AI models loaded - ready to monitor!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderState {
    Unloaded,
    Loading,
    Loaded,
    /// Last load failed; the next request retries
    Failed,
}

/// Components produced by a successful load
#[derive(Clone)]
pub struct LoadedModels {
    pub grabber: Arc<tokio::sync::Mutex<FrameGrabber>>,
    pub person: Arc<dyn Detector>,
    pub face: Arc<dyn Detector>,
}

pub enum LoadOutcome {
    Ready(LoadedModels),
    /// Another caller holds the init lock
    InProgress,
}

/// Loads detectors and the frame source once, on demand.
pub struct ModelLoader {
    factory: Arc<dyn ComponentFactory>,
    camera: CameraConfig,
    publisher: Arc<dyn Publisher>,
    tracker: Option<Arc<ExperimentTracker>>,
    tracking_params: BTreeMap<String, serde_json::Value>,
    state: Mutex<LoaderState>,
    models: RwLock<Option<LoadedModels>>,
    last_error: RwLock<Option<String>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl ModelLoader {
    pub fn new(
        factory: Arc<dyn ComponentFactory>,
        camera: CameraConfig,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            factory,
            camera,
            publisher,
            tracker: None,
            tracking_params: BTreeMap::new(),
            state: Mutex::new(LoaderState::Unloaded),
            models: RwLock::new(None),
            last_error: RwLock::new(None),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Record each successful load with `tracker`
    pub fn with_tracker(mut self, tracker: ExperimentTracker, config: &CrowdwatchConfig) -> Self {
        let detection = &config.detection;
        let params = [
            ("detector_backend", serde_json::json!(detection.backend)),
            ("person_model", serde_json::json!(detection.person_model)),
            ("face_model", serde_json::json!(detection.face_model)),
            ("input_size", serde_json::json!(detection.input_size)),
            ("person_confidence", serde_json::json!(detection.person_confidence)),
            ("face_confidence", serde_json::json!(detection.face_confidence)),
            ("iou_threshold", serde_json::json!(detection.iou_threshold)),
            ("analytics_mode", serde_json::json!(config.analytics.mode)),
            ("camera_source", serde_json::json!(config.camera.source)),
        ];
        self.tracking_params = params
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        self.tracker = Some(Arc::new(tracker));
        self
    }

    pub fn state(&self) -> LoaderState {
        *self.state.lock()
    }

    pub fn models(&self) -> Option<LoadedModels> {
        self.models.read().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.models.read().is_some()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Factory used for per-request components such as video file sources
    pub fn factory(&self) -> Arc<dyn ComponentFactory> {
        Arc::clone(&self.factory)
    }

    /// Load everything unless already loaded.
    ///
    /// Never blocks behind a concurrent load; that caller gets `InProgress`.
    pub async fn ensure_loaded(&self) -> Result<LoadOutcome, StartError> {
        if let Some(models) = self.models() {
            return Ok(LoadOutcome::Ready(models));
        }

        let Ok(_guard) = self.init_lock.try_lock() else {
            return Ok(LoadOutcome::InProgress);
        };

        if let Some(models) = self.models() {
            return Ok(LoadOutcome::Ready(models));
        }

        *self.state.lock() = LoaderState::Loading;
        self.publisher.publish(MonitorEvent::SystemStatus {
            status: LoadStatus::Loading,
            message: "Loading AI models...".to_string(),
        });

        let started = Instant::now();
        match self.run_steps().await {
            Ok(models) => {
                *self.models.write() = Some(models.clone());
                *self.last_error.write() = None;
                *self.state.lock() = LoaderState::Loaded;

                self.publisher.publish(MonitorEvent::SystemStatus {
                    status: LoadStatus::Ready,
                    message: READY_MESSAGE.to_string(),
                });
                self.record_load(started.elapsed().as_secs_f64() * 1000.0);

                Ok(LoadOutcome::Ready(models))
            }
            Err(reason) => {
                *self.last_error.write() = Some(reason.clone());
                *self.state.lock() = LoaderState::Failed;

                self.publisher.publish(MonitorEvent::SystemStatus {
                    status: LoadStatus::Error,
                    message: format!("Model loading failed: {}", reason),
                });

                Err(StartError::ModelLoadFailed(reason))
            }
        }
    }

    /// Start a load in the background
    pub fn preload(self: &Arc<Self>) -> JoinHandle<()> {
        let loader = Arc::clone(self);
        tokio::spawn(async move {
            match loader.ensure_loaded().await {
                Ok(LoadOutcome::Ready(_)) => info!("Models preloaded"),
                Ok(LoadOutcome::InProgress) => info!("Model load already in progress"),
                Err(e) => error!("Preload failed: {}", e),
            }
        })
    }

    async fn run_steps(&self) -> Result<LoadedModels, String> {
        let factory = Arc::clone(&self.factory);
        let resources = blocking(move || factory.resolve_resources().map_err(|e| e.to_string())).await?;
        info!("Resolved {} model resource(s)", resources.len());
        self.progress(1, "Resolving model resources...");

        let factory = Arc::clone(&self.factory);
        let source = blocking(move || factory.frame_source().map_err(|e| e.to_string())).await?;
        let grabber = FrameGrabber::new(source, self.camera.clone());
        self.progress(2, "Initializing camera system...");

        let factory = Arc::clone(&self.factory);
        let person = blocking(move || factory.person_detector().map_err(|e| e.to_string())).await?;
        self.progress(3, "Loading person detection model...");

        let factory = Arc::clone(&self.factory);
        let face = blocking(move || factory.face_detector().map_err(|e| e.to_string())).await?;
        self.progress(4, "Loading face detection model...");

        self.progress(5, "All AI models loaded successfully!");

        Ok(LoadedModels {
            grabber: Arc::new(tokio::sync::Mutex::new(grabber)),
            person,
            face,
        })
    }

    fn progress(&self, step: u32, message: &str) {
        let progress = step * 100 / TOTAL_STEPS;
        info!("Loading progress: {}% - {}", progress, message);
        self.publisher.publish(MonitorEvent::LoadingProgress {
            step,
            total: TOTAL_STEPS,
            progress,
            message: message.to_string(),
        });
    }

    fn record_load(&self, duration_ms: f64) {
        let Some(tracker) = &self.tracker else {
            return;
        };
        let mut metrics = BTreeMap::new();
        metrics.insert("load_duration_ms".to_string(), duration_ms);
        tracker.spawn_record(self.tracking_params.clone(), metrics);
    }
}

async fn blocking<T, F>(work: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| format!("loader task failed: {}", e))?
}
