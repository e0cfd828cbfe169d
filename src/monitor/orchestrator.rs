use super::processing::ProcessingLoop;
use super::state::{LoopMetrics, LoopMetricsSnapshot, ModeCell, RunMode};
use crate::analytics::Analytics;
use crate::config::MonitorConfig;
use crate::enhance::SharedFilter;
use crate::error::{CameraError, CrowdwatchError, Result, StartError};
use crate::events::{MonitorEvent, Publisher};
use crate::loader::{LoadOutcome, ModelLoader};
use crate::snapshot::{SnapshotCell, StatsSnapshot};
use crate::source::FrameGrabber;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const STARTED_MESSAGE: &str = "Monitoring started - AI detection active";
pub const STOPPED_MESSAGE: &str = "Monitoring stopped";
pub const NOT_MONITORING_MESSAGE: &str = "Not monitoring";

/// Result of a start or stop request as shown to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
}

impl ControlResponse {
    pub fn ok<S: Into<String>>(message: S) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed<S: Into<String>>(message: S) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

struct Session {
    token: CancellationToken,
    handle: JoinHandle<()>,
    grabber: Arc<tokio::sync::Mutex<FrameGrabber>>,
}

/// Rolls an unfinished start back to IDLE.
///
/// A start future dropped mid-way (a client hanging up on the HTTP request)
/// still releases the source it opened. The mode only returns to IDLE once
/// the close has run, so a retry cannot race it for the device.
struct StartGuard {
    mode: Arc<ModeCell>,
    grabber: Option<Arc<tokio::sync::Mutex<FrameGrabber>>>,
    settled: bool,
}

impl StartGuard {
    fn new(mode: Arc<ModeCell>) -> Self {
        Self {
            mode,
            grabber: None,
            settled: false,
        }
    }

    fn track(&mut self, grabber: &Arc<tokio::sync::Mutex<FrameGrabber>>) {
        self.grabber = Some(Arc::clone(grabber));
    }

    /// Start finished; `to` is RUNNING on success or IDLE on a handled failure
    fn settle(mut self, to: RunMode) {
        self.settled = true;
        self.mode.transition(RunMode::Initializing, to);
    }
}

impl Drop for StartGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        let Some(grabber) = self.grabber.take() else {
            warn!("Monitoring start abandoned before the camera was opened");
            self.mode.transition(RunMode::Initializing, RunMode::Idle);
            return;
        };

        warn!("Monitoring start abandoned; releasing the camera");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let mode = Arc::clone(&self.mode);
                runtime.spawn(async move {
                    grabber.lock().await.close().await;
                    mode.transition(RunMode::Initializing, RunMode::Idle);
                    debug!("Abandoned start rolled back");
                });
            }
            Err(_) => {
                error!("No runtime to close the camera of an abandoned start");
                self.mode.transition(RunMode::Initializing, RunMode::Idle);
            }
        }
    }
}

/// Owns the run mode and the processing loop task
pub struct CrowdMonitor {
    config: MonitorConfig,
    loader: Arc<ModelLoader>,
    analytics: Arc<Analytics>,
    filter: Option<SharedFilter>,
    publisher: Arc<dyn Publisher>,
    snapshot: Arc<SnapshotCell>,
    metrics: Arc<LoopMetrics>,
    mode: Arc<ModeCell>,
    session: Mutex<Option<Session>>,
}

impl CrowdMonitor {
    pub fn builder() -> CrowdMonitorBuilder {
        CrowdMonitorBuilder::new()
    }

    pub fn mode(&self) -> RunMode {
        self.mode.get()
    }

    pub fn is_running(&self) -> bool {
        self.mode.get() == RunMode::Running
    }

    /// Latest published statistics
    pub fn current_snapshot(&self) -> Arc<StatsSnapshot> {
        self.snapshot.load()
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    /// Begin monitoring: load models if needed, prepare the camera and spawn the loop.
    pub async fn start(&self) -> std::result::Result<(), StartError> {
        self.mode.claim_start()?;
        let mut guard = StartGuard::new(Arc::clone(&self.mode));

        let initialized = self.initialize(&mut guard).await;
        match initialized {
            Ok(session) => {
                *self.session.lock() = Some(session);
                guard.settle(RunMode::Running);
                info!("Monitoring started");
                Ok(())
            }
            Err(e) => {
                // prepare() already closed anything it opened
                guard.settle(RunMode::Idle);
                warn!("Monitoring start failed: {}", e);
                Err(e)
            }
        }
    }

    async fn initialize(&self, guard: &mut StartGuard) -> std::result::Result<Session, StartError> {
        let models = match self.loader.ensure_loaded().await? {
            LoadOutcome::Ready(models) => models,
            LoadOutcome::InProgress => return Err(StartError::StillInitializing),
        };

        guard.track(&models.grabber);
        {
            let mut grabber = models.grabber.lock().await;
            grabber.prepare().await.map_err(|e| match e {
                CameraError::NoFramesAvailable { .. } => StartError::NoFramesAvailable,
                other => StartError::CameraUnavailable(other.to_string()),
            })?;
        }

        self.metrics.reset();
        let token = CancellationToken::new();
        let worker = ProcessingLoop {
            config: self.config.clone(),
            grabber: Arc::clone(&models.grabber),
            person: Arc::clone(&models.person),
            face: Arc::clone(&models.face),
            analytics: Arc::clone(&self.analytics),
            filter: self.filter.clone(),
            publisher: Arc::clone(&self.publisher),
            snapshot: Arc::clone(&self.snapshot),
            metrics: Arc::clone(&self.metrics),
            token: token.clone(),
        };

        Ok(Session {
            token,
            handle: tokio::spawn(worker.run()),
            grabber: models.grabber,
        })
    }

    /// Stop monitoring. Returns false when nothing was running.
    pub async fn stop(&self) -> bool {
        if !self.mode.transition(RunMode::Running, RunMode::Stopping) {
            debug!("Stop requested while {:?}; nothing to do", self.mode.get());
            return false;
        }

        info!("Stopping monitoring");
        let session = self.session.lock().take();

        if let Some(mut session) = session {
            session.token.cancel();

            match tokio::time::timeout(self.config.stop_timeout(), &mut session.handle).await {
                Ok(Ok(())) => info!("Processing loop stopped gracefully"),
                Ok(Err(e)) => error!("Processing loop ended with error: {}", e),
                Err(_) => {
                    warn!(
                        "Processing loop did not stop within {:?}, aborting",
                        self.config.stop_timeout()
                    );
                    session.handle.abort();
                }
            }

            session.grabber.lock().await.close().await;
        }

        let idle = self
            .snapshot
            .store(self.analytics.idle_snapshot(STOPPED_MESSAGE));
        self.publisher
            .publish(MonitorEvent::DetectionUpdate(idle.as_ref().clone()));

        self.mode.transition(RunMode::Stopping, RunMode::Idle);
        info!("Monitoring stopped");
        true
    }

    /// Start and announce the outcome as a `monitoring_status` event
    pub async fn request_start(&self) -> std::result::Result<(), StartError> {
        let result = self.start().await;
        let message = match &result {
            Ok(()) => STARTED_MESSAGE.to_string(),
            Err(e) => e.to_string(),
        };

        self.publisher.publish(MonitorEvent::MonitoringStatus {
            active: self.is_running(),
            message,
        });
        result
    }

    /// Start and report the outcome to clients
    pub async fn start_monitoring(&self) -> ControlResponse {
        match self.request_start().await {
            Ok(()) => ControlResponse::ok(STARTED_MESSAGE),
            Err(e) => ControlResponse::failed(e.to_string()),
        }
    }

    /// Stop and report the outcome to clients
    pub async fn stop_monitoring(&self) -> ControlResponse {
        let response = if self.stop().await {
            ControlResponse::ok(STOPPED_MESSAGE)
        } else {
            ControlResponse::ok(NOT_MONITORING_MESSAGE)
        };

        self.publisher.publish(MonitorEvent::MonitoringStatus {
            active: false,
            message: response.message.clone(),
        });
        response
    }
}

/// Builder for [`CrowdMonitor`]
pub struct CrowdMonitorBuilder {
    config: Option<MonitorConfig>,
    loader: Option<Arc<ModelLoader>>,
    analytics: Option<Arc<Analytics>>,
    filter: Option<SharedFilter>,
    publisher: Option<Arc<dyn Publisher>>,
    snapshot: Option<Arc<SnapshotCell>>,
}

impl CrowdMonitorBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            loader: None,
            analytics: None,
            filter: None,
            publisher: None,
            snapshot: None,
        }
    }

    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn loader(mut self, loader: Arc<ModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn analytics(mut self, analytics: Arc<Analytics>) -> Self {
        self.analytics = Some(analytics);
        self
    }

    pub fn filter(mut self, filter: Option<SharedFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Share a snapshot cell with other readers; a fresh one is created otherwise
    pub fn snapshot(mut self, snapshot: Arc<SnapshotCell>) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn build(self) -> Result<CrowdMonitor> {
        let loader = self
            .loader
            .ok_or_else(|| CrowdwatchError::system("Model loader must be specified"))?;
        let publisher = self
            .publisher
            .ok_or_else(|| CrowdwatchError::system("Event publisher must be specified"))?;
        let analytics = self.analytics.unwrap_or_default();
        let snapshot = self.snapshot.unwrap_or_else(|| {
            Arc::new(SnapshotCell::new(analytics.idle_snapshot("System ready")))
        });

        Ok(CrowdMonitor {
            config: self.config.unwrap_or_default(),
            loader,
            analytics,
            filter: self.filter,
            publisher,
            snapshot,
            metrics: Arc::new(LoopMetrics::default()),
            mode: Arc::new(ModeCell::new()),
            session: Mutex::new(None),
        })
    }
}

impl Default for CrowdMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
