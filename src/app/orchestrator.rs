use super::types::{ComponentState, ShutdownReason};
use crate::analytics::Analytics;
use crate::config::CrowdwatchConfig;
use crate::enhance::filter_from_config;
use crate::error::Result;
use crate::events::{EventBus, Publisher};
use crate::loader::{ComponentFactory, ModelLoader, StandardFactory};
use crate::media::{MediaProcessor, UploadStore};
use crate::monitor::CrowdMonitor;
use crate::streaming::StreamServer;
use crate::tracking::ExperimentTracker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle state per component, shared with the tasks that drive them
#[derive(Debug, Clone, Default)]
pub(super) struct ComponentStates(Arc<Mutex<HashMap<&'static str, ComponentState>>>);

impl ComponentStates {
    pub(super) async fn set(&self, component: &'static str, state: ComponentState) {
        let previous = self.0.lock().await.insert(component, state.clone());
        if previous.as_ref() != Some(&state) {
            debug!("Component '{}': {:?} -> {:?}", component, previous, state);
        }
    }

    /// Overwrite only components already registered
    pub(super) async fn update(&self, component: &'static str, state: ComponentState) {
        if let Some(current) = self.0.lock().await.get_mut(component) {
            debug!("Component '{}': {:?} -> {:?}", component, current, state);
            *current = state;
        }
    }

    async fn get(&self, component: &str) -> Option<ComponentState> {
        self.0.lock().await.get(component).cloned()
    }

    async fn all(&self) -> HashMap<String, ComponentState> {
        self.0
            .lock()
            .await
            .iter()
            .map(|(name, state)| (name.to_string(), state.clone()))
            .collect()
    }
}

/// Wires the monitor, media processor and server together and owns their lifecycle
pub struct CrowdwatchApp {
    pub(super) config: CrowdwatchConfig,
    pub(super) event_bus: EventBus,
    pub(super) loader: Arc<ModelLoader>,
    pub(super) monitor: Arc<CrowdMonitor>,
    pub(super) media: Arc<MediaProcessor>,
    pub(super) stream_server: Option<StreamServer>,
    pub(super) server_handle: Option<JoinHandle<Result<()>>>,

    // Lifecycle management
    pub(super) components: ComponentStates,
    pub(super) shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl CrowdwatchApp {
    /// Build the application with detectors and camera from the configuration
    pub fn new(config: CrowdwatchConfig) -> Result<Self> {
        let factory = Arc::new(StandardFactory::new(config.clone()));
        Self::with_factory(config, factory)
    }

    /// Build the application around a custom component factory
    pub fn with_factory(config: CrowdwatchConfig, factory: Arc<dyn ComponentFactory>) -> Result<Self> {
        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let publisher: Arc<dyn Publisher> = Arc::new(event_bus.clone());

        let mut loader = ModelLoader::new(factory, config.camera.clone(), Arc::clone(&publisher));
        if let Some(tracker) = ExperimentTracker::from_config(&config.tracking) {
            info!("Recording model runs under {}", tracker.experiment_dir().display());
            loader = loader.with_tracker(tracker, &config);
        }
        let loader = Arc::new(loader);

        let analytics = Arc::new(Analytics::new(config.analytics.clone()));
        let filter = filter_from_config(&config.enhancement);

        let monitor = Arc::new(
            CrowdMonitor::builder()
                .config(config.monitor.clone())
                .loader(Arc::clone(&loader))
                .analytics(Arc::clone(&analytics))
                .filter(filter.clone())
                .publisher(Arc::clone(&publisher))
                .build()?,
        );

        let media = Arc::new(MediaProcessor::new(
            config.media.clone(),
            config.camera.clone(),
            Arc::clone(&loader),
            analytics,
            filter,
            publisher,
        ));

        let stream_server = StreamServer::builder()
            .config(config.stream.clone())
            .monitor(Arc::clone(&monitor))
            .media(Arc::clone(&media))
            .uploads(UploadStore::from_config(&config.media))
            .event_bus(event_bus.clone())
            .build()?;

        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        Ok(Self {
            config,
            event_bus,
            loader,
            monitor,
            media,
            stream_server: Some(stream_server),
            server_handle: None,
            components: ComponentStates::default(),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &CrowdwatchConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn loader(&self) -> &Arc<ModelLoader> {
        &self.loader
    }

    pub fn monitor(&self) -> &Arc<CrowdMonitor> {
        &self.monitor
    }

    pub fn media(&self) -> &Arc<MediaProcessor> {
        &self.media
    }

    /// State of `component`: "models", "monitor" or "streaming"
    pub async fn component_state(&self, component: &str) -> Option<ComponentState> {
        self.components.get(component).await
    }

    pub async fn component_states(&self) -> HashMap<String, ComponentState> {
        self.components.all().await
    }

    /// Ask a running [`CrowdwatchApp::run`] to shut down
    pub async fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        match self.shutdown_sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
