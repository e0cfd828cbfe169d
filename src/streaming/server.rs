use crate::{
    config::StreamConfig,
    error::{CrowdwatchError, Result, StreamError},
    events::EventBus,
    media::{MediaProcessor, UploadStore},
    monitor::CrowdMonitor,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use super::handlers::{
    dashboard_handler, health_handler, load_models_handler, start_monitoring_handler,
    status_handler, stop_monitoring_handler, upload_image_handler, upload_video_handler,
};
use super::ws::{sse_handler, ws_handler};

/// Multipart framing on top of the raw upload limit
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ServerState {
    pub(crate) monitor: Arc<CrowdMonitor>,
    pub(crate) media: Arc<MediaProcessor>,
    pub(crate) uploads: UploadStore,
    pub(crate) event_bus: EventBus,
}

/// HTTP, WebSocket and SSE front end for the monitor
pub struct StreamServer {
    pub(crate) config: StreamConfig,
    pub(crate) state: ServerState,
}

impl StreamServer {
    /// Create a new server
    pub fn new(
        config: StreamConfig,
        monitor: Arc<CrowdMonitor>,
        media: Arc<MediaProcessor>,
        uploads: UploadStore,
        event_bus: EventBus,
    ) -> Self {
        Self {
            config,
            state: ServerState {
                monitor,
                media,
                uploads,
                event_bus,
            },
        }
    }

    pub fn builder() -> StreamServerBuilder {
        StreamServerBuilder::new()
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.config.ip, self.config.port)
    }

    /// Routes with state attached, ready to serve
    pub fn router(&self) -> Router {
        let body_limit = self.state.uploads.max_bytes().saturating_add(MULTIPART_OVERHEAD);

        let router = Router::new()
            .route("/", get(dashboard_handler))
            .route("/ws", get(ws_handler))
            .route("/events", get(sse_handler))
            .route("/health", get(health_handler))
            .route("/api/status", get(status_handler))
            .route("/api/monitoring/start", post(start_monitoring_handler))
            .route("/api/monitoring/stop", post(stop_monitoring_handler))
            .route("/api/models/load", post(load_models_handler))
            .route("/api/upload/image", post(upload_image_handler))
            .route("/api/upload/video", post(upload_video_handler))
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone());

        match &self.config.static_dir {
            Some(dir) => {
                info!("Serving static files from {}", dir);
                router.fallback_service(ServeDir::new(dir))
            }
            None => router,
        }
    }

    /// Serve until the process ends
    pub async fn start(&self) -> Result<()> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves
    pub async fn start_with_shutdown<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.router();
        let addr = self.address();

        info!("Starting crowd monitor server on {}", addr);

        let listener =
            tokio::net::TcpListener::bind(&addr)
                .await
                .map_err(|e| StreamError::BindFailed {
                    address: addr.clone(),
                    source: e,
                })?;

        info!("Dashboard available at http://{}/", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| StreamError::StartupFailed {
                details: format!("Server error: {}", e),
            })?;

        info!("Server on {} shut down", addr);
        Ok(())
    }
}

/// Stream server builder for configuration
pub struct StreamServerBuilder {
    config: Option<StreamConfig>,
    monitor: Option<Arc<CrowdMonitor>>,
    media: Option<Arc<MediaProcessor>>,
    uploads: Option<UploadStore>,
    event_bus: Option<EventBus>,
}

impl StreamServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            monitor: None,
            media: None,
            uploads: None,
            event_bus: None,
        }
    }

    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn monitor(mut self, monitor: Arc<CrowdMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn media(mut self, media: Arc<MediaProcessor>) -> Self {
        self.media = Some(media);
        self
    }

    /// Upload store; defaults to one built from the media configuration
    pub fn uploads(mut self, uploads: UploadStore) -> Self {
        self.uploads = Some(uploads);
        self
    }

    pub fn event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> Result<StreamServer> {
        let config = self.config.ok_or_else(|| missing("Stream configuration"))?;
        let monitor = self.monitor.ok_or_else(|| missing("Crowd monitor"))?;
        let media = self.media.ok_or_else(|| missing("Media processor"))?;
        let event_bus = self.event_bus.ok_or_else(|| missing("Event bus"))?;
        let uploads = self
            .uploads
            .unwrap_or_else(|| UploadStore::from_config(media.config()));

        Ok(StreamServer::new(config, monitor, media, uploads, event_bus))
    }
}

impl Default for StreamServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(what: &str) -> CrowdwatchError {
    CrowdwatchError::Stream(StreamError::StartupFailed {
        details: format!("{} is required", what),
    })
}
