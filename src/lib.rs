pub mod analytics;
pub mod config;
pub mod detector;
pub mod enhance;
pub mod error;
pub mod events;
pub mod frame;
pub mod loader;
pub mod media;
pub mod monitor;
pub mod snapshot;
pub mod source;
pub mod tracking;

#[cfg(feature = "streaming")]
pub mod app;

#[cfg(feature = "streaming")]
pub mod streaming;

pub use analytics::Analytics;
pub use config::CrowdwatchConfig;
pub use detector::{Detection, DetectionClass, Detector};
pub use error::{CameraError, CrowdwatchError, DetectorError, MediaError, Result, StartError};
pub use events::{EventBus, EventFilter, LoadStatus, MonitorEvent, Publisher};
pub use frame::Frame;
pub use loader::{ComponentFactory, LoaderState, ModelLoader, StandardFactory};
pub use media::{ImageReport, MediaProcessor, UploadStore, VideoReport};
pub use monitor::{ControlResponse, CrowdMonitor, RunMode};
pub use snapshot::{StatsSnapshot, SystemStatus};
pub use source::{FrameGrabber, FrameSource, SourceSpec};

#[cfg(feature = "streaming")]
pub use app::{ComponentState, CrowdwatchApp, ShutdownReason};

#[cfg(feature = "streaming")]
pub use streaming::{StreamServer, StreamServerBuilder};
