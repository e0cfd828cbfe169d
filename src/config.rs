use crate::analytics::{AnalyticsMode, ThresholdTable};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CrowdwatchConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub enhancement: EnhancementConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Device index ("0" for /dev/video0) or a path to a video file
    #[serde(default = "default_camera_source")]
    pub source: String,

    /// Capture backends tried in order until one opens
    #[serde(default = "default_camera_backends")]
    pub backends: Vec<String>,

    /// Resolutions tried in order; the first one the device applies wins
    #[serde(default = "default_camera_resolutions")]
    pub resolutions: Vec<(u32, u32)>,

    /// Frames per second requested from the device
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Delay after open before warm-up reads begin
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Frames discarded right after open
    #[serde(default = "default_warmup_discard_frames")]
    pub warmup_discard_frames: u32,

    /// Attempts to read one valid frame before giving up
    #[serde(default = "default_warmup_attempts")]
    pub warmup_attempts: u32,

    /// Base delay between warm-up attempts, grows linearly
    #[serde(default = "default_warmup_retry_delay_ms")]
    pub warmup_retry_delay_ms: u64,

    /// Extra reads after a gap before reporting no frame
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    #[serde(default = "default_read_retry_delay_ms")]
    pub read_retry_delay_ms: u64,

    /// Upper bound on a single blocking pull from the backend
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackendKind {
    /// tract-onnx inference over YOLOv8 models
    Onnx,
    /// Detection disabled; both detectors always report nothing
    None,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectionConfig {
    #[serde(default = "default_detector_backend")]
    pub backend: DetectorBackendKind,

    #[serde(default = "default_person_model")]
    pub person_model: String,

    #[serde(default = "default_face_model")]
    pub face_model: String,

    /// Square model input edge in pixels
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    #[serde(default = "default_person_confidence")]
    pub person_confidence: f32,

    #[serde(default = "default_face_confidence")]
    pub face_confidence: f32,

    /// IoU above which overlapping boxes are suppressed
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    #[serde(default)]
    pub person_class_index: usize,

    #[serde(default)]
    pub face_class_index: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MonitorConfig {
    /// Run detection on every Nth captured frame
    #[serde(default = "default_detect_every_n_frames")]
    pub detect_every_n_frames: u64,

    /// Minimum gap between two published snapshots
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,

    /// Sleep at the end of every loop iteration
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Sleep after a frame gap
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,

    /// Sleep after a hard source error
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Bounded wait for the loop task on stop
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Warn once per this many consecutive gaps
    #[serde(default = "default_failure_log_every")]
    pub failure_log_every: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AnalyticsConfig {
    #[serde(default)]
    pub mode: AnalyticsMode,

    /// Weight of a face relative to a person in the alert score
    #[serde(default = "default_face_weight")]
    pub face_weight: f64,

    #[serde(default = "ThresholdTable::default_density")]
    pub density: ThresholdTable,

    /// Density tiers used in retail mode
    #[serde(default = "ThresholdTable::retail_density")]
    pub retail_density: ThresholdTable,

    #[serde(default = "ThresholdTable::default_alert")]
    pub alert: ThresholdTable,

    /// Normalized centre distance below which two people interact
    #[serde(default = "default_proximity_ratio")]
    pub proximity_ratio: f64,

    /// Fraction of the frame on each side counted as edge for flow analysis
    #[serde(default = "default_edge_margin")]
    pub edge_margin: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EnhancementConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Added to every channel
    #[serde(default = "default_brightness")]
    pub brightness: i32,

    /// Contrast adjustment in percent
    #[serde(default = "default_contrast")]
    pub contrast: f32,

    #[serde(default = "default_sharpen_sigma")]
    pub sharpen_sigma: f32,

    #[serde(default = "default_sharpen_threshold")]
    pub sharpen_threshold: i32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MediaConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    #[serde(default = "default_processed_dir")]
    pub processed_dir: String,

    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,

    /// Frames larger than this are scaled down before detection
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: (u32, u32),

    /// Write annotated video frames as a JPEG sequence
    #[serde(default = "default_save_annotated_frames")]
    pub save_annotated_frames: bool,

    #[serde(default = "default_video_progress_every")]
    pub video_progress_every: u64,

    #[serde(default = "default_detect_every_n_frames")]
    pub detect_every_n_frames: u64,

    /// Consecutive empty reads that end video processing
    #[serde(default = "default_max_consecutive_gaps")]
    pub max_consecutive_gaps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamConfig {
    /// IP address to bind to
    #[serde(default = "default_stream_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_stream_port")]
    pub port: u16,

    /// Directory served for unmatched paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Begin loading models as soon as the server starts
    #[serde(default)]
    pub preload_models: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TrackingConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_tracking_dir")]
    pub dir: String,

    #[serde(default = "default_experiment_name")]
    pub experiment_name: String,

    #[serde(default = "default_model_name")]
    pub model_name: String,

    #[serde(default = "default_model_version")]
    pub model_version: String,
}

impl CrowdwatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("crowdwatch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.source", default_camera_source())?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.settle_ms", default_settle_ms() as i64)?
            .set_default("camera.warmup_attempts", default_warmup_attempts())?
            .set_default("detection.person_model", default_person_model())?
            .set_default("detection.face_model", default_face_model())?
            .set_default("detection.input_size", default_input_size())?
            .set_default(
                "detection.person_confidence",
                default_person_confidence() as f64,
            )?
            .set_default("detection.face_confidence", default_face_confidence() as f64)?
            .set_default(
                "monitor.detect_every_n_frames",
                default_detect_every_n_frames() as i64,
            )?
            .set_default("monitor.publish_interval_ms", default_publish_interval_ms() as i64)?
            .set_default("monitor.poll_interval_ms", default_poll_interval_ms() as i64)?
            .set_default("monitor.stop_timeout_ms", default_stop_timeout_ms() as i64)?
            .set_default("analytics.face_weight", default_face_weight())?
            .set_default("media.upload_dir", default_upload_dir())?
            .set_default("media.processed_dir", default_processed_dir())?
            .set_default("stream.ip", default_stream_ip())?
            .set_default("stream.port", default_stream_port())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // CROWDWATCH_STREAM__PORT=9090 overrides stream.port
            .add_source(
                Environment::with_prefix("CROWDWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: CrowdwatchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.backends.is_empty() {
            return Err(ConfigError::Message(
                "At least one camera backend must be configured".to_string(),
            ));
        }

        if self.camera.resolutions.is_empty()
            || self.camera.resolutions.iter().any(|(w, h)| *w == 0 || *h == 0)
        {
            return Err(ConfigError::Message(
                "Camera resolutions must be non-empty and greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.warmup_attempts == 0 {
            return Err(ConfigError::Message(
                "Camera warmup_attempts must be greater than 0".to_string(),
            ));
        }

        for (name, value) in [
            ("person_confidence", self.detection.person_confidence),
            ("face_confidence", self.detection.face_confidence),
            ("iou_threshold", self.detection.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Message(format!(
                    "Detection {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.detection.input_size == 0 || self.detection.input_size % 32 != 0 {
            return Err(ConfigError::Message(
                "Detection input_size must be a positive multiple of 32".to_string(),
            ));
        }

        if self.monitor.detect_every_n_frames == 0 || self.media.detect_every_n_frames == 0 {
            return Err(ConfigError::Message(
                "detect_every_n_frames must be greater than 0".to_string(),
            ));
        }

        if self.monitor.failure_log_every == 0 {
            return Err(ConfigError::Message(
                "Monitor failure_log_every must be greater than 0".to_string(),
            ));
        }

        if self.analytics.face_weight < 0.0 {
            return Err(ConfigError::Message(
                "Analytics face_weight must not be negative".to_string(),
            ));
        }

        for (name, table) in [
            ("density", &self.analytics.density),
            ("retail_density", &self.analytics.retail_density),
            ("alert", &self.analytics.alert),
        ] {
            table
                .validate()
                .map_err(|e| ConfigError::Message(format!("Analytics {} table: {}", name, e)))?;
        }

        if self.media.video_progress_every == 0 {
            return Err(ConfigError::Message(
                "Media video_progress_every must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl CameraConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn warmup_retry_delay(&self) -> Duration {
        Duration::from_millis(self.warmup_retry_delay_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl MonitorConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: default_camera_source(),
            backends: default_camera_backends(),
            resolutions: default_camera_resolutions(),
            fps: default_camera_fps(),
            settle_ms: default_settle_ms(),
            warmup_discard_frames: default_warmup_discard_frames(),
            warmup_attempts: default_warmup_attempts(),
            warmup_retry_delay_ms: default_warmup_retry_delay_ms(),
            read_retries: default_read_retries(),
            read_retry_delay_ms: default_read_retry_delay_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            backend: default_detector_backend(),
            person_model: default_person_model(),
            face_model: default_face_model(),
            input_size: default_input_size(),
            person_confidence: default_person_confidence(),
            face_confidence: default_face_confidence(),
            iou_threshold: default_iou_threshold(),
            person_class_index: 0,
            face_class_index: 0,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            detect_every_n_frames: default_detect_every_n_frames(),
            publish_interval_ms: default_publish_interval_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            failure_log_every: default_failure_log_every(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            mode: AnalyticsMode::default(),
            face_weight: default_face_weight(),
            density: ThresholdTable::default_density(),
            retail_density: ThresholdTable::retail_density(),
            alert: ThresholdTable::default_alert(),
            proximity_ratio: default_proximity_ratio(),
            edge_margin: default_edge_margin(),
        }
    }
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brightness: default_brightness(),
            contrast: default_contrast(),
            sharpen_sigma: default_sharpen_sigma(),
            sharpen_threshold: default_sharpen_threshold(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            processed_dir: default_processed_dir(),
            max_upload_mb: default_max_upload_mb(),
            max_frame_size: default_max_frame_size(),
            save_annotated_frames: default_save_annotated_frames(),
            video_progress_every: default_video_progress_every(),
            detect_every_n_frames: default_detect_every_n_frames(),
            max_consecutive_gaps: default_max_consecutive_gaps(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ip: default_stream_ip(),
            port: default_stream_port(),
            static_dir: None,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_bus_capacity: default_event_bus_capacity(),
            preload_models: false,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_tracking_dir(),
            experiment_name: default_experiment_name(),
            model_name: default_model_name(),
            model_version: default_model_version(),
        }
    }
}

// Default value functions
fn default_camera_source() -> String {
    "0".to_string()
}
fn default_camera_backends() -> Vec<String> {
    vec![
        "v4l2src".to_string(),
        "libcamerasrc".to_string(),
        "autovideosrc".to_string(),
    ]
}
fn default_camera_resolutions() -> Vec<(u32, u32)> {
    vec![(640, 480), (1280, 720), (320, 240)]
}
fn default_camera_fps() -> u32 {
    30
}
fn default_settle_ms() -> u64 {
    2000
}
fn default_warmup_discard_frames() -> u32 {
    10
}
fn default_warmup_attempts() -> u32 {
    10
}
fn default_warmup_retry_delay_ms() -> u64 {
    500
}
fn default_read_retries() -> u32 {
    3
}
fn default_read_retry_delay_ms() -> u64 {
    10
}
fn default_read_timeout_ms() -> u64 {
    100
}

fn default_detector_backend() -> DetectorBackendKind {
    DetectorBackendKind::Onnx
}
fn default_person_model() -> String {
    "models/yolov8n.onnx".to_string()
}
fn default_face_model() -> String {
    "models/yolov8n-face.onnx".to_string()
}
fn default_input_size() -> u32 {
    640
}
fn default_person_confidence() -> f32 {
    0.3
}
fn default_face_confidence() -> f32 {
    0.5
}
fn default_iou_threshold() -> f32 {
    0.45
}

fn default_detect_every_n_frames() -> u64 {
    10
}
fn default_publish_interval_ms() -> u64 {
    1000
}
fn default_poll_interval_ms() -> u64 {
    33
}
fn default_failure_backoff_ms() -> u64 {
    50
}
fn default_error_backoff_ms() -> u64 {
    100
}
fn default_stop_timeout_ms() -> u64 {
    3000
}
fn default_failure_log_every() -> u64 {
    50
}

fn default_face_weight() -> f64 {
    0.3
}
fn default_proximity_ratio() -> f64 {
    0.15
}
fn default_edge_margin() -> f64 {
    0.2
}

fn default_brightness() -> i32 {
    10
}
fn default_contrast() -> f32 {
    20.0
}
fn default_sharpen_sigma() -> f32 {
    1.0
}
fn default_sharpen_threshold() -> i32 {
    2
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}
fn default_processed_dir() -> String {
    "processed".to_string()
}
fn default_max_upload_mb() -> usize {
    100
}
fn default_max_frame_size() -> (u32, u32) {
    (1920, 1080)
}
fn default_save_annotated_frames() -> bool {
    true
}
fn default_video_progress_every() -> u64 {
    30
}
fn default_max_consecutive_gaps() -> u32 {
    100
}

fn default_stream_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_stream_port() -> u16 {
    5000
}

fn default_event_bus_capacity() -> usize {
    256
}

fn default_tracking_dir() -> String {
    "runs".to_string()
}
fn default_experiment_name() -> String {
    "ai-crowd-monitoring".to_string()
}
fn default_model_name() -> String {
    "ai-crowd-monitoring-system".to_string()
}
fn default_model_version() -> String {
    "1.0.0".to_string()
}
