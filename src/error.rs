use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrowdwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Start error: {0}")]
    Start(#[from] StartError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl CrowdwatchError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Frame source failures. Transient read gaps are never reported through
/// this type; they surface as `Ok(None)` from the grabber.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera device '{source_name}' unavailable (tried: {})", .tried.join(", "))]
    DeviceUnavailable {
        source_name: String,
        tried: Vec<String>,
    },

    #[error("No frames received after {attempts} attempts")]
    NoFramesAvailable { attempts: u32 },

    #[error("Camera configuration failed: {details}")]
    Configuration { details: String },

    #[error("Frame source handle is invalid")]
    HandleInvalid,

    #[error("Camera device removed: {details}")]
    DeviceRemoved { details: String },
}

impl CameraError {
    /// Hard errors invalidate the handle; everything else is recoverable by
    /// re-opening the source.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CameraError::HandleInvalid | CameraError::DeviceRemoved { .. })
    }
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Failed to load model {path}: {details}")]
    ModelLoad { path: String, details: String },

    #[error("Inference failed in {detector}: {details}")]
    Inference { detector: String, details: String },

    #[error("Detector backend '{backend}' is not available in this build")]
    BackendUnavailable { backend: String },
}

/// Reasons a monitoring start can be refused. The display strings are the
/// messages shown to clients.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StartError {
    #[error("Already monitoring")]
    AlreadyRunning,

    #[error("Still initializing...")]
    StillInitializing,

    #[error("Model initialization failed: {0}")]
    ModelLoadFailed(String),

    #[error("Camera access failed - check camera permissions ({0})")]
    CameraUnavailable(String),

    #[error("Camera test failed - no frames received")]
    NoFramesAvailable,
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported {kind} file extension: '{extension}'")]
    UnsupportedExtension { kind: String, extension: String },

    #[error("Missing file name in upload")]
    MissingFileName,

    #[error("Upload too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },

    #[error("Failed to decode media {path}: {details}")]
    Decode { path: String, details: String },

    #[error("Models are not loaded yet")]
    ModelsNotReady,
}

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Failed to bind to {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server startup failed: {details}")]
    StartupFailed { details: String },
}

pub type Result<T> = std::result::Result<T, CrowdwatchError>;
