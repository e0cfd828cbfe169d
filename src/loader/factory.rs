use crate::config::{CrowdwatchConfig, DetectorBackendKind};
use crate::detector::{DetectionClass, Detector, DisabledDetector};
use crate::error::{CameraError, DetectorError};
use crate::source::{self, FrameSource, SourceSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Builds the heavy components the loader assembles.
///
/// Every method runs on a blocking worker.
pub trait ComponentFactory: Send + Sync {
    /// Check that every resource a load needs is present
    fn resolve_resources(&self) -> Result<Vec<PathBuf>, DetectorError>;

    /// Source used by live monitoring
    fn frame_source(&self) -> Result<Box<dyn FrameSource>, CameraError>;

    /// Source reading an uploaded video file
    fn file_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, CameraError>;

    fn person_detector(&self) -> Result<Arc<dyn Detector>, DetectorError>;

    fn face_detector(&self) -> Result<Arc<dyn Detector>, DetectorError>;
}

/// Factory building real components from configuration
pub struct StandardFactory {
    config: CrowdwatchConfig,
}

impl StandardFactory {
    pub fn new(config: CrowdwatchConfig) -> Self {
        Self { config }
    }

    fn inference_enabled(&self) -> bool {
        match self.config.detection.backend {
            DetectorBackendKind::None => false,
            DetectorBackendKind::Onnx if cfg!(feature = "onnx") => true,
            DetectorBackendKind::Onnx => {
                warn!("ONNX support not compiled in; detection is disabled");
                false
            }
        }
    }
}

impl ComponentFactory for StandardFactory {
    fn resolve_resources(&self) -> Result<Vec<PathBuf>, DetectorError> {
        if !self.inference_enabled() {
            return Ok(Vec::new());
        }

        let detection = &self.config.detection;
        [&detection.person_model, &detection.face_model]
            .into_iter()
            .map(|model| {
                let path = PathBuf::from(model);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(DetectorError::ModelLoad {
                        path: model.clone(),
                        details: "model file not found".to_string(),
                    })
                }
            })
            .collect()
    }

    fn frame_source(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let spec = SourceSpec::parse(&self.config.camera.source);
        source::open_source(&spec, &self.config.camera)
    }

    fn file_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, CameraError> {
        source::open_source(&SourceSpec::file(path), &self.config.camera)
    }

    fn person_detector(&self) -> Result<Arc<dyn Detector>, DetectorError> {
        if !self.inference_enabled() {
            return Ok(Arc::new(DisabledDetector::new(DetectionClass::Person)));
        }
        build_onnx(&self.config, DetectionClass::Person)
    }

    fn face_detector(&self) -> Result<Arc<dyn Detector>, DetectorError> {
        if !self.inference_enabled() {
            return Ok(Arc::new(DisabledDetector::new(DetectionClass::Face)));
        }
        build_onnx(&self.config, DetectionClass::Face)
    }
}

#[cfg(feature = "onnx")]
fn build_onnx(config: &CrowdwatchConfig, class: DetectionClass) -> Result<Arc<dyn Detector>, DetectorError> {
    use crate::detector::OnnxDetector;

    let detector = match class {
        DetectionClass::Person => OnnxDetector::person(&config.detection)?,
        DetectionClass::Face => OnnxDetector::face(&config.detection)?,
    };
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx(_config: &CrowdwatchConfig, _class: DetectionClass) -> Result<Arc<dyn Detector>, DetectorError> {
    Err(DetectorError::BackendUnavailable {
        backend: "onnx".to_string(),
    })
}
