use super::ComponentFactory;
use crate::config::{CameraConfig, CrowdwatchConfig};
use crate::detector::{DetectionClass, Detector, FixedDetector};
use crate::error::{CameraError, DetectorError};
use crate::source::{FrameSource, MockFrameSource, MockProbe};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

type SourceMaker = Box<dyn Fn() -> MockFrameSource + Send + Sync>;

/// Factory handing out mock sources and fixed detectors
pub(crate) struct FakeFactory {
    make_source: SourceMaker,
    person: FixedDetector,
    face: FixedDetector,
    person_load_failures: AtomicU32,
    resolve_calls: AtomicU32,
    load_delay: Duration,
    video_frames: u64,
    probes: Mutex<Vec<MockProbe>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            make_source: Box::new(|| MockFrameSource::new(64, 48)),
            person: FixedDetector::with_count("person", DetectionClass::Person, 3),
            face: FixedDetector::with_count("face", DetectionClass::Face, 2),
            person_load_failures: AtomicU32::new(0),
            resolve_calls: AtomicU32::new(0),
            load_delay: Duration::ZERO,
            video_frames: 25,
            probes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_source<F>(mut self, make: F) -> Self
    where
        F: Fn() -> MockFrameSource + Send + Sync + 'static,
    {
        self.make_source = Box::new(make);
        self
    }

    pub fn with_detectors(mut self, person: FixedDetector, face: FixedDetector) -> Self {
        self.person = person;
        self.face = face;
        self
    }

    pub fn failing_person_loads(self, count: u32) -> Self {
        self.person_load_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    pub fn with_video_frames(mut self, frames: u64) -> Self {
        self.video_frames = frames;
        self
    }

    pub fn person(&self) -> &FixedDetector {
        &self.person
    }

    pub fn resolve_calls(&self) -> u32 {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn last_probe(&self) -> Option<MockProbe> {
        self.probes.lock().last().cloned()
    }
}

impl ComponentFactory for FakeFactory {
    fn resolve_resources(&self) -> Result<Vec<PathBuf>, DetectorError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if !self.load_delay.is_zero() {
            std::thread::sleep(self.load_delay);
        }
        Ok(Vec::new())
    }

    fn frame_source(&self) -> Result<Box<dyn FrameSource>, CameraError> {
        let source = (self.make_source)();
        self.probes.lock().push(source.probe());
        Ok(Box::new(source))
    }

    fn file_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, CameraError> {
        Ok(Box::new(
            MockFrameSource::new(64, 48)
                .named(path.display().to_string())
                .finite(self.video_frames),
        ))
    }

    fn person_detector(&self) -> Result<Arc<dyn Detector>, DetectorError> {
        let remaining = self.person_load_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.person_load_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DetectorError::ModelLoad {
                path: "person.onnx".to_string(),
                details: "corrupt model".to_string(),
            });
        }
        Ok(Arc::new(self.person.clone()))
    }

    fn face_detector(&self) -> Result<Arc<dyn Detector>, DetectorError> {
        Ok(Arc::new(self.face.clone()))
    }
}

/// Camera timings shrunk to milliseconds
pub(crate) fn fast_camera() -> CameraConfig {
    CameraConfig {
        settle_ms: 0,
        warmup_discard_frames: 1,
        warmup_attempts: 3,
        warmup_retry_delay_ms: 1,
        read_retries: 1,
        read_retry_delay_ms: 1,
        ..CameraConfig::default()
    }
}

/// Whole configuration with fast camera and loop cadence
pub(crate) fn fast_config() -> CrowdwatchConfig {
    let mut config = CrowdwatchConfig {
        camera: fast_camera(),
        ..CrowdwatchConfig::default()
    };
    config.monitor.detect_every_n_frames = 2;
    config.monitor.publish_interval_ms = 0;
    config.monitor.poll_interval_ms = 1;
    config.monitor.failure_backoff_ms = 1;
    config.monitor.error_backoff_ms = 1;
    config.monitor.stop_timeout_ms = 1000;
    config
}
