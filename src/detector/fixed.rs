use super::{Detection, DetectionClass, Detector};
use crate::error::DetectorError;
use crate::frame::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Deterministic detector returning the same boxes for every frame.
///
/// Boxes are clamped to each frame they are reported for. The call counter is
/// shared with clones so tests can observe how often detection ran.
#[derive(Debug, Clone)]
pub struct FixedDetector {
    name: String,
    class: DetectionClass,
    boxes: Vec<([u32; 4], f32)>,
    fail: bool,
    delay: Duration,
    calls: Arc<AtomicU64>,
}

impl FixedDetector {
    pub fn new<S: Into<String>>(name: S, class: DetectionClass, boxes: Vec<([u32; 4], f32)>) -> Self {
        Self {
            name: name.into(),
            class,
            boxes,
            fail: false,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn empty<S: Into<String>>(name: S, class: DetectionClass) -> Self {
        Self::new(name, class, Vec::new())
    }

    /// `count` non-overlapping boxes laid out left to right
    pub fn with_count<S: Into<String>>(name: S, class: DetectionClass, count: u32) -> Self {
        let boxes = (0..count)
            .map(|i| ([i * 20, 10, i * 20 + 16, 42], 0.9))
            .collect();
        Self::new(name, class, boxes)
    }

    /// Every non-degenerate frame fails with an inference error
    pub fn failing<S: Into<String>>(name: S, class: DetectionClass) -> Self {
        Self {
            fail: true,
            ..Self::empty(name, class)
        }
    }

    /// Block for `delay` on every call, like a slow inference engine
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Detector for FixedDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> DetectionClass {
        self.class
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        if frame.is_degenerate() {
            return Ok(Vec::new());
        }

        if self.fail {
            return Err(DetectorError::Inference {
                detector: self.name.clone(),
                details: "scripted failure".to_string(),
            });
        }

        Ok(self
            .boxes
            .iter()
            .filter_map(|(bbox, confidence)| {
                Detection::new(*bbox, *confidence, self.class, frame.size())
            })
            .collect())
    }
}

/// Stand-in used when detection is switched off in configuration
#[derive(Debug)]
pub struct DisabledDetector {
    name: String,
    class: DetectionClass,
}

impl DisabledDetector {
    pub fn new(class: DetectionClass) -> Self {
        warn!(
            "{} detection disabled; all frames will report zero {}s",
            class.as_str(),
            class.as_str()
        );
        Self {
            name: format!("disabled-{}", class.as_str()),
            class,
        }
    }
}

impl Detector for DisabledDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> DetectionClass {
        self.class
    }

    fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_fixed_detector_is_deterministic() {
        let detector = FixedDetector::with_count("people", DetectionClass::Person, 3);
        let frame = Frame::new(1, RgbImage::new(320, 240));

        let first = detector.detect(&frame).unwrap();
        let second = detector.detect(&frame).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!(first.iter().all(|d| d.class == DetectionClass::Person));
        assert_eq!(detector.call_count(), 2);
    }

    #[test]
    fn test_degenerate_frame_yields_nothing() {
        let detector = FixedDetector::failing("faces", DetectionClass::Face);
        let frame = Frame::new(1, RgbImage::new(0, 0));
        assert!(detector.detect(&frame).unwrap().is_empty());

        let frame = Frame::new(2, RgbImage::new(8, 8));
        assert!(detector.detect(&frame).is_err());
    }

    #[test]
    fn test_boxes_outside_small_frame_are_dropped() {
        let detector = FixedDetector::with_count("people", DetectionClass::Person, 4);
        let frame = Frame::new(1, RgbImage::new(40, 40));
        // boxes start at x = 0, 20, 40, 60; only the first two overlap the frame
        assert_eq!(detector.detect(&frame).unwrap().len(), 2);
    }
}
