mod fixed;
#[cfg(feature = "onnx")]
mod onnx;
pub mod yolo;

pub use fixed::{DisabledDetector, FixedDetector};
#[cfg(feature = "onnx")]
pub use onnx::OnnxDetector;

use crate::error::DetectorError;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionClass {
    Person,
    Face,
}

impl DetectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionClass::Person => "person",
            DetectionClass::Face => "face",
        }
    }
}

/// One region found in a frame. Boxes are `[x1, y1, x2, y2]` in frame
/// pixels, clamped to the frame and never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: [u32; 4],
    pub confidence: f32,
    pub class: DetectionClass,
}

impl Detection {
    /// Clamp `bbox` to a `frame_size` frame. Returns `None` when nothing of
    /// the box is left.
    pub fn new(
        bbox: [u32; 4],
        confidence: f32,
        class: DetectionClass,
        frame_size: (u32, u32),
    ) -> Option<Self> {
        let (width, height) = frame_size;
        let x1 = bbox[0].min(width);
        let y1 = bbox[1].min(height);
        let x2 = bbox[2].min(width);
        let y2 = bbox[3].min(height);

        if x1 >= x2 || y1 >= y2 {
            return None;
        }

        Some(Self {
            bbox: [x1, y1, x2, y2],
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            class,
        })
    }

    /// Same as [`Detection::new`] for model-space float coordinates
    pub fn from_xyxy(
        bbox: [f32; 4],
        confidence: f32,
        class: DetectionClass,
        frame_size: (u32, u32),
    ) -> Option<Self> {
        let to_pixel = |v: f32| if v.is_finite() { v.round().max(0.0) as u32 } else { 0 };
        Self::new(
            [
                to_pixel(bbox[0]),
                to_pixel(bbox[1]),
                to_pixel(bbox[2]),
                to_pixel(bbox[3]),
            ],
            confidence,
            class,
            frame_size,
        )
    }

    pub fn width(&self) -> u32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> u32 {
        self.bbox[3] - self.bbox[1]
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.bbox[0] + self.bbox[2]) as f64 / 2.0,
            (self.bbox[1] + self.bbox[3]) as f64 / 2.0,
        )
    }
}

/// Uniform contract for the person and face detectors.
///
/// Implementations are configured at construction and must not mutate state
/// visible to other calls, so a loaded detector can be shared behind an `Arc`.
/// A degenerate frame yields `Ok(vec![])`; `Err` is reserved for engine
/// failures.
pub trait Detector: Send + Sync {
    fn name(&self) -> &str;

    fn class(&self) -> DetectionClass;

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError>;
}
