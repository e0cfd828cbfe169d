use super::yolo::{self, Letterbox};
use super::{Detection, DetectionClass, Detector};
use crate::config::DetectionConfig;
use crate::error::DetectorError;
use crate::frame::Frame;
use std::path::Path;
use tracing::{debug, info};
use tract_onnx::prelude::*;

/// YOLOv8 detector running on tract.
///
/// The model file is loaded and optimized once; `detect` only reads the plan.
pub struct OnnxDetector {
    name: String,
    class: DetectionClass,
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    class_index: usize,
    confidence: f32,
    iou_threshold: f32,
}

impl OnnxDetector {
    pub fn person(config: &DetectionConfig) -> Result<Self, DetectorError> {
        Self::load(
            &config.person_model,
            DetectionClass::Person,
            config.input_size,
            config.person_class_index,
            config.person_confidence,
            config.iou_threshold,
        )
    }

    pub fn face(config: &DetectionConfig) -> Result<Self, DetectorError> {
        Self::load(
            &config.face_model,
            DetectionClass::Face,
            config.input_size,
            config.face_class_index,
            config.face_confidence,
            config.iou_threshold,
        )
    }

    pub fn load<P: AsRef<Path>>(
        model_path: P,
        class: DetectionClass,
        input_size: u32,
        class_index: usize,
        confidence: f32,
        iou_threshold: f32,
    ) -> Result<Self, DetectorError> {
        let model_path = model_path.as_ref();
        let load_error = |details: String| DetectorError::ModelLoad {
            path: model_path.display().to_string(),
            details,
        };

        info!(
            "Loading {} model from {} ({}x{} input)",
            class.as_str(),
            model_path.display(),
            input_size,
            input_size
        );

        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| load_error(format!("failed to read model: {}", e)))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .map_err(|e| load_error(format!("failed to set input fact: {}", e)))?
            .into_optimized()
            .map_err(|e| load_error(format!("failed to optimize model: {}", e)))?
            .into_runnable()
            .map_err(|e| load_error(format!("failed to build runnable model: {}", e)))?;

        Ok(Self {
            name: format!("yolov8-{}", class.as_str()),
            class,
            model,
            input_size,
            class_index,
            confidence,
            iou_threshold,
        })
    }

    fn build_input(&self, frame: &Frame) -> (Tensor, Letterbox) {
        let letterbox = Letterbox::fit(frame.width(), frame.height(), self.input_size);
        let canvas = letterbox.apply(&frame.image);
        let size = self.input_size as usize;

        let input = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
            canvas.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });

        (input.into_tensor(), letterbox)
    }

    fn inference_error(&self, details: String) -> DetectorError {
        DetectorError::Inference {
            detector: self.name.clone(),
            details,
        }
    }
}

impl Detector for OnnxDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn class(&self) -> DetectionClass {
        self.class
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, DetectorError> {
        if frame.is_degenerate() {
            return Ok(Vec::new());
        }

        let (input, letterbox) = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| self.inference_error(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .first()
            .ok_or_else(|| self.inference_error("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| self.inference_error(format!("output tensor was not f32: {}", e)))?;
        let shape = view.shape().to_vec();
        let data: Vec<f32> = view.iter().copied().collect();

        let candidates = yolo::decode(&data, &shape, self.class_index, self.confidence)
            .map_err(|e| self.inference_error(e))?;
        let kept = yolo::non_max_suppression(candidates, self.iou_threshold);

        let detections: Vec<Detection> = kept
            .into_iter()
            .filter_map(|candidate| {
                Detection::from_xyxy(
                    letterbox.to_frame(candidate.bbox),
                    candidate.score,
                    self.class,
                    frame.size(),
                )
            })
            .collect();

        debug!(
            "{} found {} {}(s) in frame {}",
            self.name,
            detections.len(),
            self.class.as_str(),
            frame.id
        );

        Ok(detections)
    }
}
