//! YOLOv8 pre- and post-processing shared by the inference backends.
//!
//! The model sees a square input. Frames are resized to fit, keeping their
//! aspect ratio, and padded on the right and bottom. Output tensors have the
//! layout `[1, 4 + classes, anchors]` with boxes as centre/size in input pixels.

use image::imageops::FilterType;
use image::{Rgb, RgbImage};

/// Pad colour used for the unfilled part of the model input
pub const PAD_VALUE: u8 = 114;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub size: u32,
    pub ratio: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
}

impl Letterbox {
    pub fn fit(width: u32, height: u32, size: u32) -> Self {
        let ratio = (size as f32 / width.max(1) as f32).min(size as f32 / height.max(1) as f32);
        let scaled_width = ((width as f32 * ratio).round() as u32).clamp(1, size);
        let scaled_height = ((height as f32 * ratio).round() as u32).clamp(1, size);
        Self {
            size,
            ratio,
            scaled_width,
            scaled_height,
        }
    }

    /// Map an input-space `[x1, y1, x2, y2]` box back to frame pixels
    pub fn to_frame(&self, bbox: [f32; 4]) -> [f32; 4] {
        [
            bbox[0] / self.ratio,
            bbox[1] / self.ratio,
            bbox[2] / self.ratio,
            bbox[3] / self.ratio,
        ]
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        let resized = image::imageops::resize(
            image,
            self.scaled_width,
            self.scaled_height,
            FilterType::Triangle,
        );
        let mut canvas = RgbImage::from_pixel(self.size, self.size, Rgb([PAD_VALUE; 3]));
        image::imageops::replace(&mut canvas, &resized, 0, 0);
        canvas
    }
}

/// Box that passed the confidence filter, in model input space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub bbox: [f32; 4],
    pub score: f32,
}

/// Decode raw YOLOv8 output for a single class.
///
/// `shape` is the output tensor shape. Both `[1, 4 + nc, anchors]` and the
/// transposed `[1, anchors, 4 + nc]` export are accepted.
pub fn decode(
    data: &[f32],
    shape: &[usize],
    class_index: usize,
    confidence: f32,
) -> Result<Vec<Candidate>, String> {
    let (rows, cols) = match shape {
        [1, rows, cols] => (*rows, *cols),
        [rows, cols] => (*rows, *cols),
        other => return Err(format!("unexpected output shape {:?}", other)),
    };

    if data.len() != rows * cols {
        return Err(format!(
            "output holds {} values, shape {:?} expects {}",
            data.len(),
            shape,
            rows * cols
        ));
    }

    // Anchors vastly outnumber attributes in every YOLOv8 export
    let transposed = rows > cols;
    let (attributes, anchors) = if transposed { (cols, rows) } else { (rows, cols) };

    if attributes < 5 || class_index >= attributes - 4 {
        return Err(format!(
            "class index {} out of range for {} attributes",
            class_index, attributes
        ));
    }

    let value = |attribute: usize, anchor: usize| -> f32 {
        if transposed {
            data[anchor * attributes + attribute]
        } else {
            data[attribute * anchors + anchor]
        }
    };

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let score = value(4 + class_index, anchor);
        if !(score >= confidence) {
            continue;
        }

        let (cx, cy) = (value(0, anchor), value(1, anchor));
        let (w, h) = (value(2, anchor), value(3, anchor));
        candidates.push(Candidate {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            score,
        });
    }

    Ok(candidates)
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Greedy non-maximum suppression, highest score first
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if kept
            .iter()
            .all(|k| iou(&k.bbox, &candidate.bbox) <= iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}
