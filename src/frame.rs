use crate::error::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Decoded RGB frame handed from a frame source to the detectors
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic per-source frame identifier
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// Presentation offset within a file source
    pub position: Option<Duration>,
    /// Pixel data (shared ownership so clones stay cheap)
    pub image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(id: u64, image: RgbImage) -> Self {
        Self {
            id,
            timestamp: SystemTime::now(),
            position: None,
            image: Arc::new(image),
        }
    }

    pub fn with_position(mut self, position: Duration) -> Self {
        self.position = Some(position);
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    /// A frame with no pixels cannot be analysed
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Downscale to fit inside `max`, keeping the aspect ratio. Frames that
    /// already fit are returned as-is.
    pub fn fit_within(&self, max: (u32, u32)) -> Frame {
        let (width, height) = self.size();
        if self.is_degenerate() || (width <= max.0 && height <= max.1) {
            return self.clone();
        }

        let scale = (max.0 as f32 / width as f32).min(max.1 as f32 / height as f32);
        let new_width = ((width as f32 * scale).round() as u32).max(1);
        let new_height = ((height as f32 * scale).round() as u32).max(1);
        let resized = image::imageops::resize(
            self.image.as_ref(),
            new_width,
            new_height,
            FilterType::Triangle,
        );

        Frame {
            id: self.id,
            timestamp: self.timestamp,
            position: self.position,
            image: Arc::new(resized),
        }
    }

    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        encode_jpeg(&self.image, quality)
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode_image(image)?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_frame() {
        let frame = Frame::new(1, RgbImage::new(0, 0));
        assert!(frame.is_degenerate());
        assert!(!Frame::new(2, RgbImage::new(4, 4)).is_degenerate());
    }

    #[test]
    fn test_fit_within_keeps_aspect_ratio() {
        let frame = Frame::new(3, RgbImage::new(3840, 2160));
        let fitted = frame.fit_within((1920, 1080));
        assert_eq!(fitted.size(), (1920, 1080));
        assert_eq!(fitted.id, 3);

        let small = Frame::new(4, RgbImage::new(640, 480));
        assert_eq!(small.fit_within((1920, 1080)).size(), (640, 480));
    }

    #[test]
    fn test_jpeg_encoding_produces_markers() {
        let frame = Frame::new(5, RgbImage::from_pixel(16, 16, image::Rgb([200, 10, 10])));
        let jpeg = frame.to_jpeg(80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }
}
