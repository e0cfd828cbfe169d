use crate::config::EnhancementConfig;
use crate::frame::Frame;
use image::{imageops, RgbImage};
use std::sync::Arc;
use tracing::debug;

/// Pixel filter applied to frames ahead of detection
pub trait FrameFilter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, image: &RgbImage) -> RgbImage;

    /// Filter a frame, keeping its identity and timing
    fn filter_frame(&self, frame: &Frame) -> Frame {
        Frame {
            image: Arc::new(self.apply(&frame.image)),
            ..frame.clone()
        }
    }
}

/// Brightness, contrast and unsharp-mask pass for dim or soft footage
#[derive(Debug, Clone)]
pub struct ImageEnhancer {
    brightness: i32,
    contrast: f32,
    sharpen_sigma: f32,
    sharpen_threshold: i32,
}

impl ImageEnhancer {
    pub fn new(brightness: i32, contrast: f32, sharpen_sigma: f32, sharpen_threshold: i32) -> Self {
        Self {
            brightness,
            contrast,
            sharpen_sigma,
            sharpen_threshold,
        }
    }

    /// `None` when enhancement is switched off
    pub fn from_config(config: &EnhancementConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        debug!(
            "Image enhancement enabled (brightness {}, contrast {}, sharpen sigma {})",
            config.brightness, config.contrast, config.sharpen_sigma
        );
        Some(Self::new(
            config.brightness,
            config.contrast,
            config.sharpen_sigma,
            config.sharpen_threshold,
        ))
    }
}

impl FrameFilter for ImageEnhancer {
    fn name(&self) -> &str {
        "enhancer"
    }

    fn apply(&self, image: &RgbImage) -> RgbImage {
        let mut output = if self.brightness != 0 {
            imageops::brighten(image, self.brightness)
        } else {
            image.clone()
        };

        if self.contrast != 0.0 {
            output = imageops::contrast(&output, self.contrast);
        }

        if self.sharpen_sigma > 0.0 {
            output = imageops::unsharpen(&output, self.sharpen_sigma, self.sharpen_threshold);
        }

        output
    }
}

/// Shared handle used by the monitor and the media pipeline
pub type SharedFilter = Arc<dyn FrameFilter>;

pub fn filter_from_config(config: &EnhancementConfig) -> Option<SharedFilter> {
    ImageEnhancer::from_config(config).map(|enhancer| Arc::new(enhancer) as SharedFilter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_disabled_by_default() {
        assert!(filter_from_config(&EnhancementConfig::default()).is_none());
    }

    #[test]
    fn test_brightness_raises_pixels() {
        let enhancer = ImageEnhancer::new(30, 0.0, 0.0, 0);
        let output = enhancer.apply(&RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])));
        assert_eq!(output.get_pixel(1, 1), &Rgb([130, 130, 130]));
    }

    #[test]
    fn test_filter_frame_keeps_identity() {
        let config = EnhancementConfig {
            enabled: true,
            ..EnhancementConfig::default()
        };
        let filter = filter_from_config(&config).unwrap();
        let frame = Frame::new(7, RgbImage::from_pixel(8, 6, Rgb([40, 40, 40])));

        let enhanced = filter.filter_frame(&frame);
        assert_eq!(enhanced.id, 7);
        assert_eq!(enhanced.size(), (8, 6));
        assert_eq!(enhanced.timestamp, frame.timestamp);
        assert_eq!(filter.name(), "enhancer");
    }
}
