use super::FrameSource;
use crate::error::CameraError;
use crate::frame::Frame;
use async_trait::async_trait;
use image::{Rgb, RgbImage};

const DEFAULT_SIZE: (u32, u32) = (640, 480);
const BAR_WIDTH: u32 = 40;

/// Synthetic test pattern with a bar sweeping left to right.
///
/// Stands in for a camera in builds without capture support.
pub struct PatternSource {
    name: String,
    fps: u32,
    size: (u32, u32),
    open: bool,
    counter: u64,
}

impl PatternSource {
    pub fn new<S: Into<String>>(name: S, fps: u32) -> Self {
        Self {
            name: name.into(),
            fps: fps.max(1),
            size: DEFAULT_SIZE,
            open: false,
            counter: 0,
        }
    }

    fn render(&self) -> RgbImage {
        let (width, height) = self.size;
        let travel = width.saturating_sub(BAR_WIDTH).max(1) as u64;
        let offset = ((self.counter * 8) % travel) as u32;
        RgbImage::from_fn(width, height, |x, y| {
            if x >= offset && x < offset + BAR_WIDTH {
                Rgb([230, 230, 230])
            } else {
                let shade = (y * 96 / height.max(1)) as u8;
                Rgb([20 + shade, 40, 60])
            }
        })
    }
}

#[async_trait]
impl FrameSource for PatternSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_backend(&mut self, _backend: &str) -> Result<(), CameraError> {
        self.open = true;
        Ok(())
    }

    async fn apply_resolution(
        &mut self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Option<(u32, u32)>, CameraError> {
        if width == 0 || height == 0 {
            return Ok(None);
        }
        self.size = (width, height);
        self.fps = fps.max(1);
        Ok(Some(self.size))
    }

    async fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        if !self.open {
            return Err(CameraError::HandleInvalid);
        }
        let frame = Frame::new(self.counter, self.render());
        self.counter += 1;
        Ok(Some(frame))
    }

    async fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn fps_hint(&self) -> Option<f64> {
        Some(self.fps as f64)
    }
}
