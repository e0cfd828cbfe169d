mod backend;
mod grabber;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gst;
mod mock;
mod pattern;
#[cfg(test)]
mod tests;

pub use backend::{pipeline_description, SourceSpec, FILE_BACKEND};
pub use grabber::FrameGrabber;
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use gst::GstSource;
pub use mock::{MockFrameSource, MockProbe, MockRead};
pub use pattern::PatternSource;

use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::Frame;
use async_trait::async_trait;

/// Raw access to a camera device or a video file.
///
/// Implementations perform single attempts only; retry and warm-up timing is
/// applied by [`FrameGrabber`].
#[async_trait]
pub trait FrameSource: Send {
    /// Human readable source identifier for logs
    fn name(&self) -> &str;

    /// Backends worth trying for this source, in preference order
    fn candidate_backends(&self, configured: &[String]) -> Vec<String> {
        configured.to_vec()
    }

    /// Open through one specific backend
    async fn open_backend(&mut self, backend: &str) -> Result<(), CameraError>;

    /// Request a capture mode; returns the size the device reports back
    async fn apply_resolution(
        &mut self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Option<(u32, u32)>, CameraError>;

    /// One read attempt. `Ok(None)` is a gap, not an error.
    async fn read(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Release the device or file. Closing twice is a no-op.
    async fn close(&mut self);

    fn is_open(&self) -> bool;

    /// File sources report end of stream here
    fn is_exhausted(&self) -> bool {
        false
    }

    fn frame_count_hint(&self) -> Option<u64> {
        None
    }

    fn fps_hint(&self) -> Option<f64> {
        None
    }
}

/// Build the frame source matching `spec` for this build.
pub fn open_source(spec: &SourceSpec, config: &CameraConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    #[cfg(all(feature = "camera", target_os = "linux"))]
    {
        Ok(Box::new(GstSource::new(spec.clone(), config.read_timeout())?))
    }

    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    {
        match spec {
            SourceSpec::Device(index) => {
                tracing::warn!(
                    "Camera support not compiled in; using a synthetic pattern for device {}",
                    index
                );
                Ok(Box::new(PatternSource::new(
                    format!("pattern:{}", index),
                    config.fps,
                )))
            }
            SourceSpec::File(path) => Err(CameraError::Configuration {
                details: format!(
                    "cannot decode {}: video decoding requires the camera feature",
                    path.display()
                ),
            }),
        }
    }
}
