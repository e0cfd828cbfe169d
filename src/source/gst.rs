use super::backend::{pipeline_description, SourceSpec, FILE_BACKEND};
use super::FrameSource;
use crate::error::CameraError;
use crate::frame::Frame;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Seconds to wait for a pipeline to reach PLAYING
const STATE_CHANGE_TIMEOUT_SECS: u64 = 3;

/// Camera or video file read through a GStreamer appsink
pub struct GstSource {
    name: String,
    spec: SourceSpec,
    read_timeout: Duration,
    backend: Option<String>,
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    frame_counter: u64,
    exhausted: bool,
    fps: Option<f64>,
}

impl GstSource {
    pub fn new(spec: SourceSpec, read_timeout: Duration) -> Result<Self, CameraError> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        Ok(Self {
            name: spec.to_string(),
            spec,
            read_timeout,
            backend: None,
            pipeline: None,
            appsink: None,
            frame_counter: 0,
            exhausted: false,
            fps: None,
        })
    }

    fn launch(&mut self, backend: &str, mode: Option<(u32, u32, u32)>) -> Result<(), CameraError> {
        let description = pipeline_description(backend, &self.spec, mode);
        debug!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| CameraError::Configuration {
                details: "Pipeline has no appsink named sink".to_string(),
            })?;

        let started = pipeline
            .set_state(gstreamer::State::Playing)
            .and_then(|_| {
                pipeline
                    .state(gstreamer::ClockTime::from_seconds(STATE_CHANGE_TIMEOUT_SECS))
                    .0
            });

        if let Err(e) = started {
            let _ = pipeline.set_state(gstreamer::State::Null);
            return Err(CameraError::Configuration {
                details: format!("{} did not start: {}", backend, e),
            });
        }

        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        self.exhausted = false;
        Ok(())
    }

    fn shutdown_pipeline(&mut self) {
        self.appsink = None;
        if let Some(pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop pipeline for {}: {}", self.name, e);
            }
        }
    }

    /// Surface asynchronous pipeline errors, which is how unplugged devices show up
    fn check_bus(&self) -> Result<(), CameraError> {
        let Some(bus) = self.pipeline.as_ref().and_then(|p| p.bus()) else {
            return Ok(());
        };

        if let Some(message) = bus.pop_filtered(&[gstreamer::MessageType::Error]) {
            if let gstreamer::MessageView::Error(err) = message.view() {
                return Err(CameraError::DeviceRemoved {
                    details: format!("{} ({:?})", err.error(), err.debug()),
                });
            }
        }
        Ok(())
    }

    fn sample_to_frame(&mut self, sample: &gstreamer::Sample) -> Option<Frame> {
        let buffer = sample.buffer()?;
        let caps = sample.caps()?;
        let video_info = VideoInfo::from_caps(caps).ok()?;
        let map = buffer.map_readable().ok()?;

        let width = video_info.width();
        let height = video_info.height();
        let stride = video_info.stride().first().copied().unwrap_or(0).max(0) as usize;
        let row_bytes = width as usize * 3;
        if stride < row_bytes {
            return None;
        }

        let data = map.as_slice();
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(data.get(start..start + row_bytes)?);
        }

        let fps = video_info.fps();
        if fps.denom() > 0 && fps.numer() > 0 {
            self.fps = Some(fps.numer() as f64 / fps.denom() as f64);
        }

        let image = RgbImage::from_raw(width, height, pixels)?;
        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        let mut frame = Frame::new(frame_id, image);
        if let Some(pts) = buffer.pts() {
            frame = frame.with_position(Duration::from_nanos(pts.nseconds()));
        }
        trace!("Captured frame {} ({}x{})", frame_id, width, height);
        Some(frame)
    }
}

#[async_trait]
impl FrameSource for GstSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn candidate_backends(&self, configured: &[String]) -> Vec<String> {
        if self.spec.is_file() {
            vec![FILE_BACKEND.to_string()]
        } else {
            configured.to_vec()
        }
    }

    async fn open_backend(&mut self, backend: &str) -> Result<(), CameraError> {
        self.shutdown_pipeline();
        self.launch(backend, None)?;
        self.backend = Some(backend.to_string());
        info!("Opened {} through {}", self.name, backend);
        Ok(())
    }

    async fn apply_resolution(
        &mut self,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Option<(u32, u32)>, CameraError> {
        let backend = self.backend.clone().ok_or(CameraError::HandleInvalid)?;
        if self.spec.is_file() {
            return Ok(None);
        }

        self.shutdown_pipeline();
        match self.launch(&backend, Some((width, height, fps))) {
            Ok(()) => Ok(Some((width, height))),
            Err(e) => {
                debug!("{}x{} rejected by {}: {}", width, height, self.name, e);
                self.launch(&backend, None)?;
                Ok(None)
            }
        }
    }

    async fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        let appsink = self.appsink.clone().ok_or(CameraError::HandleInvalid)?;
        self.check_bus()?;

        let timeout = gstreamer::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let pulled = tokio::task::spawn_blocking(move || {
            let sample = appsink.try_pull_sample(timeout);
            let eos = sample.is_none() && appsink.is_eos();
            (sample, eos)
        })
        .await
        .map_err(|e| CameraError::DeviceRemoved {
            details: format!("read task failed: {}", e),
        })?;

        match pulled {
            (Some(sample), _) => Ok(self.sample_to_frame(&sample)),
            (None, true) => {
                if !self.exhausted {
                    debug!("{} reached end of stream", self.name);
                }
                self.exhausted = true;
                Ok(None)
            }
            (None, false) => Ok(None),
        }
    }

    async fn close(&mut self) {
        if self.pipeline.is_some() {
            info!("Releasing {}", self.name);
        }
        self.shutdown_pipeline();
        self.backend = None;
    }

    fn is_open(&self) -> bool {
        self.pipeline.is_some()
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn frame_count_hint(&self) -> Option<u64> {
        if !self.spec.is_file() {
            return None;
        }
        let duration = self
            .pipeline
            .as_ref()?
            .query_duration::<gstreamer::ClockTime>()?;
        let fps = self.fps?;
        Some((duration.nseconds() as f64 / 1e9 * fps).round() as u64)
    }

    fn fps_hint(&self) -> Option<f64> {
        self.fps
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        self.shutdown_pipeline();
    }
}
