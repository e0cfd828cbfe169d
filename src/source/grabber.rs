use super::FrameSource;
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::Frame;
use tracing::{debug, info, warn};

/// Applies opening, warm-up and retry policy on top of a raw [`FrameSource`].
///
/// Only one owner reads at a time; the loader keeps the grabber behind an
/// async mutex so the monitor loop and teardown never race on the handle.
pub struct FrameGrabber {
    source: Box<dyn FrameSource>,
    config: CameraConfig,
    backend: Option<String>,
    resolution: Option<(u32, u32)>,
    frames_read: u64,
    gaps: u64,
}

impl FrameGrabber {
    pub fn new(source: Box<dyn FrameSource>, config: CameraConfig) -> Self {
        Self {
            source,
            config,
            backend: None,
            resolution: None,
            frames_read: 0,
            gaps: 0,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Backend that opened the source, if any
    pub fn backend(&self) -> Option<&str> {
        self.backend.as_deref()
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        self.resolution
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn gaps(&self) -> u64 {
        self.gaps
    }

    pub fn is_open(&self) -> bool {
        self.source.is_open()
    }

    pub fn is_exhausted(&self) -> bool {
        self.source.is_exhausted()
    }

    pub fn frame_count_hint(&self) -> Option<u64> {
        self.source.frame_count_hint()
    }

    pub fn fps_hint(&self) -> Option<f64> {
        self.source.fps_hint()
    }

    /// Try each backend in preference order until one opens.
    pub async fn open(&mut self) -> Result<String, CameraError> {
        if let (true, Some(backend)) = (self.source.is_open(), self.backend.clone()) {
            return Ok(backend);
        }

        let candidates = self.source.candidate_backends(&self.config.backends);
        let mut tried = Vec::with_capacity(candidates.len());

        for backend in candidates {
            match self.source.open_backend(&backend).await {
                Ok(()) => {
                    info!("{} opened with backend {}", self.source.name(), backend);
                    self.backend = Some(backend.clone());
                    return Ok(backend);
                }
                Err(e) => {
                    warn!("Backend {} failed for {}: {}", backend, self.source.name(), e);
                    tried.push(backend);
                }
            }
        }

        Err(CameraError::DeviceUnavailable {
            source_name: self.source.name().to_string(),
            tried,
        })
    }

    /// Request each configured resolution until the device applies one.
    ///
    /// Falls back to the first size the device reports when none match
    /// exactly. `None` means the device kept its own default.
    pub async fn configure(&mut self) -> Option<(u32, u32)> {
        let mut fallback = None;

        for &(width, height) in &self.config.resolutions {
            match self
                .source
                .apply_resolution(width, height, self.config.fps)
                .await
            {
                Ok(Some(applied)) if applied == (width, height) => {
                    info!("Camera configured at {}x{} @ {}fps", width, height, self.config.fps);
                    self.resolution = Some(applied);
                    return self.resolution;
                }
                Ok(Some(applied)) => {
                    debug!("Requested {}x{}, device reported {}x{}", width, height, applied.0, applied.1);
                    fallback.get_or_insert(applied);
                }
                Ok(None) => debug!("Resolution {}x{} not applied", width, height),
                Err(e) => warn!("Failed to apply {}x{}: {}", width, height, e),
            }
        }

        if let Some((width, height)) = fallback {
            info!("Camera running at device-reported {}x{}", width, height);
        } else {
            warn!("No configured resolution applied, using device default");
        }
        self.resolution = fallback;
        self.resolution
    }

    /// Let a freshly opened device settle and prove it delivers frames.
    pub async fn warm_up(&mut self) -> Result<(), CameraError> {
        tokio::time::sleep(self.config.settle_delay()).await;

        for _ in 0..self.config.warmup_discard_frames {
            if let Err(e) = self.source.read().await {
                if e.is_fatal() {
                    return Err(e);
                }
            }
        }

        let base_delay = self.config.warmup_retry_delay();
        for attempt in 1..=self.config.warmup_attempts {
            match self.source.read().await {
                Ok(Some(frame)) if !frame.is_degenerate() => {
                    info!(
                        "Camera delivered a {}x{} test frame on attempt {}",
                        frame.width(),
                        frame.height(),
                        attempt
                    );
                    return Ok(());
                }
                Ok(_) => debug!("Warm-up attempt {} produced no frame", attempt),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("Warm-up attempt {} failed: {}", attempt, e),
            }

            if attempt < self.config.warmup_attempts {
                tokio::time::sleep(base_delay * attempt).await;
            }
        }

        Err(CameraError::NoFramesAvailable {
            attempts: self.config.warmup_attempts,
        })
    }

    /// Open, configure and warm up. The source is closed again on failure.
    pub async fn prepare(&mut self) -> Result<(), CameraError> {
        self.open().await?;
        self.configure().await;

        if let Err(e) = self.warm_up().await {
            self.close().await;
            return Err(e);
        }
        Ok(())
    }

    /// Read the next frame with short retries.
    ///
    /// `Ok(None)` is a gap (including a closed or exhausted source); only a
    /// device that is gone for good returns an error.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if !self.source.is_open() || self.source.is_exhausted() {
            return Ok(None);
        }

        let retries = self.config.read_retries;
        for attempt in 0..=retries {
            match self.source.read().await {
                Ok(Some(frame)) if !frame.is_degenerate() => {
                    self.frames_read += 1;
                    return Ok(Some(frame));
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => debug!("Read from {} failed: {}", self.source.name(), e),
            }

            if self.source.is_exhausted() {
                break;
            }
            if attempt < retries {
                tokio::time::sleep(self.config.read_retry_delay()).await;
            }
        }

        self.gaps += 1;
        Ok(None)
    }

    /// Release the source. Safe to call repeatedly.
    pub async fn close(&mut self) {
        self.source.close().await;
        self.backend = None;
        self.resolution = None;
    }
}
