use super::FrameSource;
use crate::error::CameraError;
use crate::frame::Frame;
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Outcome of one scripted read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockRead {
    Frame,
    Gap,
    Removed,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    opens: AtomicU64,
    closes: AtomicU64,
    reads: AtomicU64,
    open: AtomicBool,
}

/// Shared view into a [`MockFrameSource`] that outlives the boxed source
#[derive(Debug, Clone, Default)]
pub struct MockProbe {
    counters: Arc<ProbeCounters>,
}

impl MockProbe {
    pub fn opens(&self) -> u64 {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u64 {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u64 {
        self.counters.reads.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.counters.open.load(Ordering::SeqCst)
    }
}

/// Scripted frame source for tests and dry runs.
///
/// Reads follow the script first and then repeat the fallback step.
pub struct MockFrameSource {
    name: String,
    width: u32,
    height: u32,
    available: Option<Vec<String>>,
    resolutions: Option<Vec<(u32, u32)>>,
    script: VecDeque<MockRead>,
    fallback: MockRead,
    limit: Option<u64>,
    next_id: u64,
    exhausted: bool,
    open: bool,
    probe: MockProbe,
}

impl MockFrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            name: "mock".to_string(),
            width,
            height,
            available: None,
            resolutions: None,
            script: VecDeque::new(),
            fallback: MockRead::Frame,
            limit: None,
            next_id: 0,
            exhausted: false,
            open: false,
            probe: MockProbe::default(),
        }
    }

    pub fn named<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Only these backends open; the rest fail
    pub fn with_backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available = Some(backends.into_iter().map(Into::into).collect());
        self
    }

    /// No backend opens
    pub fn unavailable(self) -> Self {
        self.with_backends(Vec::<String>::new())
    }

    /// Only these capture modes are applied
    pub fn with_resolutions(mut self, resolutions: Vec<(u32, u32)>) -> Self {
        self.resolutions = Some(resolutions);
        self
    }

    pub fn with_script(mut self, script: Vec<MockRead>) -> Self {
        self.script = script.into();
        self
    }

    /// Step repeated once the script runs out
    pub fn then(mut self, step: MockRead) -> Self {
        self.fallback = step;
        self
    }

    pub fn always_gap(self) -> Self {
        self.then(MockRead::Gap)
    }

    /// Behave like a file holding `frames` frames at 30fps
    pub fn finite(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }

    fn render(&mut self) -> Frame {
        let id = self.next_id;
        self.next_id += 1;
        let shade = (id % 200) as u8 + 30;
        let frame = Frame::new(id, RgbImage::from_pixel(self.width, self.height, Rgb([shade; 3])));
        match self.limit {
            Some(_) => frame.with_position(Duration::from_millis(id * 1000 / 30)),
            None => frame,
        }
    }
}

#[async_trait]
impl FrameSource for MockFrameSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open_backend(&mut self, backend: &str) -> Result<(), CameraError> {
        let accepted = self
            .available
            .as_ref()
            .map_or(true, |list| list.iter().any(|b| b == backend));
        if !accepted {
            return Err(CameraError::Configuration {
                details: format!("{} not available", backend),
            });
        }

        self.open = true;
        self.probe.counters.opens.fetch_add(1, Ordering::SeqCst);
        self.probe.counters.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn apply_resolution(
        &mut self,
        width: u32,
        height: u32,
        _fps: u32,
    ) -> Result<Option<(u32, u32)>, CameraError> {
        if !self.open {
            return Err(CameraError::HandleInvalid);
        }
        let supported = self
            .resolutions
            .as_ref()
            .map_or(true, |list| list.contains(&(width, height)));
        if supported {
            self.width = width;
            self.height = height;
            Ok(Some((width, height)))
        } else {
            Ok(None)
        }
    }

    async fn read(&mut self) -> Result<Option<Frame>, CameraError> {
        self.probe.counters.reads.fetch_add(1, Ordering::SeqCst);
        if !self.open {
            return Err(CameraError::HandleInvalid);
        }
        if self.exhausted {
            return Ok(None);
        }

        match self.script.pop_front().unwrap_or(self.fallback) {
            MockRead::Frame => {
                if self.limit.is_some_and(|limit| self.next_id >= limit) {
                    self.exhausted = true;
                    return Ok(None);
                }
                Ok(Some(self.render()))
            }
            MockRead::Gap => Ok(None),
            MockRead::Removed => Err(CameraError::DeviceRemoved {
                details: format!("{} unplugged", self.name),
            }),
        }
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.probe.counters.closes.fetch_add(1, Ordering::SeqCst);
            self.probe.counters.open.store(false, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.limit
    }

    fn fps_hint(&self) -> Option<f64> {
        self.limit.map(|_| 30.0)
    }
}
