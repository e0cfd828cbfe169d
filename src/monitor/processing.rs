use super::state::LoopMetrics;
use crate::analytics::Analytics;
use crate::config::MonitorConfig;
use crate::detector::{Detection, Detector};
use crate::enhance::SharedFilter;
use crate::error::DetectorError;
use crate::events::{MonitorEvent, Publisher};
use crate::frame::Frame;
use crate::snapshot::{SnapshotCell, SystemStatus};
use crate::source::FrameGrabber;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

type DetectionOutput = (Vec<Detection>, Vec<Detection>, (u32, u32));

/// Capture, detect and publish until the token is cancelled
pub(super) struct ProcessingLoop {
    pub config: MonitorConfig,
    pub grabber: Arc<tokio::sync::Mutex<FrameGrabber>>,
    pub person: Arc<dyn Detector>,
    pub face: Arc<dyn Detector>,
    pub analytics: Arc<Analytics>,
    pub filter: Option<SharedFilter>,
    pub publisher: Arc<dyn Publisher>,
    pub snapshot: Arc<SnapshotCell>,
    pub metrics: Arc<LoopMetrics>,
    pub token: CancellationToken,
}

impl ProcessingLoop {
    pub async fn run(self) {
        info!("Processing loop started");

        let every_n = self.config.detect_every_n_frames.max(1);
        let log_every = self.config.failure_log_every.max(1);
        let mut frame_count: u64 = 0;
        let mut consecutive_failures: u64 = 0;
        let mut source_errors: u64 = 0;
        let mut last_publish: Option<Instant> = None;

        while !self.token.is_cancelled() {
            let read = {
                let mut grabber = self.grabber.lock().await;
                grabber.next_frame().await
            };

            match read {
                Ok(Some(frame)) => {
                    if consecutive_failures > 0 {
                        info!("Frame capture resumed after {} failures", consecutive_failures);
                        consecutive_failures = 0;
                        self.metrics.consecutive_failures.store(0, Ordering::Relaxed);
                    }
                    source_errors = 0;

                    frame_count += 1;
                    LoopMetrics::bump(&self.metrics.frames_captured);
                    trace!("Frame {} captured", frame.id);

                    if frame_count % every_n == 0 {
                        self.detection_cycle(frame, &mut last_publish).await;
                    }
                }
                Ok(None) => {
                    consecutive_failures += 1;
                    self.metrics
                        .consecutive_failures
                        .store(consecutive_failures, Ordering::Relaxed);
                    if consecutive_failures % log_every == 0 {
                        warn!("No frame from camera for {} consecutive reads", consecutive_failures);
                    }
                    if !self.pause(self.config.failure_backoff()).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    source_errors += 1;
                    LoopMetrics::bump(&self.metrics.source_errors);
                    if source_errors == 1 || source_errors % log_every == 0 {
                        error!("Frame source error ({} in a row): {}", source_errors, e);
                    }
                    if !self.pause(self.config.error_backoff()).await {
                        break;
                    }
                    continue;
                }
            }

            if !self.pause(self.config.poll_interval()).await {
                break;
            }
        }

        info!("Processing loop exited after {} frames", frame_count);
    }

    /// Sleep for `duration`; false when cancelled first
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn detection_cycle(&self, frame: Frame, last_publish: &mut Option<Instant>) {
        let frame_id = frame.id;
        let person = Arc::clone(&self.person);
        let face = Arc::clone(&self.face);
        let filter = self.filter.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<DetectionOutput, DetectorError> {
            let frame = match filter {
                Some(filter) => filter.filter_frame(&frame),
                None => frame,
            };
            let persons = person.detect(&frame)?;
            let faces = face.detect(&frame)?;
            Ok((persons, faces, frame.size()))
        })
        .await;

        let (persons, faces, frame_size) = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                LoopMetrics::bump(&self.metrics.detection_failures);
                warn!("Detection failed on frame {}: {}", frame_id, e);
                return;
            }
            Err(e) => {
                LoopMetrics::bump(&self.metrics.detection_failures);
                error!("Detection task failed on frame {}: {}", frame_id, e);
                return;
            }
        };

        LoopMetrics::bump(&self.metrics.detection_cycles);
        let snapshot = self.snapshot.store(self.analytics.summarize(
            persons,
            faces,
            frame_size,
            SystemStatus::MonitoringActive,
        ));
        debug!(
            "Frame {}: {} person(s), {} face(s), density {}",
            frame_id, snapshot.person_count, snapshot.face_count, snapshot.crowd_density
        );

        let due = last_publish.map_or(true, |at| at.elapsed() >= self.config.publish_interval());
        if due {
            self.publisher
                .publish(MonitorEvent::DetectionUpdate(snapshot.as_ref().clone()));
            *last_publish = Some(Instant::now());
            LoopMetrics::bump(&self.metrics.snapshots_published);
        }
    }
}
