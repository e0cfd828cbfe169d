use super::annotate::annotate;
use crate::analytics::Analytics;
use crate::config::{CameraConfig, MediaConfig};
use crate::detector::{Detection, Detector};
use crate::enhance::SharedFilter;
use crate::error::{CrowdwatchError, MediaError, Result};
use crate::events::{MonitorEvent, Publisher};
use crate::frame::{encode_jpeg, Frame};
use crate::loader::{LoadOutcome, LoadedModels, ModelLoader};
use crate::snapshot::{StatsSnapshot, SystemStatus};
use crate::source::FrameGrabber;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReport {
    pub success: bool,
    pub stats: StatsSnapshot,
    pub processed_artifact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoReport {
    pub success: bool,
    pub total_frames: u64,
    pub processed_frames: u64,
    pub detection_frames: u64,
    pub artifact_dir: Option<String>,
}

/// Detections reused between detection frames of a video.
///
/// Detection runs on every Nth frame; the frames in between are drawn with
/// the most recent result.
#[derive(Debug, Clone)]
pub struct StaleDetections {
    every_n: u64,
    persons: Vec<Detection>,
    faces: Vec<Detection>,
}

impl StaleDetections {
    pub fn new(every_n: u64) -> Self {
        Self {
            every_n: every_n.max(1),
            persons: Vec::new(),
            faces: Vec::new(),
        }
    }

    pub fn is_detection_frame(&self, frame_index: u64) -> bool {
        frame_index % self.every_n == 0
    }

    pub fn update(&mut self, persons: Vec<Detection>, faces: Vec<Detection>) {
        self.persons = persons;
        self.faces = faces;
    }

    pub fn persons(&self) -> &[Detection] {
        &self.persons
    }

    pub fn faces(&self) -> &[Detection] {
        &self.faces
    }
}

#[derive(Clone)]
struct Detectors {
    person: Arc<dyn Detector>,
    face: Arc<dyn Detector>,
    filter: Option<SharedFilter>,
}

impl Detectors {
    fn run(&self, frame: &Frame) -> Result<(Vec<Detection>, Vec<Detection>)> {
        let filtered;
        let frame = match &self.filter {
            Some(filter) => {
                filtered = filter.filter_frame(frame);
                &filtered
            }
            None => frame,
        };
        Ok((self.person.detect(frame)?, self.face.detect(frame)?))
    }
}

/// One-shot processing of uploaded images and videos
pub struct MediaProcessor {
    config: MediaConfig,
    camera: CameraConfig,
    loader: Arc<ModelLoader>,
    analytics: Arc<Analytics>,
    filter: Option<SharedFilter>,
    publisher: Arc<dyn Publisher>,
}

impl MediaProcessor {
    pub fn new(
        config: MediaConfig,
        camera: CameraConfig,
        loader: Arc<ModelLoader>,
        analytics: Arc<Analytics>,
        filter: Option<SharedFilter>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            config,
            camera,
            loader,
            analytics,
            filter,
            publisher,
        }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    async fn detectors(&self) -> Result<Detectors> {
        let models: LoadedModels = match self.loader.ensure_loaded().await? {
            LoadOutcome::Ready(models) => models,
            LoadOutcome::InProgress => return Err(MediaError::ModelsNotReady.into()),
        };
        Ok(Detectors {
            person: models.person,
            face: models.face,
            filter: self.filter.clone(),
        })
    }

    /// Detect people and faces in a still image and save an annotated copy
    pub async fn process_image(&self, path: &Path) -> Result<ImageReport> {
        let detectors = self.detectors().await?;
        let source = path.to_path_buf();
        let max_size = self.config.max_frame_size;

        let (persons, faces, frame_size, annotated) = blocking(move || {
            let decoded = image::open(&source)
                .map_err(|e| MediaError::Decode {
                    path: source.display().to_string(),
                    details: e.to_string(),
                })?
                .to_rgb8();
            let frame = Frame::new(0, decoded).fit_within(max_size);
            let (persons, faces) = detectors.run(&frame)?;
            let annotated = encode_jpeg(&annotate(&frame.image, &persons, &faces), JPEG_QUALITY)?;
            Ok((persons, faces, frame.size(), annotated))
        })
        .await?;

        let stats = self
            .analytics
            .summarize(persons, faces, frame_size, SystemStatus::ImageProcessed);

        let processed_artifact = if self.config.save_annotated_frames {
            let target = self.artifact_path(path);
            tokio::fs::create_dir_all(&self.config.processed_dir).await?;
            tokio::fs::write(&target, annotated).await?;
            Some(target.display().to_string())
        } else {
            None
        };

        info!(
            "Processed image {}: {} person(s), {} face(s)",
            path.display(),
            stats.person_count,
            stats.face_count
        );

        Ok(ImageReport {
            success: true,
            stats,
            processed_artifact,
        })
    }

    /// Read a video to the end, publishing progress and detections.
    ///
    /// Always finishes with a `video_complete` event, also on failure.
    pub async fn process_video(&self, path: &Path) -> Result<VideoReport> {
        match self.run_video(path).await {
            Ok(report) => {
                self.publisher.publish(MonitorEvent::VideoComplete {
                    success: true,
                    total_frames: report.total_frames,
                    processed_frames: report.processed_frames,
                    message: "Video processing complete".to_string(),
                });
                Ok(report)
            }
            Err(e) => {
                self.publisher.publish(MonitorEvent::VideoComplete {
                    success: false,
                    total_frames: 0,
                    processed_frames: 0,
                    message: format!("Video processing failed: {}", e),
                });
                Err(e)
            }
        }
    }

    async fn run_video(&self, path: &Path) -> Result<VideoReport> {
        let detectors = self.detectors().await?;
        let factory = self.loader.factory();
        let source_path = path.to_path_buf();
        let source = blocking(move || Ok(factory.file_source(&source_path)?)).await?;

        let mut grabber = FrameGrabber::new(source, self.camera.clone());
        grabber.open().await?;
        info!("Processing video {}", path.display());

        let artifact_dir = if self.config.save_annotated_frames {
            let dir = self.frames_dir(path);
            tokio::fs::create_dir_all(&dir).await?;
            Some(dir)
        } else {
            None
        };

        let progress_every = self.config.video_progress_every.max(1);
        let mut stale = StaleDetections::new(self.config.detect_every_n_frames);
        let mut total_hint: Option<u64> = None;
        let mut processed: u64 = 0;
        let mut detection_frames: u64 = 0;
        let mut gaps: u32 = 0;

        loop {
            let frame = match grabber.next_frame().await {
                Ok(Some(frame)) => {
                    gaps = 0;
                    frame.fit_within(self.config.max_frame_size)
                }
                Ok(None) if grabber.is_exhausted() => break,
                Ok(None) => {
                    gaps += 1;
                    if gaps >= self.config.max_consecutive_gaps {
                        warn!("Giving up on {} after {} empty reads", path.display(), gaps);
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    warn!("Video source failed after {} frames: {}", processed, e);
                    break;
                }
            };

            if total_hint.is_none() {
                total_hint = grabber.frame_count_hint();
            }

            let frame_index = processed;
            if stale.is_detection_frame(frame_index) {
                let runner = detectors.clone();
                let detect_frame = frame.clone();
                match blocking(move || runner.run(&detect_frame)).await {
                    Ok((persons, faces)) => {
                        detection_frames += 1;
                        self.publisher.publish(MonitorEvent::VideoDetection {
                            frame_index,
                            timestamp: frame_time(&frame, frame_index, grabber.fps_hint()),
                            person_detections: persons.clone(),
                            face_detections: faces.clone(),
                        });
                        self.publisher
                            .publish(MonitorEvent::DetectionUpdate(self.analytics.summarize(
                                persons.clone(),
                                faces.clone(),
                                frame.size(),
                                SystemStatus::ProcessingVideo,
                            )));
                        stale.update(persons, faces);
                    }
                    Err(e) => warn!("Detection failed on video frame {}: {}", frame_index, e),
                }
            }

            if let Some(dir) = &artifact_dir {
                let target = dir.join(format!("frame_{:06}.jpg", frame_index));
                let (persons, faces) = (stale.persons().to_vec(), stale.faces().to_vec());
                let image = Arc::clone(&frame.image);
                let jpeg = blocking(move || encode_jpeg(&annotate(&image, &persons, &faces), JPEG_QUALITY)).await?;
                tokio::fs::write(&target, jpeg).await?;
            }

            processed += 1;
            if processed % progress_every == 0 {
                let total = total_hint.unwrap_or(0).max(processed);
                self.publish_progress(processed, total);
            }
        }

        grabber.close().await;

        let total_frames = total_hint.unwrap_or(processed).max(processed);
        self.publish_progress(processed, total_frames);
        debug!(
            "Video {} done: {} frames, {} detection frames",
            path.display(),
            processed,
            detection_frames
        );

        Ok(VideoReport {
            success: true,
            total_frames,
            processed_frames: processed,
            detection_frames,
            artifact_dir: artifact_dir.map(|dir| dir.display().to_string()),
        })
    }

    fn publish_progress(&self, frame: u64, total_frames: u64) {
        let progress = if total_frames == 0 {
            100
        } else {
            (frame * 100 / total_frames).min(100) as u32
        };
        self.publisher.publish(MonitorEvent::VideoProgress {
            progress,
            frame,
            total_frames,
            message: format!("Processing video: {}% ({}/{})", progress, frame, total_frames),
        });
    }

    fn processed_name(source: &Path) -> String {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("upload");
        format!("processed_{}", stem)
    }

    fn artifact_path(&self, source: &Path) -> PathBuf {
        Path::new(&self.config.processed_dir).join(format!("{}.jpg", Self::processed_name(source)))
    }

    fn frames_dir(&self, source: &Path) -> PathBuf {
        Path::new(&self.config.processed_dir).join(format!("{}_frames", Self::processed_name(source)))
    }
}

fn frame_time(frame: &Frame, frame_index: u64, fps: Option<f64>) -> f64 {
    match (frame.position, fps) {
        (Some(position), _) => position.as_secs_f64(),
        (None, Some(fps)) if fps > 0.0 => frame_index as f64 / fps,
        _ => 0.0,
    }
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CrowdwatchError::system(format!("media task failed: {}", e)))?
}
