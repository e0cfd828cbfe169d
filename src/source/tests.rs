use super::*;
use crate::config::CameraConfig;
use crate::error::CameraError;

fn fast_config() -> CameraConfig {
    CameraConfig {
        backends: vec!["v4l2src".into(), "libcamerasrc".into(), "autovideosrc".into()],
        resolutions: vec![(1280, 720), (640, 480)],
        settle_ms: 0,
        warmup_discard_frames: 2,
        warmup_attempts: 3,
        warmup_retry_delay_ms: 1,
        read_retries: 3,
        read_retry_delay_ms: 1,
        ..CameraConfig::default()
    }
}

fn grabber(source: MockFrameSource) -> FrameGrabber {
    FrameGrabber::new(Box::new(source), fast_config())
}

#[tokio::test]
async fn test_open_falls_back_through_backends() {
    let mut grabber = grabber(MockFrameSource::new(64, 48).with_backends(["autovideosrc"]));

    let backend = grabber.open().await.unwrap();
    assert_eq!(backend, "autovideosrc");
    assert_eq!(grabber.backend(), Some("autovideosrc"));
    assert!(grabber.is_open());
}

#[tokio::test]
async fn test_open_reports_every_backend_tried() {
    let mut grabber = grabber(MockFrameSource::new(64, 48).unavailable());

    match grabber.open().await {
        Err(CameraError::DeviceUnavailable { tried, .. }) => {
            assert_eq!(tried, vec!["v4l2src", "libcamerasrc", "autovideosrc"]);
        }
        other => panic!("Expected DeviceUnavailable, got {:?}", other),
    }
    assert!(!grabber.is_open());
}

#[tokio::test]
async fn test_configure_accepts_first_applied_resolution() {
    let mut grabber = grabber(MockFrameSource::new(64, 48).with_resolutions(vec![(640, 480)]));
    grabber.open().await.unwrap();

    assert_eq!(grabber.configure().await, Some((640, 480)));
    let frame = grabber.next_frame().await.unwrap().unwrap();
    assert_eq!(frame.size(), (640, 480));
}

#[tokio::test]
async fn test_warm_up_tolerates_initial_gaps() {
    let source = MockFrameSource::new(64, 48).with_script(vec![
        MockRead::Gap,
        MockRead::Gap,
        MockRead::Gap,
        MockRead::Gap,
        MockRead::Frame,
    ]);
    let probe = source.probe();
    let mut grabber = grabber(source);

    grabber.prepare().await.unwrap();
    assert!(grabber.is_open());
    assert_eq!(probe.reads(), 5);
}

#[tokio::test]
async fn test_warm_up_without_frames_closes_source() {
    let source = MockFrameSource::new(64, 48).always_gap();
    let probe = source.probe();
    let mut grabber = grabber(source);

    match grabber.prepare().await {
        Err(CameraError::NoFramesAvailable { attempts }) => assert_eq!(attempts, 3),
        other => panic!("Expected NoFramesAvailable, got {:?}", other),
    }
    assert!(!probe.is_open());
    assert_eq!(probe.closes(), 1);
}

#[tokio::test]
async fn test_next_frame_retries_before_reporting_gap() {
    let source = MockFrameSource::new(64, 48).always_gap();
    let probe = source.probe();
    let mut grabber = grabber(source);
    grabber.open().await.unwrap();

    assert!(grabber.next_frame().await.unwrap().is_none());
    assert_eq!(probe.reads(), 4);
    assert_eq!(grabber.gaps(), 1);
}

#[tokio::test]
async fn test_next_frame_recovers_within_retries() {
    let source = MockFrameSource::new(64, 48).with_script(vec![MockRead::Gap, MockRead::Gap]);
    let mut grabber = grabber(source);
    grabber.open().await.unwrap();

    assert!(grabber.next_frame().await.unwrap().is_some());
    assert_eq!(grabber.gaps(), 0);
    assert_eq!(grabber.frames_read(), 1);
}

#[tokio::test]
async fn test_removed_device_is_fatal() {
    let source = MockFrameSource::new(64, 48).with_script(vec![MockRead::Frame, MockRead::Removed]);
    let mut grabber = grabber(source);
    grabber.open().await.unwrap();

    assert!(grabber.next_frame().await.unwrap().is_some());
    let err = grabber.next_frame().await.unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let source = MockFrameSource::new(64, 48);
    let probe = source.probe();
    let mut grabber = grabber(source);
    grabber.open().await.unwrap();

    grabber.close().await;
    grabber.close().await;
    assert_eq!(probe.closes(), 1);
    assert!(grabber.next_frame().await.unwrap().is_none());
    assert_eq!(grabber.backend(), None);
}

#[tokio::test]
async fn test_finite_source_exhausts() {
    let mut grabber = grabber(MockFrameSource::new(32, 32).finite(2));
    grabber.open().await.unwrap();
    assert_eq!(grabber.frame_count_hint(), Some(2));

    let first = grabber.next_frame().await.unwrap().unwrap();
    assert!(first.position.is_some());
    assert!(grabber.next_frame().await.unwrap().is_some());
    assert!(grabber.next_frame().await.unwrap().is_none());
    assert!(grabber.is_exhausted());
}

#[tokio::test]
async fn test_pattern_source_follows_configured_size() {
    let mut grabber = FrameGrabber::new(Box::new(PatternSource::new("pattern:0", 30)), fast_config());
    grabber.open().await.unwrap();
    assert_eq!(grabber.configure().await, Some((1280, 720)));

    let frame = grabber.next_frame().await.unwrap().unwrap();
    assert_eq!(frame.size(), (1280, 720));
    assert_eq!(grabber.fps_hint(), Some(30.0));
}
