use super::*;
use crate::analytics::Analytics;
use crate::config::CrowdwatchConfig;
use crate::detector::{DetectionClass, FixedDetector};
use crate::error::StartError;
use crate::events::{EventBus, MonitorEvent, Publisher};
use crate::loader::fake::{fast_config, FakeFactory};
use crate::loader::{ComponentFactory, ModelLoader};
use crate::snapshot::SystemStatus;
use crate::source::{MockFrameSource, MockRead};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Harness {
    monitor: Arc<CrowdMonitor>,
    factory: Arc<FakeFactory>,
    bus: EventBus,
}

fn harness_with(config: CrowdwatchConfig, factory: FakeFactory) -> Harness {
    let factory = Arc::new(factory);
    let bus = EventBus::new(512);
    let publisher: Arc<dyn Publisher> = Arc::new(bus.clone());
    let loader = ModelLoader::new(
        Arc::clone(&factory) as Arc<dyn ComponentFactory>,
        config.camera.clone(),
        Arc::clone(&publisher),
    );

    let monitor = CrowdMonitor::builder()
        .config(config.monitor.clone())
        .loader(Arc::new(loader))
        .analytics(Arc::new(Analytics::new(config.analytics.clone())))
        .publisher(publisher)
        .build()
        .unwrap();

    Harness {
        monitor: Arc::new(monitor),
        factory,
        bus,
    }
}

fn harness(factory: FakeFactory) -> Harness {
    harness_with(fast_config(), factory)
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_stop_when_idle_has_no_side_effects() {
    let h = harness(FakeFactory::new());
    let before = h.monitor.current_snapshot();

    let response = h.monitor.stop_monitoring().await;
    assert!(response.success);
    assert_eq!(response.message, NOT_MONITORING_MESSAGE);

    assert_eq!(h.monitor.mode(), RunMode::Idle);
    assert_eq!(h.monitor.current_snapshot(), before);
    assert_eq!(h.factory.resolve_calls(), 0);
    assert_eq!(h.monitor.metrics().frames_captured, 0);
}

#[tokio::test]
async fn test_start_detect_and_stop() {
    let h = harness(FakeFactory::new());
    let mut events = h.bus.subscribe();

    let response = h.monitor.start_monitoring().await;
    assert!(response.success, "start failed: {}", response.message);
    assert_eq!(response.message, STARTED_MESSAGE);
    assert!(h.monitor.is_running());

    let monitor = Arc::clone(&h.monitor);
    assert!(wait_until(move || monitor.metrics().detection_cycles >= 2).await);

    let snapshot = h.monitor.current_snapshot();
    assert_eq!(snapshot.person_count, 3);
    assert_eq!(snapshot.face_count, 2);
    assert_eq!(snapshot.system_status, SystemStatus::MonitoringActive);

    let response = h.monitor.stop_monitoring().await;
    assert!(response.success);
    assert_eq!(response.message, STOPPED_MESSAGE);
    assert_eq!(h.monitor.mode(), RunMode::Idle);

    let probe = h.factory.last_probe().unwrap();
    assert!(!probe.is_open());

    let mut saw_active = false;
    let mut last_update = None;
    while let Ok(event) = events.try_recv() {
        match event {
            MonitorEvent::MonitoringStatus { active: true, .. } => saw_active = true,
            MonitorEvent::DetectionUpdate(snapshot) => last_update = Some(snapshot),
            _ => {}
        }
    }
    assert!(saw_active);
    assert_eq!(last_update.unwrap().last_activity, STOPPED_MESSAGE);
}

#[tokio::test]
async fn test_snapshot_is_zeroed_after_stop() {
    let h = harness(FakeFactory::new());
    h.monitor.start().await.unwrap();

    let monitor = Arc::clone(&h.monitor);
    assert!(wait_until(move || monitor.current_snapshot().person_count == 3).await);
    assert!(h.monitor.stop().await);

    let snapshot = h.monitor.current_snapshot();
    assert_eq!(snapshot.person_count, 0);
    assert_eq!(snapshot.face_count, 0);
    assert_eq!(snapshot.crowd_density, "EMPTY");
    assert_eq!(snapshot.alert_level, "NORMAL");
    assert_eq!(snapshot.system_status, SystemStatus::Ready);
    assert!(snapshot.person_detections.is_empty());
}

#[tokio::test]
async fn test_concurrent_start_is_rejected() {
    let h = harness(FakeFactory::new().with_load_delay(Duration::from_millis(50)));

    let (first, second) = tokio::join!(h.monitor.start(), h.monitor.start());
    assert_eq!(first, Ok(()));
    assert_eq!(second, Err(StartError::StillInitializing));
    assert_eq!(h.factory.resolve_calls(), 1);

    assert_eq!(h.monitor.start().await, Err(StartError::AlreadyRunning));
    let response = h.monitor.start_monitoring().await;
    assert!(!response.success);
    assert_eq!(response.message, "Already monitoring");

    h.monitor.stop().await;
}

#[tokio::test]
async fn test_camera_unavailable_leaves_idle() {
    let h = harness(FakeFactory::new().with_source(|| MockFrameSource::new(64, 48).unavailable()));

    match h.monitor.start().await {
        Err(StartError::CameraUnavailable(reason)) => assert!(reason.contains("unavailable")),
        other => panic!("Expected CameraUnavailable, got {:?}", other),
    }
    assert_eq!(h.monitor.mode(), RunMode::Idle);

    let response = h.monitor.start_monitoring().await;
    assert!(!response.success);
    assert!(response.message.starts_with("Camera access failed"));
}

#[tokio::test]
async fn test_no_frames_closes_source() {
    let h = harness(FakeFactory::new().with_source(|| MockFrameSource::new(64, 48).always_gap()));

    assert_eq!(h.monitor.start().await, Err(StartError::NoFramesAvailable));
    assert_eq!(h.monitor.mode(), RunMode::Idle);

    let probe = h.factory.last_probe().unwrap();
    assert_eq!(probe.closes(), 1);
    assert!(!probe.is_open());
}

#[tokio::test]
async fn test_consecutive_gaps_never_trigger_detection() {
    let factory = FakeFactory::new().with_source(|| {
        MockFrameSource::new(64, 48)
            .with_script(vec![MockRead::Frame, MockRead::Frame])
            .always_gap()
    });
    let h = harness(factory);
    h.monitor.start().await.unwrap();

    let monitor = Arc::clone(&h.monitor);
    assert!(wait_until(move || monitor.metrics().consecutive_failures >= 100).await);

    let metrics = h.monitor.metrics();
    assert_eq!(metrics.frames_captured, 0);
    assert_eq!(metrics.detection_cycles, 0);
    assert_eq!(h.factory.person().call_count(), 0);
    assert!(h.monitor.is_running());

    h.monitor.stop().await;
}

#[tokio::test]
async fn test_model_load_failure_then_retry() {
    let h = harness(FakeFactory::new().failing_person_loads(1));

    match h.monitor.start().await {
        Err(StartError::ModelLoadFailed(_)) => {}
        other => panic!("Expected ModelLoadFailed, got {:?}", other),
    }
    assert_eq!(h.monitor.mode(), RunMode::Idle);

    h.monitor.start().await.unwrap();
    assert!(h.monitor.is_running());
    h.monitor.stop().await;
}

#[tokio::test]
async fn test_detection_failures_keep_loop_alive() {
    let factory = FakeFactory::new().with_detectors(
        FixedDetector::failing("person", DetectionClass::Person),
        FixedDetector::empty("face", DetectionClass::Face),
    );
    let h = harness(factory);
    h.monitor.start().await.unwrap();

    let monitor = Arc::clone(&h.monitor);
    assert!(wait_until(move || monitor.metrics().detection_failures >= 3).await);

    let metrics = h.monitor.metrics();
    assert_eq!(metrics.detection_cycles, 0);
    assert!(h.monitor.is_running());

    h.monitor.stop().await;
}

#[tokio::test]
async fn test_updates_are_throttled() {
    let mut config = fast_config();
    config.monitor.publish_interval_ms = 60_000;
    let h = harness_with(config, FakeFactory::new());
    h.monitor.start().await.unwrap();

    let monitor = Arc::clone(&h.monitor);
    assert!(wait_until(move || monitor.metrics().detection_cycles >= 5).await);
    assert_eq!(h.monitor.metrics().snapshots_published, 1);

    h.monitor.stop().await;
}

#[tokio::test]
async fn test_abandoned_start_releases_camera() {
    let mut config = fast_config();
    config.camera.settle_ms = 500;
    let h = harness_with(config, FakeFactory::new());

    let attempt = tokio::time::timeout(Duration::from_millis(100), h.monitor.start()).await;
    assert!(attempt.is_err());

    let monitor = Arc::clone(&h.monitor);
    assert!(wait_until(move || monitor.mode() == RunMode::Idle).await);

    let probe = h.factory.last_probe().unwrap();
    assert!(probe.opens() >= 1);
    assert!(!probe.is_open());

    h.monitor.start().await.unwrap();
    assert!(h.monitor.is_running());
    h.monitor.stop().await;
}

#[tokio::test]
async fn test_abandoned_start_during_model_load() {
    let h = harness(FakeFactory::new().with_load_delay(Duration::from_millis(300)));

    let attempt = tokio::time::timeout(Duration::from_millis(50), h.monitor.start()).await;
    assert!(attempt.is_err());
    assert_eq!(h.monitor.mode(), RunMode::Idle);

    // The abandoned load holds no lock, so the retry loads again
    h.monitor.start().await.unwrap();
    assert!(h.monitor.is_running());
    h.monitor.stop().await;
}

#[tokio::test]
async fn test_stop_aborts_loop_stuck_in_detection() {
    let mut config = fast_config();
    config.monitor.stop_timeout_ms = 50;
    let factory = FakeFactory::new().with_detectors(
        FixedDetector::with_count("person", DetectionClass::Person, 3)
            .with_delay(Duration::from_millis(400)),
        FixedDetector::with_count("face", DetectionClass::Face, 2),
    );
    let h = harness_with(config, factory);
    h.monitor.start().await.unwrap();

    let factory = Arc::clone(&h.factory);
    assert!(wait_until(move || factory.person().call_count() >= 1).await);

    let started = Instant::now();
    assert!(h.monitor.stop().await);
    assert!(started.elapsed() < Duration::from_millis(300));

    assert_eq!(h.monitor.mode(), RunMode::Idle);
    assert!(!h.factory.last_probe().unwrap().is_open());

    // The aborted cycle never lands a snapshot over the reset one
    tokio::time::sleep(Duration::from_millis(500)).await;
    let snapshot = h.monitor.current_snapshot();
    assert_eq!(snapshot.person_count, 0);
    assert_eq!(snapshot.crowd_density, "EMPTY");
    assert_eq!(snapshot.system_status, SystemStatus::Ready);
}
