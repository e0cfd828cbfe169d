use super::server::StreamServerBuilder;
use crate::analytics::Analytics;
use crate::config::{CrowdwatchConfig, StreamConfig};
use crate::events::{EventBus, MonitorEvent, Publisher};
use crate::loader::fake::{fast_config, FakeFactory};
use crate::loader::{ComponentFactory, LoaderState, ModelLoader};
use crate::media::MediaProcessor;
use crate::monitor::{CrowdMonitor, RunMode};
use crate::source::MockFrameSource;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestServer {
    app: Router,
    monitor: Arc<CrowdMonitor>,
    bus: EventBus,
    _dir: TempDir,
}

fn stream_config() -> StreamConfig {
    StreamConfig {
        ip: "127.0.0.1".to_string(),
        port: 0,
        static_dir: None,
    }
}

fn test_server(factory: FakeFactory) -> TestServer {
    let dir = TempDir::new().unwrap();
    let mut config: CrowdwatchConfig = fast_config();
    config.media.upload_dir = dir.path().join("uploads").to_string_lossy().into_owned();
    config.media.processed_dir = dir.path().join("processed").to_string_lossy().into_owned();
    config.media.video_progress_every = 5;

    let bus = EventBus::new(512);
    let publisher: Arc<dyn Publisher> = Arc::new(bus.clone());
    let loader = Arc::new(ModelLoader::new(
        Arc::new(factory) as Arc<dyn ComponentFactory>,
        config.camera.clone(),
        Arc::clone(&publisher),
    ));
    let analytics = Arc::new(Analytics::new(config.analytics.clone()));

    let monitor = Arc::new(
        CrowdMonitor::builder()
            .config(config.monitor.clone())
            .loader(Arc::clone(&loader))
            .analytics(Arc::clone(&analytics))
            .publisher(Arc::clone(&publisher))
            .build()
            .unwrap(),
    );
    let media = Arc::new(MediaProcessor::new(
        config.media.clone(),
        config.camera.clone(),
        loader,
        analytics,
        None,
        publisher,
    ));

    let server = StreamServerBuilder::new()
        .config(stream_config())
        .monitor(Arc::clone(&monitor))
        .media(media)
        .event_bus(bus.clone())
        .build()
        .unwrap();

    TestServer {
        app: server.router(),
        monitor,
        bus,
        _dir: dir,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn upload(uri: &str, file_name: &str, data: &[u8]) -> Request<Body> {
    let boundary = "crowdwatch-test-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}

fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([80, 80, 80])))
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

#[tokio::test]
async fn test_builder_validation() {
    assert!(StreamServerBuilder::new().build().is_err());

    let server = test_server(FakeFactory::new());
    let result = StreamServerBuilder::new()
        .config(stream_config())
        .monitor(server.monitor)
        .event_bus(server.bus)
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_health_and_status() {
    let server = test_server(FakeFactory::new());

    let (status, body) = send(&server.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["models_loaded"], false);

    let (status, body) = send(&server.app, get("/api/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["mode"], "idle");
    assert_eq!(body["loader"]["state"], "unloaded");
    assert_eq!(body["snapshot"]["person_count"], 0);
    assert_eq!(body["metrics"]["frames_captured"], 0);
}

#[tokio::test]
async fn test_dashboard_page_served() {
    let server = test_server(FakeFactory::new());
    let response = server.app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let page = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(page.contains("AI Crowd Monitor"));
    assert!(page.contains("/ws"));
    assert!(page.contains(r#"<span id="crowd_density">EMPTY</span>"#));
    assert!(page.contains(r#"<span id="alert_level">NORMAL</span>"#));
}

#[tokio::test]
async fn test_stop_when_idle_reports_not_monitoring() {
    let server = test_server(FakeFactory::new());

    let (status, body) = send(&server.app, post("/api/monitoring/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Not monitoring");
}

#[tokio::test]
async fn test_start_conflict_and_stop() {
    let server = test_server(FakeFactory::new());

    let (status, body) = send(&server.app, post("/api/monitoring/start")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(server.monitor.mode(), RunMode::Running);

    let (status, body) = send(&server.app, post("/api/monitoring/start")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Already monitoring");

    let (status, body) = send(&server.app, post("/api/monitoring/stop")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Monitoring stopped");
    assert_eq!(server.monitor.mode(), RunMode::Idle);
}

#[tokio::test]
async fn test_start_without_camera_is_server_error() {
    let server = test_server(
        FakeFactory::new().with_source(|| MockFrameSource::new(64, 48).unavailable()),
    );

    let (status, body) = send(&server.app, post("/api/monitoring/start")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("Camera"));
    assert_eq!(server.monitor.mode(), RunMode::Idle);
}

#[tokio::test]
async fn test_models_load_in_background() {
    let server = test_server(FakeFactory::new());

    let (status, body) = send(&server.app, post("/api/models/load")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);

    let loader = Arc::clone(server.monitor.loader());
    let loaded = tokio::time::timeout(Duration::from_secs(5), async move {
        while loader.state() != LoaderState::Loaded {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(loaded.is_ok());

    let (status, body) = send(&server.app, post("/api/models/load")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "loaded");
}

#[tokio::test]
async fn test_image_upload_returns_stats() {
    let server = test_server(FakeFactory::new());

    let (status, body) = send(&server.app, upload("/api/upload/image", "crowd.png", &png_bytes())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["stats"]["person_count"], 3);
    assert_eq!(body["stats"]["face_count"], 2);
    assert_eq!(body["stats"]["system_status"], "Image Processed");
}

#[tokio::test]
async fn test_upload_rejects_bad_extension_and_missing_file() {
    let server = test_server(FakeFactory::new());

    let (status, body) = send(&server.app, upload("/api/upload/image", "payload.exe", b"MZ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = send(&server.app, upload("/api/upload/video", "photo.jpg", b"x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&server.app, upload("/api/upload/image", "broken.png", b"not a png")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_video_upload_processes_in_background() {
    let server = test_server(FakeFactory::new().with_video_frames(12));
    let mut events = server.bus.subscribe();

    let (status, body) = send(&server.app, upload("/api/upload/video", "clip.mp4", b"fake video")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], true);
    assert!(body["upload_id"].is_string());

    let outcome = tokio::time::timeout(Duration::from_secs(5), async move {
        loop {
            match events.recv().await {
                Ok(MonitorEvent::VideoComplete {
                    success,
                    processed_frames,
                    ..
                }) => return (success, processed_frames),
                Ok(_) => continue,
                Err(_) => return (false, 0),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(outcome, (true, 12));
}

#[tokio::test]
async fn test_event_stream_headers() {
    let server = test_server(FakeFactory::new());
    let response = server
        .app
        .clone()
        .oneshot(get("/events?types=detection_update"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let server = test_server(FakeFactory::new());
    let (status, _) = send(&server.app, get("/no/such/route")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
