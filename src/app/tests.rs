use super::*;
use crate::config::CrowdwatchConfig;
use crate::loader::fake::{fast_config, FakeFactory};
use crate::loader::LoaderState;
use crate::monitor::RunMode;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn create_test_config(dir: &TempDir) -> CrowdwatchConfig {
    let mut config = fast_config();
    config.stream.ip = "127.0.0.1".to_string();
    config.stream.port = 0;
    config.media.upload_dir = dir.path().join("uploads").to_string_lossy().into_owned();
    config.media.processed_dir = dir.path().join("processed").to_string_lossy().into_owned();
    config
}

fn create_app(config: CrowdwatchConfig) -> CrowdwatchApp {
    CrowdwatchApp::with_factory(config, Arc::new(FakeFactory::new())).unwrap()
}

#[tokio::test]
async fn test_app_creation_registers_components() {
    let dir = TempDir::new().unwrap();
    let mut app = create_app(create_test_config(&dir));
    assert!(app.component_states().await.is_empty());

    app.initialize().await.unwrap();
    let states = app.component_states().await;
    assert_eq!(states.len(), 3);
    assert!(states.values().all(|s| *s == ComponentState::Stopped));
    assert_eq!(app.monitor().mode(), RunMode::Idle);
}

#[tokio::test]
async fn test_run_until_shutdown_request() {
    let dir = TempDir::new().unwrap();
    let mut app = create_app(create_test_config(&dir));
    app.initialize().await.unwrap();
    app.start().await.unwrap();
    assert_eq!(
        app.component_state(STREAMING).await,
        Some(ComponentState::Running)
    );

    assert!(app.request_shutdown(ShutdownReason::UserRequest).await);
    assert!(!app.request_shutdown(ShutdownReason::UserRequest).await);

    let exit_code = tokio::time::timeout(Duration::from_secs(10), app.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(
        app.component_state(STREAMING).await,
        Some(ComponentState::Stopped)
    );
    assert_eq!(
        app.component_state(MONITOR).await,
        Some(ComponentState::Stopped)
    );
}

#[tokio::test]
async fn test_shutdown_stops_active_monitoring() {
    let dir = TempDir::new().unwrap();
    let mut app = create_app(create_test_config(&dir));
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    app.monitor().start().await.unwrap();
    assert!(app.monitor().is_running());

    let exit_code = app.shutdown().await.unwrap();
    assert_eq!(exit_code, 0);
    assert_eq!(app.monitor().mode(), RunMode::Idle);
}

#[tokio::test]
async fn test_bind_failure_ends_run_with_error_code() {
    let dir = TempDir::new().unwrap();
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = create_test_config(&dir);
    config.stream.port = occupied.local_addr().unwrap().port();

    let mut app = create_app(config);
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    let exit_code = tokio::time::timeout(Duration::from_secs(10), app.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(exit_code, 1);
    assert_eq!(
        app.component_state(STREAMING).await,
        Some(ComponentState::Failed)
    );
}

#[tokio::test]
async fn test_preload_models_on_start() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.system.preload_models = true;

    let mut app = create_app(config);
    app.initialize().await.unwrap();
    app.start().await.unwrap();

    let loaded = tokio::time::timeout(Duration::from_secs(5), async {
        while app.component_state(MODELS).await != Some(ComponentState::Running) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(loaded.is_ok());
    assert_eq!(app.loader().state(), LoaderState::Loaded);

    app.shutdown().await.unwrap();
    assert_eq!(
        app.component_state(MODELS).await,
        Some(ComponentState::Stopped)
    );
}
