use crate::error::{CrowdwatchError, MediaError, StartError};
use crate::loader::READY_MESSAGE;
use crate::media::{MediaKind, StoredUpload};
use crate::monitor::{ControlResponse, STARTED_MESSAGE};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::{error, info, warn};

use super::server::ServerState;

/// Error body shared by every endpoint: `{success: false, message}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<StartError> for ApiError {
    fn from(e: StartError) -> Self {
        let status = match e {
            StartError::AlreadyRunning => StatusCode::CONFLICT,
            StartError::StillInitializing => StatusCode::SERVICE_UNAVAILABLE,
            StartError::ModelLoadFailed(_)
            | StartError::CameraUnavailable(_)
            | StartError::NoFramesAvailable => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<CrowdwatchError> for ApiError {
    fn from(e: CrowdwatchError) -> Self {
        let status = match &e {
            CrowdwatchError::Start(start) => return ApiError::from(start.clone()),
            CrowdwatchError::Media(MediaError::ModelsNotReady) => StatusCode::SERVICE_UNAVAILABLE,
            CrowdwatchError::Media(_) | CrowdwatchError::Image(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", e);
        }
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::bad_request(format!("Invalid upload: {}", e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            axum::Json(ControlResponse::failed(self.message)),
        )
            .into_response()
    }
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let health_info = serde_json::json!({
        "status": "healthy",
        "mode": state.monitor.mode(),
        "models_loaded": state.monitor.loader().is_loaded(),
        "server_info": {
            "subscribers": state.event_bus.subscriber_count(),
        }
    });

    (StatusCode::OK, axum::Json(health_info))
}

/// Run mode, loader state, latest statistics and loop counters
pub async fn status_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let loader = state.monitor.loader();
    let snapshot = state.monitor.current_snapshot();

    let status = serde_json::json!({
        "mode": state.monitor.mode(),
        "loader": {
            "state": loader.state(),
            "last_error": loader.last_error(),
        },
        "snapshot": &*snapshot,
        "metrics": state.monitor.metrics(),
    });

    (StatusCode::OK, axum::Json(status))
}

pub async fn start_monitoring_handler(
    State(state): State<ServerState>,
) -> Result<impl IntoResponse, ApiError> {
    state.monitor.request_start().await?;
    Ok((StatusCode::OK, axum::Json(ControlResponse::ok(STARTED_MESSAGE))))
}

pub async fn stop_monitoring_handler(State(state): State<ServerState>) -> impl IntoResponse {
    (StatusCode::OK, axum::Json(state.monitor.stop_monitoring().await))
}

/// Kick off model loading in the background
pub async fn load_models_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let loader = state.monitor.loader();
    if loader.is_loaded() {
        return (
            StatusCode::OK,
            axum::Json(serde_json::json!({
                "success": true,
                "message": READY_MESSAGE,
                "state": loader.state(),
            })),
        );
    }

    loader.preload();
    (
        StatusCode::ACCEPTED,
        axum::Json(serde_json::json!({
            "success": true,
            "message": "Model loading started",
            "state": loader.state(),
        })),
    )
}

pub async fn upload_image_handler(
    State(state): State<ServerState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let stored = store_upload(&state, multipart, MediaKind::Image).await?;
    let report = state.media.process_image(&stored.path).await?;
    Ok((StatusCode::OK, axum::Json(report)))
}

/// Store the video and process it in the background; progress arrives as events
pub async fn upload_video_handler(
    State(state): State<ServerState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let stored = store_upload(&state, multipart, MediaKind::Video).await?;

    let media = state.media.clone();
    let path = stored.path.clone();
    tokio::spawn(async move {
        if let Err(e) = media.process_video(&path).await {
            warn!("Video {} failed: {}", path.display(), e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        axum::Json(serde_json::json!({
            "success": true,
            "accepted": true,
            "upload_id": stored.id,
            "message": "Video processing started",
        })),
    ))
}

async fn store_upload(
    state: &ServerState,
    mut multipart: Multipart,
    kind: MediaKind,
) -> Result<StoredUpload, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        info!("Received {} upload '{}' ({} bytes)", kind.as_str(), file_name, data.len());
        return Ok(state.uploads.save(&file_name, kind, &data).await?);
    }

    Err(ApiError::bad_request("No file uploaded"))
}

/// Inline dashboard driven by the `/ws` event stream
pub async fn dashboard_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let snapshot = state.monitor.current_snapshot();
    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>AI Crowd Monitor</title>
    <style>
        :root {{ color-scheme: dark; }}
        body {{ margin: 0; padding: 1.5rem; font-family: sans-serif; background: #111; color: #eee; }}
        .stats {{ display: grid; grid-template-columns: repeat(auto-fit, minmax(10rem, 1fr)); gap: 1rem; }}
        .stat {{ background: #222; border-radius: 6px; padding: 1rem; }}
        .stat span {{ display: block; font-size: 1.8rem; margin-top: .3rem; }}
        #log {{ margin-top: 1rem; height: 14rem; overflow-y: auto; background: #000; padding: .5rem; font-family: monospace; font-size: .8rem; }}
        button {{ margin-right: .5rem; padding: .5rem 1rem; }}
    </style>
</head>
<body>
    <h1>AI Crowd Monitor</h1>
    <p>Mode: <b id="mode">{mode}</b></p>
    <button onclick="send('start_monitoring')">Start monitoring</button>
    <button onclick="send('stop_monitoring')">Stop monitoring</button>
    <div class="stats">
        <div class="stat">People<span id="person_count">{persons}</span></div>
        <div class="stat">Faces<span id="face_count">{faces}</span></div>
        <div class="stat">Density<span id="crowd_density">{density}</span></div>
        <div class="stat">Alert<span id="alert_level">{alert}</span></div>
        <div class="stat">Last activity<span id="last_activity">-</span></div>
    </div>
    <div id="log"></div>
    <script>
        const socket = new WebSocket(`${{location.protocol === 'https:' ? 'wss' : 'ws'}}://${{location.host}}/ws`);
        const log = (line) => {{
            const el = document.getElementById('log');
            el.textContent = `${{new Date().toLocaleTimeString()}} ${{line}}\n` + el.textContent;
        }};
        const send = (event) => socket.send(JSON.stringify({{ event }}));
        socket.onmessage = (msg) => {{
            const {{ event, data }} = JSON.parse(msg.data);
            if (event === 'detection_update') {{
                for (const key of ['person_count', 'face_count', 'crowd_density', 'alert_level', 'last_activity']) {{
                    document.getElementById(key).textContent = data[key];
                }}
            }} else if (event === 'monitoring_status') {{
                document.getElementById('mode').textContent = data.active ? 'running' : 'idle';
                log(data.message);
            }} else if (data && data.message) {{
                log(data.message);
            }}
        }};
        socket.onclose = () => log('Disconnected');
    </script>
</body>
</html>
"#,
        mode = state.monitor.mode().as_str(),
        persons = snapshot.person_count,
        faces = snapshot.face_count,
        density = snapshot.crowd_density,
        alert = snapshot.alert_level,
    );

    Html(html)
}
