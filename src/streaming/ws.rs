use crate::events::{EventFilter, MonitorEvent};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::{broadcast::error::RecvError, mpsc};
use tracing::{debug, info, trace, warn};

use super::server::ServerState;

pub const CONNECTED_MESSAGE: &str = "Connected to AI Crowd Monitor";

const WS_SEND_BUFFER_SIZE: usize = 64;

/// Commands accepted from WebSocket clients, e.g. `{"event": "start_monitoring"}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientCommand {
    StartMonitoring,
    StopMonitoring,
}

#[derive(Debug, Default, Deserialize)]
pub struct EventQuery {
    /// Comma separated event names; empty means all
    pub types: Option<String>,
}

fn greeting() -> MonitorEvent {
    MonitorEvent::Status {
        message: CONNECTED_MESSAGE.to_string(),
    }
}

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    info!("WebSocket client connected");
    let (mut ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut events = state.event_bus.subscribe();
    let forward_tx = tx.clone();
    let forward_task = tokio::spawn(async move {
        if !send_event(&forward_tx, &greeting()).await {
            return;
        }
        loop {
            match events.recv().await {
                Ok(event) => {
                    if !send_event(&forward_tx, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagging, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => {
                    let state = state.clone();
                    tokio::spawn(async move { run_command(command, &state).await });
                }
                Err(e) => {
                    debug!("Ignoring WebSocket message {}: {}", text, e);
                    let reply = MonitorEvent::Status {
                        message: format!("Unknown command: {}", text),
                    };
                    send_event(&tx, &reply).await;
                }
            },
            Message::Close(_) => break,
            _ => trace!("Ignoring non-text WebSocket frame"),
        }
    }

    forward_task.abort();
    send_task.abort();
    info!("WebSocket client disconnected");
}

/// Outcomes reach every client through the `monitoring_status` event
async fn run_command(command: ClientCommand, state: &ServerState) {
    let response = match command {
        ClientCommand::StartMonitoring => state.monitor.start_monitoring().await,
        ClientCommand::StopMonitoring => state.monitor.stop_monitoring().await,
    };
    debug!("{:?} -> {}", command, response.message);
}

async fn send_event(tx: &mpsc::Sender<Message>, event: &MonitorEvent) -> bool {
    match event.to_json() {
        Ok(json) => tx.send(Message::Text(json)).await.is_ok(),
        Err(e) => {
            warn!("Failed to serialize {} event: {}", event.event_type(), e);
            true
        }
    }
}

/// Server-sent events carrying the same envelopes as the WebSocket
pub async fn sse_handler(
    State(state): State<ServerState>,
    Query(query): Query<EventQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let filter = EventFilter::from_list(query.types.as_deref());
    let mut events = state.event_bus.subscribe();
    info!("SSE client connected");

    let stream = async_stream::stream! {
        yield Ok(sse_event(&greeting()));

        loop {
            match events.recv().await {
                Ok(event) => {
                    if filter.matches(&event) {
                        yield Ok(sse_event(&event));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("SSE client lagging, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &MonitorEvent) -> Event {
    let data = event.to_json().unwrap_or_else(|e| {
        warn!("Failed to serialize {} event: {}", event.event_type(), e);
        String::from("{}")
    });
    Event::default().event(event.event_type()).data(data)
}
