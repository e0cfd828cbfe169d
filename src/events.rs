use crate::detector::Detection;
use crate::snapshot::StatsSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Loading,
    Ready,
    Error,
}

/// Events pushed to connected clients. Serialized as
/// `{"event": "<name>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// Free-form status line, sent to every new connection
    Status { message: String },
    /// One model loading step finished
    LoadingProgress {
        step: u32,
        total: u32,
        progress: u32,
        message: String,
    },
    /// Model loader state change
    SystemStatus { status: LoadStatus, message: String },
    /// Fresh crowd statistics
    DetectionUpdate(StatsSnapshot),
    /// Monitoring was started or stopped
    MonitoringStatus { active: bool, message: String },
    /// Batch video progress
    VideoProgress {
        progress: u32,
        frame: u64,
        total_frames: u64,
        message: String,
    },
    /// Detections computed for one video frame
    VideoDetection {
        frame_index: u64,
        timestamp: f64,
        person_detections: Vec<Detection>,
        face_detections: Vec<Detection>,
    },
    /// Batch video processing finished
    VideoComplete {
        success: bool,
        total_frames: u64,
        processed_frames: u64,
        message: String,
    },
}

impl MonitorEvent {
    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            MonitorEvent::Status { .. } => "status",
            MonitorEvent::LoadingProgress { .. } => "loading_progress",
            MonitorEvent::SystemStatus { .. } => "system_status",
            MonitorEvent::DetectionUpdate(_) => "detection_update",
            MonitorEvent::MonitoringStatus { .. } => "monitoring_status",
            MonitorEvent::VideoProgress { .. } => "video_progress",
            MonitorEvent::VideoDetection { .. } => "video_detection",
            MonitorEvent::VideoComplete { .. } => "video_complete",
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            MonitorEvent::Status { message } => format!("Status: {}", message),
            MonitorEvent::LoadingProgress {
                step,
                total,
                message,
                ..
            } => format!("Loading step {}/{}: {}", step, total, message),
            MonitorEvent::SystemStatus { status, message } => {
                format!("System {:?}: {}", status, message)
            }
            MonitorEvent::DetectionUpdate(snapshot) => format!(
                "{} person(s), {} face(s), density {}, alert {}",
                snapshot.person_count,
                snapshot.face_count,
                snapshot.crowd_density,
                snapshot.alert_level
            ),
            MonitorEvent::MonitoringStatus { active, message } => format!(
                "Monitoring {}: {}",
                if *active { "active" } else { "inactive" },
                message
            ),
            MonitorEvent::VideoProgress {
                progress,
                frame,
                total_frames,
                ..
            } => format!("Video {}% ({}/{})", progress, frame, total_frames),
            MonitorEvent::VideoDetection {
                frame_index,
                person_detections,
                face_detections,
                ..
            } => format!(
                "Video frame {}: {} person(s), {} face(s)",
                frame_index,
                person_detections.len(),
                face_detections.len()
            ),
            MonitorEvent::VideoComplete {
                success,
                processed_frames,
                ..
            } => format!(
                "Video {} after {} frames",
                if *success { "completed" } else { "failed" },
                processed_frames
            ),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Outward notification boundary. Publishing is best-effort and never
/// blocks or fails the caller.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: MonitorEvent);
}

/// Broadcast channel fanning events out to every connected client
pub struct EventBus {
    sender: broadcast::Sender<MonitorEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        Self {
            debug_logging: true,
            ..Self::new(capacity)
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if there are any active subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Publisher for EventBus {
    fn publish(&self, event: MonitorEvent) {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            MonitorEvent::SystemStatus {
                status: LoadStatus::Error,
                message,
            } => error!("{}", message),
            MonitorEvent::SystemStatus { message, .. } => info!("{}", message),
            MonitorEvent::MonitoringStatus { message, .. } => info!("{}", message),
            MonitorEvent::VideoComplete {
                success: false,
                message,
                ..
            } => warn!("{}", message),
            _ => {}
        }

        if self.sender.send(event).is_err() {
            trace!("No subscribers connected, event dropped");
        }
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<String>),
}

impl EventFilter {
    /// Build a filter from a comma separated list of event types; an empty
    /// list accepts everything.
    pub fn from_list(list: Option<&str>) -> Self {
        let types: Vec<String> = list
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        if types.is_empty() {
            EventFilter::All
        } else {
            EventFilter::EventTypes(types)
        }
    }

    /// Check if an event passes this filter
    pub fn matches(&self, event: &MonitorEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.iter().any(|t| t == event.event_type()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn status(message: &str) -> MonitorEvent {
        MonitorEvent::Status {
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.publish(MonitorEvent::MonitoringStatus {
            active: true,
            message: "Monitoring started - AI detection active".to_string(),
        });

        match receiver.recv().await.unwrap() {
            MonitorEvent::MonitoringStatus { active, .. } => assert!(active),
            other => panic!("Unexpected event type: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(status("hello"));

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let event_bus = EventBus::new(4);
        assert!(!event_bus.has_subscribers());
        event_bus.publish(status("nobody listening"));
    }

    #[test]
    fn test_wire_format() {
        let event = MonitorEvent::LoadingProgress {
            step: 2,
            total: 5,
            progress: 40,
            message: "Initializing camera...".to_string(),
        };
        let value: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["event"], "loading_progress");
        assert_eq!(value["data"]["step"], 2);
        assert_eq!(value["data"]["progress"], 40);

        let event = MonitorEvent::SystemStatus {
            status: LoadStatus::Ready,
            message: "ready".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["data"]["status"], "ready");
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::from_list(Some("detection_update, video_progress"));
        assert!(!filter.matches(&status("x")));
        assert!(filter.matches(&MonitorEvent::VideoProgress {
            progress: 10,
            frame: 3,
            total_frames: 30,
            message: String::new(),
        }));
        assert!(matches!(EventFilter::from_list(Some(" ")), EventFilter::All));
        assert!(matches!(EventFilter::from_list(None), EventFilter::All));
    }
}
