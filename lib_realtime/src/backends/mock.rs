//! # Mock Backend
//!
//! In-process stand-in for the dashboard backend, used in `mock` mode and as
//! the fallback in `auto` mode. It serves a fixed camera roster, randomly
//! generated alerts and detections, and a simulated push feed that emits one
//! event every `event_interval`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, BoxStream, StreamExt};
use rand::Rng;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::backends::DashboardBackend;
use crate::connection::StreamEvent;
use crate::error::SyncError;
use crate::models::{Alert, BoundingBox, CameraStatus, Detection, DetectionBatch};

/// (id, name, location)
const ROSTER: &[(&str, &str, &str)] = &[
    ("cam-01", "Main Entrance", "Building A"),
    ("cam-02", "Parking North", "Lot 1"),
    ("cam-03", "Loading Dock", "Warehouse"),
    ("cam-04", "Server Room", "Building B"),
    ("cam-05", "Perimeter East", "Fence Line"),
    ("cam-06", "Lobby", "Building A"),
];

const ALERT_TYPES: &[(&str, &str)] = &[
    ("intrusion", "Person detected in restricted area"),
    ("loitering", "Person loitering for more than 5 minutes"),
    ("vehicle", "Unregistered vehicle detected"),
    ("perimeter_breach", "Perimeter line crossed"),
    ("unattended_object", "Unattended object detected"),
];

const SEVERITIES: &[&str] = &["low", "medium", "high", "critical"];
const ALERT_LEVELS: &[&str] = &["low", "medium", "high"];
const LABELS: &[&str] = &["person", "vehicle", "bag", "bicycle"];

/// Generated data for offline and fallback operation.
pub struct MockBackend {
    cameras: Vec<CameraStatus>,
    running: Arc<AtomicBool>,
    event_interval: Duration,
}

impl MockBackend {
    pub fn new(event_interval: Duration) -> Self {
        Self {
            cameras: ROSTER
                .iter()
                .map(|(id, name, location)| CameraStatus {
                    camera_id: id.to_string(),
                    name: Some(name.to_string()),
                    status: Some("online".to_string()),
                    location: Some(location.to_string()),
                    health: Map::new(),
                })
                .collect(),
            running: Arc::new(AtomicBool::new(true)),
            event_interval,
        }
    }

    /// Toggles the simulated AI engine (`{"running": ..}` in the status payload).
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras.iter().map(|c| c.camera_id.clone()).collect()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl DashboardBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch_cameras(&self) -> BoxFuture<'_, Result<Vec<CameraStatus>, SyncError>> {
        let cameras = self.cameras.clone();
        async move { Ok(cameras) }.boxed()
    }

    fn fetch_alerts(&self) -> BoxFuture<'_, Result<Vec<Alert>, SyncError>> {
        let ids = self.camera_ids();
        let mut alerts = random_batch(&ids, 3, 6, random_alert);
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        async move { Ok(alerts) }.boxed()
    }

    fn fetch_detections(&self) -> BoxFuture<'_, Result<DetectionBatch, SyncError>> {
        let ids = self.camera_ids();
        let mut detections = random_batch(&ids, 5, 12, random_detection);
        detections.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let stats = detection_stats(&detections);
        async move { Ok(DetectionBatch { detections, stats: Some(stats) }) }.boxed()
    }

    fn fetch_system_status(&self) -> BoxFuture<'_, Result<Value, SyncError>> {
        let status = status_payload(self.running.load(Ordering::SeqCst), self.cameras.len());
        async move { Ok(status) }.boxed()
    }

    fn acknowledge_alert(&self, alert_id: String) -> BoxFuture<'_, Result<(), SyncError>> {
        async move {
            tracing::debug!("Mock backend acknowledged alert {}", alert_id);
            Ok(())
        }
        .boxed()
    }

    fn event_feed(&self) -> Option<BoxStream<'static, StreamEvent>> {
        let ids = self.camera_ids();
        let running = self.running.clone();
        let interval = self.event_interval;

        let feed = stream::unfold((), move |()| {
            let ids = ids.clone();
            let running = running.clone();
            async move {
                tokio::time::sleep(interval).await;
                Some((random_event(&ids, running.load(Ordering::SeqCst)), ()))
            }
        });
        Some(feed.boxed())
    }
}

// The thread-local RNG is not `Send`, so all randomness stays in these
// synchronous helpers and never crosses an await.

fn random_batch<T>(camera_ids: &[String], min: usize, max: usize, make: fn(&[String]) -> T) -> Vec<T> {
    let count = rand::rng().random_range(min..=max);
    (0..count).map(|_| make(camera_ids)).collect()
}

fn pick<'a, T>(items: &'a [T]) -> &'a T {
    &items[rand::rng().random_range(0..items.len())]
}

fn recent_timestamp(max_age_secs: i64) -> DateTime<Utc> {
    Utc::now() - ChronoDuration::seconds(rand::rng().random_range(0..=max_age_secs))
}

fn random_box() -> BoundingBox {
    let mut rng = rand::rng();
    BoundingBox {
        x: rng.random_range(0.0..600.0),
        y: rng.random_range(0.0..400.0),
        width: rng.random_range(20.0..200.0),
        height: rng.random_range(40.0..300.0),
        label: Some(pick(LABELS).to_string()),
        confidence: Some(rng.random_range(0.5..0.99)),
    }
}

fn random_alert(camera_ids: &[String]) -> Alert {
    let (alert_type, message) = pick(ALERT_TYPES);
    Alert {
        id: Uuid::new_v4().to_string(),
        alert_type: alert_type.to_string(),
        message: message.to_string(),
        timestamp: recent_timestamp(3600),
        camera_id: pick(camera_ids).clone(),
        confidence: rand::rng().random_range(0.6..0.99),
        bounding_boxes: Some(vec![random_box()]),
        severity: Some(pick(SEVERITIES).to_string()),
        acknowledged: false,
    }
}

fn random_detection(camera_ids: &[String]) -> Detection {
    let boxes = (0..rand::rng().random_range(1..=3)).map(|_| random_box()).collect();
    Detection {
        id: Uuid::new_v4().to_string(),
        camera_id: pick(camera_ids).clone(),
        timestamp: recent_timestamp(600),
        confidence_score: rand::rng().random_range(0.5..0.99),
        alert_level: pick(ALERT_LEVELS).to_string(),
        bounding_boxes: boxes,
        metadata: json!({"model": "mock-detector", "frame": rand::rng().random_range(0..100_000)}),
    }
}

fn detection_stats(detections: &[Detection]) -> Value {
    let total = detections.len();
    let avg = if total == 0 {
        0.0
    } else {
        detections.iter().map(|d| d.confidence_score).sum::<f64>() / total as f64
    };
    let by_level = |level: &str| detections.iter().filter(|d| d.alert_level == level).count();
    json!({
        "total": total,
        "averageConfidence": avg,
        "byLevel": {"low": by_level("low"), "medium": by_level("medium"), "high": by_level("high")},
    })
}

fn status_payload(running: bool, camera_count: usize) -> Value {
    let service = if running { "healthy" } else { "stopped" };
    json!({
        "running": running,
        "services": {"detection": service, "behavior_analysis": service, "ai_agent": service},
        "cameras_online": camera_count,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

fn random_event(camera_ids: &[String], running: bool) -> StreamEvent {
    match rand::rng().random_range(0..10) {
        0..=2 => StreamEvent::Alert(Alert {
            timestamp: Utc::now(),
            ..random_alert(camera_ids)
        }),
        3..=6 => StreamEvent::Detection(Detection {
            timestamp: Utc::now(),
            ..random_detection(camera_ids)
        }),
        7 | 8 => {
            let mut health = Map::new();
            health.insert("fps".into(), json!(rand::rng().random_range(15..=30)));
            StreamEvent::CameraStatus(CameraStatus {
                camera_id: pick(camera_ids).clone(),
                name: None,
                status: Some("online".to_string()),
                location: None,
                health,
            })
        }
        _ => StreamEvent::SystemStatus(status_payload(running, camera_ids.len())),
    }
}
