//! Shared fixtures for the in-crate tests: a raw HTTP mock server, a
//! scriptable backend that counts its calls, and a polling helper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::BoxStream;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::backends::DashboardBackend;
use crate::connection::StreamEvent;
use crate::error::SyncError;
use crate::models::{Alert, CameraStatus, DetectionBatch, Feed};

type Responder = dyn Fn(&str) -> (u16, String) + Send + Sync;

/// Answers every request with `respond(request_text)` and closes the socket.
pub struct MockHttpServer {
    addr: std::net::SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockHttpServer {
    pub async fn start<F>(respond: F) -> Self
    where
        F: Fn(&str) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let respond: Arc<Responder> = Arc::new(respond);

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                log.lock().unwrap().push(request.clone());

                let (status, body) = respond(&request);
                let response = format!(
                    "HTTP/1.1 {} MOCK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        Self { addr, requests }
    }

    /// Base URL with an `/api/` prefix, as the live backend expects.
    pub fn base_url(&self) -> String {
        format!("http://{}/api/", self.addr)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn sample_alert(id: &str) -> Alert {
    Alert {
        id: id.to_string(),
        alert_type: "intrusion".into(),
        message: format!("alert {}", id),
        timestamp: Utc::now(),
        camera_id: "cam-1".into(),
        confidence: 0.9,
        bounding_boxes: None,
        severity: Some("high".into()),
        acknowledged: false,
    }
}

pub fn sample_camera(id: &str) -> CameraStatus {
    serde_json::from_value(json!({"camera_id": id, "name": id, "status": "online"})).unwrap()
}

/// A backend whose feeds can be switched between succeeding and failing at
/// runtime, counting every call per feed.
pub struct FakeBackend {
    name: &'static str,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    calls: Mutex<HashMap<Feed, usize>>,
    pub acks: AtomicUsize,
    pub alerts: Mutex<Vec<Alert>>,
    pub status: Mutex<Value>,
}

impl FakeBackend {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            failing: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            calls: Mutex::new(HashMap::new()),
            acks: AtomicUsize::new(0),
            alerts: Mutex::new(vec![sample_alert(&format!("{}-alert", name))]),
            status: Mutex::new(json!({"running": true})),
        })
    }

    pub fn failing(name: &'static str) -> Arc<Self> {
        let backend = Self::new(name);
        backend.set_failing(true);
        backend
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Every fetch sleeps this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self, feed: Feed) -> usize {
        self.calls.lock().unwrap().get(&feed).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    async fn record(&self, feed: Feed) -> Result<(), SyncError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        *self.calls.lock().unwrap().entry(feed).or_insert(0) += 1;
        if self.failing.load(Ordering::SeqCst) {
            Err(SyncError::Transport(format!("{} backend is down", self.name)))
        } else {
            Ok(())
        }
    }
}

impl DashboardBackend for FakeBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn fetch_cameras(&self) -> BoxFuture<'_, Result<Vec<CameraStatus>, SyncError>> {
        async move {
            self.record(Feed::Cameras).await?;
            Ok(vec![sample_camera(&format!("{}-cam", self.name))])
        }
        .boxed()
    }

    fn fetch_alerts(&self) -> BoxFuture<'_, Result<Vec<Alert>, SyncError>> {
        async move {
            self.record(Feed::Alerts).await?;
            Ok(self.alerts.lock().unwrap().clone())
        }
        .boxed()
    }

    fn fetch_detections(&self) -> BoxFuture<'_, Result<DetectionBatch, SyncError>> {
        async move {
            self.record(Feed::Detections).await?;
            Ok(DetectionBatch {
                detections: Vec::new(),
                stats: Some(json!({"source": self.name})),
            })
        }
        .boxed()
    }

    fn fetch_system_status(&self) -> BoxFuture<'_, Result<Value, SyncError>> {
        async move {
            self.record(Feed::SystemStatus).await?;
            Ok(self.status.lock().unwrap().clone())
        }
        .boxed()
    }

    fn acknowledge_alert(&self, _alert_id: String) -> BoxFuture<'_, Result<(), SyncError>> {
        async move {
            if self.failing.load(Ordering::SeqCst) {
                return Err(SyncError::Transport(format!("{} backend is down", self.name)));
            }
            self.acks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn event_feed(&self) -> Option<BoxStream<'static, StreamEvent>> {
        None
    }
}

/// Polls `check` every 20ms until it holds or `within` elapses.
pub async fn eventually<F: FnMut() -> bool>(within: Duration, mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
