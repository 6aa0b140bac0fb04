//! # Fallback Orchestrator
//!
//! Decides, per feed and per call, which backend serves a request:
//!
//! | Mode   | Backend used                                                   |
//! |--------|----------------------------------------------------------------|
//! | `mock` | mock only; live is never touched                               |
//! | `live` | live only; failures go back to the caller                      |
//! | `auto` | live first, mock for that feed only if live fails              |
//!
//! Auto mode is never pinned to the mock: every call probes live again, so
//! the dashboard recovers as soon as the backend does. It also owns the
//! reconnect policy for the streaming connection, which mirrors the same
//! three-way split.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::backends::DashboardBackend;
use crate::configs::RuntimeMode;
use crate::connection::{ConnectionManager, Credentials, StreamEvent};
use crate::error::SyncError;
use crate::models::{Alert, CameraStatus, DataSource, DetectionBatch, Feed};

/// Exponential backoff for the streaming handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Handshake attempts per `open_stream` call, at least one.
    pub max_attempts: u32,
}

impl ReconnectPolicy {
    /// Delay after failed attempt number `attempt` (1-based): doubles from
    /// `base_delay`, capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_attempts: 3,
        }
    }
}

/// Data from one feed plus where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedOutcome<T> {
    pub data: T,
    pub source: DataSource,
    /// Set when auto mode had to fall back to the mock.
    pub warning: Option<String>,
}

/// Where push events come from after [`FallbackOrchestrator::open_stream`].
pub enum StreamSource {
    /// The connection manager holds an open session; events arrive through
    /// its handlers.
    Live,
    /// The mock backend's generated feed.
    Simulated {
        feed: BoxStream<'static, StreamEvent>,
        /// Why live streaming was abandoned (auto mode only).
        reason: Option<String>,
    },
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Live => f.write_str("Live"),
            StreamSource::Simulated { reason, .. } => {
                f.debug_struct("Simulated").field("reason", reason).finish()
            }
        }
    }
}

/// Live/mock routing for one runtime mode.
pub struct FallbackOrchestrator {
    mode: RuntimeMode,
    live: Arc<dyn DashboardBackend>,
    mock: Arc<dyn DashboardBackend>,
    reconnect: ReconnectPolicy,
}

impl FallbackOrchestrator {
    pub fn new(
        mode: RuntimeMode,
        live: Arc<dyn DashboardBackend>,
        mock: Arc<dyn DashboardBackend>,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            mode,
            live,
            mock,
            reconnect,
        }
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    pub async fn fetch_cameras(&self) -> Result<FeedOutcome<Vec<CameraStatus>>, SyncError> {
        self.run_feed(Feed::Cameras, |b| b.fetch_cameras()).await
    }

    pub async fn fetch_alerts(&self) -> Result<FeedOutcome<Vec<Alert>>, SyncError> {
        self.run_feed(Feed::Alerts, |b| b.fetch_alerts()).await
    }

    pub async fn fetch_detections(&self) -> Result<FeedOutcome<DetectionBatch>, SyncError> {
        self.run_feed(Feed::Detections, |b| b.fetch_detections()).await
    }

    pub async fn fetch_system_status(&self) -> Result<FeedOutcome<Value>, SyncError> {
        self.run_feed(Feed::SystemStatus, |b| b.fetch_system_status()).await
    }

    /// Acknowledges over REST, routed like the alerts feed.
    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<FeedOutcome<()>, SyncError> {
        self.run_feed(Feed::Alerts, |b| b.acknowledge_alert(alert_id.to_string()))
            .await
    }

    async fn run_feed<T, F>(&self, feed: Feed, call: F) -> Result<FeedOutcome<T>, SyncError>
    where
        T: Send,
        F: for<'a> Fn(&'a dyn DashboardBackend) -> BoxFuture<'a, Result<T, SyncError>> + Send + Sync,
    {
        let from = |source: DataSource| move |data: T| FeedOutcome { data, source, warning: None };

        match self.mode {
            RuntimeMode::Mock => call(self.mock.as_ref()).await.map(from(DataSource::Mock)),
            RuntimeMode::Live => call(self.live.as_ref()).await.map(from(DataSource::Live)),
            RuntimeMode::Auto => {
                let live_err = match call(self.live.as_ref()).await {
                    Ok(data) => return Ok(from(DataSource::Live)(data)),
                    Err(e) => e,
                };
                tracing::warn!(
                    "Live {} request failed ({}); falling back to {} backend",
                    feed,
                    live_err,
                    self.mock.name()
                );
                match call(self.mock.as_ref()).await {
                    Ok(data) => Ok(FeedOutcome {
                        data,
                        source: DataSource::Mock,
                        warning: Some(format!(
                            "Live {} unavailable ({}); showing mock data",
                            feed, live_err
                        )),
                    }),
                    Err(mock_err) => {
                        tracing::error!("Both backends failed for {}: {}", feed, mock_err);
                        Err(SyncError::FallbackExhausted {
                            feed,
                            live: live_err.to_string(),
                            mock: mock_err.to_string(),
                        })
                    }
                }
            }
        }
    }

    /// Establishes the push channel for this mode.
    ///
    /// Live and auto modes try the handshake up to `max_attempts` times with
    /// exponential backoff. When every attempt fails, live mode returns the
    /// last error and auto mode switches to the simulated feed. `cancel`
    /// aborts the backoff wait.
    pub async fn open_stream(
        &self,
        conn: &ConnectionManager,
        target: &str,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<StreamSource, SyncError> {
        if !self.mode.allows_live() {
            tracing::info!("Runtime mode is mock; using the simulated event feed");
            return Ok(self.simulated(None));
        }

        let attempts = self.reconnect.max_attempts.max(1);
        let mut last_err = SyncError::NotConnected;

        for attempt in 1..=attempts {
            match conn.connect(target, credentials).await {
                Ok(()) => return Ok(StreamSource::Live),
                Err(SyncError::Cancelled) => return Err(SyncError::Cancelled),
                Err(e) => {
                    tracing::warn!("Stream attempt {}/{} failed: {}", attempt, attempts, e);
                    last_err = e;
                }
            }

            if attempt < attempts {
                let delay = self.reconnect.delay_for(attempt);
                tokio::select! {
                    _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        match self.mode {
            RuntimeMode::Live => {
                tracing::error!("Live stream unavailable after {} attempts: {}", attempts, last_err);
                Err(last_err)
            }
            _ => {
                tracing::warn!(
                    "Live stream unavailable after {} attempts; switching to simulated feed",
                    attempts
                );
                Ok(self.simulated(Some(format!("Live stream unavailable ({})", last_err))))
            }
        }
    }

    /// One handshake attempt with no backoff, used by the poll timer to
    /// notice a recovered backend. A no-op in mock mode.
    pub async fn reprobe_stream(
        &self,
        conn: &ConnectionManager,
        target: &str,
        credentials: &Credentials,
    ) -> Result<(), SyncError> {
        if !self.mode.allows_live() {
            return Ok(());
        }
        conn.connect(target, credentials).await
    }

    fn simulated(&self, reason: Option<String>) -> StreamSource {
        let feed = self.mock.event_feed().unwrap_or_else(|| stream::pending().boxed());
        StreamSource::Simulated { feed, reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{ConnectionOptions, ConnectionState};
    use crate::test_support::FakeBackend;

    fn orchestrator(mode: RuntimeMode, live: &Arc<FakeBackend>, mock: &Arc<FakeBackend>) -> FallbackOrchestrator {
        FallbackOrchestrator::new(
            mode,
            live.clone(),
            mock.clone(),
            ReconnectPolicy {
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(20),
                max_attempts: 2,
            },
        )
    }

    async fn fetch_everything(o: &FallbackOrchestrator) -> Vec<Result<DataSource, String>> {
        vec![
            o.fetch_cameras().await.map(|r| r.source).map_err(|e| e.to_string()),
            o.fetch_alerts().await.map(|r| r.source).map_err(|e| e.to_string()),
            o.fetch_detections().await.map(|r| r.source).map_err(|e| e.to_string()),
            o.fetch_system_status().await.map(|r| r.source).map_err(|e| e.to_string()),
        ]
    }

    fn refused_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        drop(listener);
        url
    }

    #[test]
    fn test_reconnect_delays_double_and_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(200), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_mock_mode_never_calls_live() {
        let live = FakeBackend::new("live");
        let mock = FakeBackend::new("mock");
        let o = orchestrator(RuntimeMode::Mock, &live, &mock);

        let results = fetch_everything(&o).await;
        assert!(results.iter().all(|r| *r == Ok(DataSource::Mock)));
        o.acknowledge_alert("a-1").await.unwrap();

        assert_eq!(live.total_calls(), 0);
        assert_eq!(live.acks.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert_eq!(mock.total_calls(), 4);
    }

    #[tokio::test]
    async fn test_live_mode_surfaces_failures_without_mock() {
        let live = FakeBackend::failing("live");
        let mock = FakeBackend::new("mock");
        let o = orchestrator(RuntimeMode::Live, &live, &mock);

        let err = o.fetch_alerts().await.unwrap_err();
        assert!(err.is_transport());
        assert!(o.acknowledge_alert("a-1").await.is_err());
        assert_eq!(mock.total_calls(), 0);
        assert_eq!(live.calls(Feed::Alerts), 1);
    }

    #[tokio::test]
    async fn test_auto_mode_falls_back_per_call_and_recovers() {
        let live = FakeBackend::failing("live");
        let mock = FakeBackend::new("mock");
        let o = orchestrator(RuntimeMode::Auto, &live, &mock);

        let first = o.fetch_system_status().await.unwrap();
        assert_eq!(first.source, DataSource::Mock);
        assert!(first.warning.unwrap().contains("system status"));
        assert_eq!(mock.calls(Feed::SystemStatus), 1);

        live.set_failing(false);
        let second = o.fetch_system_status().await.unwrap();
        assert_eq!(second.source, DataSource::Live);
        assert!(second.warning.is_none());
        assert_eq!(live.calls(Feed::SystemStatus), 2);
        assert_eq!(mock.calls(Feed::SystemStatus), 1);
    }

    #[tokio::test]
    async fn test_auto_mode_fallback_touches_only_the_failed_feed() {
        let live = FakeBackend::failing("live");
        let mock = FakeBackend::new("mock");
        let o = orchestrator(RuntimeMode::Auto, &live, &mock);

        o.fetch_cameras().await.unwrap();
        assert_eq!(mock.calls(Feed::Cameras), 1);
        assert_eq!(mock.calls(Feed::Alerts), 0);
        assert_eq!(mock.calls(Feed::Detections), 0);
    }

    #[tokio::test]
    async fn test_auto_mode_both_failing_is_exhausted() {
        let live = FakeBackend::failing("live");
        let mock = FakeBackend::failing("mock");
        let o = orchestrator(RuntimeMode::Auto, &live, &mock);

        match o.fetch_detections().await {
            Err(SyncError::FallbackExhausted { feed, live, mock }) => {
                assert_eq!(feed, Feed::Detections);
                assert!(live.contains("live backend is down"));
                assert!(mock.contains("mock backend is down"));
            }
            other => panic!("expected exhaustion, got {:?}", other.map(|r| r.source)),
        }
    }

    #[tokio::test]
    async fn test_open_stream_mock_mode_skips_connection() {
        let live = FakeBackend::new("live");
        let mock = FakeBackend::new("mock");
        let o = orchestrator(RuntimeMode::Mock, &live, &mock);
        let conn = ConnectionManager::new(ConnectionOptions::default());

        let source = o
            .open_stream(&conn, "ws://127.0.0.1:1/ws", &Credentials::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(source, StreamSource::Simulated { reason: None, .. }));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_open_stream_live_mode_exhaustion_is_error() {
        let live = FakeBackend::new("live");
        let mock = FakeBackend::new("mock");
        let o = orchestrator(RuntimeMode::Live, &live, &mock);
        let conn = ConnectionManager::new(ConnectionOptions {
            connect_timeout: Duration::from_millis(300),
            heartbeat_interval: Duration::from_secs(5),
        });

        let err = o
            .open_stream(&conn, &refused_url(), &Credentials::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_transport(), "got {:?}", err);
        assert_eq!(conn.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_open_stream_auto_mode_falls_back_to_simulated() {
        let live = FakeBackend::new("live");
        let mock = FakeBackend::new("mock");
        let o = orchestrator(RuntimeMode::Auto, &live, &mock);
        let conn = ConnectionManager::new(ConnectionOptions {
            connect_timeout: Duration::from_millis(300),
            heartbeat_interval: Duration::from_secs(5),
        });

        let source = o
            .open_stream(&conn, &refused_url(), &Credentials::default(), &CancellationToken::new())
            .await
            .unwrap();
        match source {
            StreamSource::Simulated { reason, .. } => {
                assert!(reason.unwrap().starts_with("Live stream unavailable"))
            }
            StreamSource::Live => panic!("refused port cannot be live"),
        }
    }

    #[tokio::test]
    async fn test_open_stream_backoff_is_cancellable() {
        let live = FakeBackend::new("live");
        let mock = FakeBackend::new("mock");
        let o = FallbackOrchestrator::new(
            RuntimeMode::Auto,
            live,
            mock,
            ReconnectPolicy {
                base_delay: Duration::from_secs(30),
                max_delay: Duration::from_secs(30),
                max_attempts: 3,
            },
        );
        let conn = ConnectionManager::new(ConnectionOptions {
            connect_timeout: Duration::from_millis(300),
            heartbeat_interval: Duration::from_secs(5),
        });
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            o.open_stream(&conn, &refused_url(), &Credentials::default(), &cancel),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }
}
