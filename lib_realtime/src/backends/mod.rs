//! # Dashboard Backends
//!
//! The two data sources the sync layer can talk to, behind one object-safe
//! trait so the orchestrator can swap them per call.
//!
//! - **`live`**: REST adapter for the real backend, built on the retrieval
//!   layer's `ApiClient`.
//! - **`mock`**: in-process generator with a fixed camera roster, random
//!   alerts and detections, and a simulated push feed.

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::connection::StreamEvent;
use crate::error::SyncError;
use crate::models::{Alert, CameraStatus, DetectionBatch};

pub mod live;
pub mod mock;

pub use live::LiveBackend;
pub use mock::MockBackend;

/// A source of dashboard data.
///
/// Futures are boxed so the trait stays object-safe and backends can be held
/// as `Arc<dyn DashboardBackend>`.
pub trait DashboardBackend: Send + Sync {
    /// Short name used in logs and fallback warnings.
    fn name(&self) -> &'static str;

    fn fetch_cameras(&self) -> BoxFuture<'_, Result<Vec<CameraStatus>, SyncError>>;

    /// Currently active alerts, newest first.
    fn fetch_alerts(&self) -> BoxFuture<'_, Result<Vec<Alert>, SyncError>>;

    /// Recent detections, newest first, plus aggregate counters.
    fn fetch_detections(&self) -> BoxFuture<'_, Result<DetectionBatch, SyncError>>;

    /// Raw status payload, to be reduced by the status reducer.
    fn fetch_system_status(&self) -> BoxFuture<'_, Result<Value, SyncError>>;

    fn acknowledge_alert(&self, alert_id: String) -> BoxFuture<'_, Result<(), SyncError>>;

    /// A simulated push feed standing in for the streaming connection.
    /// Only backends without a real stream provide one.
    fn event_feed(&self) -> Option<BoxStream<'static, StreamEvent>> {
        None
    }
}
