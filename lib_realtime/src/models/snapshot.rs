//! # System Snapshot
//!
//! `SystemData` is the only view of synchronized state the UI ever sees. A new
//! value is built for every update and published behind an `Arc`, so readers
//! never observe a half-applied change.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::configs::runtime_mode::RuntimeMode;
use crate::connection::state::ConnectionState;
use crate::models::events::{Alert, CameraStatus, Detection};

/// The four logical data feeds, each fetched and fallen back independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feed {
    Cameras,
    Alerts,
    Detections,
    SystemStatus,
}

impl Feed {
    /// All feeds in fetch order.
    pub const ALL: [Feed; 4] = [Feed::Cameras, Feed::Alerts, Feed::Detections, Feed::SystemStatus];
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feed::Cameras => "cameras",
            Feed::Alerts => "alerts",
            Feed::Detections => "detections",
            Feed::SystemStatus => "system status",
        };
        f.write_str(name)
    }
}

/// Which backend served a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Mock,
}

/// UI-facing state of the AI pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiModelUiState {
    Active,
    #[default]
    Standby,
    Error,
}

/// Last backend used per feed; `None` until the feed has been fetched once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSources {
    pub cameras: Option<DataSource>,
    pub alerts: Option<DataSource>,
    pub detections: Option<DataSource>,
    pub system_status: Option<DataSource>,
}

impl FeedSources {
    pub fn set(&mut self, feed: Feed, source: DataSource) {
        let slot = match feed {
            Feed::Cameras => &mut self.cameras,
            Feed::Alerts => &mut self.alerts,
            Feed::Detections => &mut self.detections,
            Feed::SystemStatus => &mut self.system_status,
        };
        *slot = Some(source);
    }

    pub fn get(&self, feed: Feed) -> Option<DataSource> {
        match feed {
            Feed::Cameras => self.cameras,
            Feed::Alerts => self.alerts,
            Feed::Detections => self.detections,
            Feed::SystemStatus => self.system_status,
        }
    }
}

/// Aggregate view handed to the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemData {
    pub cameras: Vec<CameraStatus>,
    pub alerts: Vec<Alert>,
    pub detections: Vec<Detection>,
    pub detection_stats: Option<Value>,
    pub system_health: Option<Value>,
    pub ai_model_status: AiModelUiState,
    pub is_connected: bool,
    pub connection_state: ConnectionState,
    pub last_update: Option<DateTime<Utc>>,
    /// Non-fatal banner text; `None` when every feed is healthy.
    pub error: Option<String>,
    pub mode: RuntimeMode,
    pub sources: FeedSources,
}

impl SystemData {
    /// The snapshot published before anything has been fetched.
    pub fn empty(mode: RuntimeMode) -> Self {
        Self {
            cameras: Vec::new(),
            alerts: Vec::new(),
            detections: Vec::new(),
            detection_stats: None,
            system_health: None,
            ai_model_status: AiModelUiState::Standby,
            is_connected: false,
            connection_state: ConnectionState::Disconnected,
            last_update: None,
            error: None,
            mode,
            sources: FeedSources::default(),
        }
    }
}
