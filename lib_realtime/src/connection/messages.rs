//! # Stream Messages
//!
//! Wire format of the streaming channel. Every frame, in both directions, is a
//! JSON envelope `{"type": <kind>, "data": <payload>}`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SyncError;
use crate::models::{Alert, CameraStatus, Detection};

/// Frames pushed by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    Alert(Alert),
    Detection(Detection),
    CameraStatus(CameraStatus),
    /// Raw status payload; shape is resolved later by the status reducer.
    SystemStatus(Value),
}

impl ServerMessage {
    pub fn decode(text: &str) -> Result<ServerMessage, SyncError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Fire-and-forget commands sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientCommand {
    AcknowledgeAlert {
        #[serde(rename = "alertId")]
        alert_id: String,
    },
    SubscribeCamera {
        #[serde(rename = "cameraId")]
        camera_id: String,
    },
    UnsubscribeCamera {
        #[serde(rename = "cameraId")]
        camera_id: String,
    },
}

impl ClientCommand {
    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Everything a subscriber can observe on a connection: decoded server
/// frames plus the connection's own lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Alert(Alert),
    Detection(Detection),
    CameraStatus(CameraStatus),
    SystemStatus(Value),
    ConnectionEstablished,
    Error(String),
    Disconnected,
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Alert(_) => EventKind::Alert,
            StreamEvent::Detection(_) => EventKind::Detection,
            StreamEvent::CameraStatus(_) => EventKind::CameraStatus,
            StreamEvent::SystemStatus(_) => EventKind::SystemStatus,
            StreamEvent::ConnectionEstablished => EventKind::ConnectionEstablished,
            StreamEvent::Error(_) => EventKind::Error,
            StreamEvent::Disconnected => EventKind::Disconnected,
        }
    }
}

impl From<ServerMessage> for StreamEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Alert(a) => StreamEvent::Alert(a),
            ServerMessage::Detection(d) => StreamEvent::Detection(d),
            ServerMessage::CameraStatus(c) => StreamEvent::CameraStatus(c),
            ServerMessage::SystemStatus(v) => StreamEvent::SystemStatus(v),
        }
    }
}

/// Subscription key for [`StreamEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Alert,
    Detection,
    CameraStatus,
    SystemStatus,
    ConnectionEstablished,
    Error,
    Disconnected,
}

impl EventKind {
    /// Kinds that carry backend data, as opposed to connection lifecycle.
    pub const DATA: [EventKind; 4] = [
        EventKind::Alert,
        EventKind::Detection,
        EventKind::CameraStatus,
        EventKind::SystemStatus,
    ];

    /// Connection lifecycle kinds.
    pub const LIFECYCLE: [EventKind; 3] = [
        EventKind::ConnectionEstablished,
        EventKind::Error,
        EventKind::Disconnected,
    ];
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Alert => "alert",
            EventKind::Detection => "detection",
            EventKind::CameraStatus => "camera_status",
            EventKind::SystemStatus => "system_status",
            EventKind::ConnectionEstablished => "connection_established",
            EventKind::Error => "error",
            EventKind::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}
