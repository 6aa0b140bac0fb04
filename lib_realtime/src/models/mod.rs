//! # Data Model
//!
//! Value records received from the backend and the aggregate snapshot
//! published to the dashboard.

/// Alerts, detections, camera health and bounding boxes.
pub mod events;
/// The immutable `SystemData` snapshot and its small enums.
pub mod snapshot;

pub use events::{Alert, BoundingBox, CameraStatus, Detection, DetectionBatch};
pub use snapshot::{AiModelUiState, DataSource, Feed, FeedSources, SystemData};
