//! # Event Records
//!
//! Immutable value records exchanged with the backend, either pushed over the
//! stream or fetched in REST batches. Field names follow the backend wire
//! format, which mixes camelCase and snake_case; aliases accept both.
//!
//! Timestamps are read leniently (RFC 3339, offset-less ISO 8601 taken as
//! UTC, or epoch milliseconds) and always written back as RFC 3339.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Offset-less layouts the backend has been seen to emit.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parses a wire timestamp string; `None` if no known layout matches.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    raw.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(raw) => parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("unrecognised timestamp '{}'", raw))),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| de::Error::custom(format!("timestamp {} out of range", n))),
        other => Err(de::Error::custom(format!("invalid timestamp: {}", other))),
    }
}

/// A rectangle drawn over a camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    #[serde(alias = "w")]
    pub width: f64,
    #[serde(alias = "h")]
    pub height: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A security alert raised by the backend.
///
/// Records are never edited: acknowledging produces a new record through
/// [`Alert::acknowledge`] which then replaces the old one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type", default)]
    pub alert_type: String,
    #[serde(default)]
    pub message: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(alias = "camera_id", default)]
    pub camera_id: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(alias = "bounding_boxes", default, skip_serializing_if = "Option::is_none")]
    pub bounding_boxes: Option<Vec<BoundingBox>>,
    /// Free-form severity label (`low`, `medium`, `high`, `critical`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub acknowledged: bool,
}

impl Alert {
    /// Returns a copy of this alert with the acknowledged flag set.
    pub fn acknowledge(&self) -> Alert {
        Alert {
            acknowledged: true,
            ..self.clone()
        }
    }
}

/// An AI detection result for one camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    #[serde(rename = "cameraId", alias = "camera_id")]
    pub camera_id: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub confidence_score: f64,
    #[serde(default)]
    pub alert_level: String,
    #[serde(default)]
    pub bounding_boxes: Vec<BoundingBox>,
    #[serde(default)]
    pub metadata: Value,
}

/// Health report for a single camera. Unknown health fields are kept verbatim.
///
/// The identifier is read from `camera_id`, then `cameraId`, then `id`. A
/// record-level `id` that was not used as the identifier stays in `health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraStatus {
    pub camera_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(flatten)]
    pub health: Map<String, Value>,
}

const CAMERA_ID_KEYS: &[&str] = &["camera_id", "cameraId", "id"];

impl<'de> Deserialize<'de> for CameraStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = Map::deserialize(deserializer)?;
        CameraStatus::from_fields(fields).map_err(de::Error::custom)
    }
}

impl CameraStatus {
    fn from_fields(mut fields: Map<String, Value>) -> Result<CameraStatus, String> {
        let (key, camera_id) = CAMERA_ID_KEYS
            .iter()
            .find_map(|key| match fields.get(*key) {
                Some(Value::String(id)) if !id.is_empty() => Some((*key, id.clone())),
                Some(Value::Number(n)) => Some((*key, n.to_string())),
                _ => None,
            })
            .ok_or("camera record has no camera_id, cameraId or id")?;

        fields.remove(key);
        if key != "id" {
            fields.remove("camera_id");
            fields.remove("cameraId");
        }

        let mut text = |name: &str| match fields.remove(name) {
            Some(Value::String(v)) => Some(v),
            Some(Value::Null) | None => None,
            Some(other) => {
                fields.insert(name.to_string(), other);
                None
            }
        };
        let name = text("name");
        let status = text("status");
        let location = text("location");

        Ok(CameraStatus {
            camera_id,
            name,
            status,
            location,
            health: fields,
        })
    }

    /// Layers a newer status report over this one. Fields absent from the
    /// update keep their previous values.
    pub fn merged_with(&self, update: &CameraStatus) -> CameraStatus {
        let mut health = self.health.clone();
        for (k, v) in &update.health {
            health.insert(k.clone(), v.clone());
        }
        CameraStatus {
            camera_id: self.camera_id.clone(),
            name: update.name.clone().or_else(|| self.name.clone()),
            status: update.status.clone().or_else(|| self.status.clone()),
            location: update.location.clone().or_else(|| self.location.clone()),
            health,
        }
    }
}

/// Recent detections plus whatever aggregate counters the backend reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    #[serde(default)]
    pub detections: Vec<Detection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
}
