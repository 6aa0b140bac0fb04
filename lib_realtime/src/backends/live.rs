//! # Live REST Backend
//!
//! Read/acknowledge adapter over the backend's REST API. The backend has
//! shipped several response shapes over time, so every list endpoint accepts
//! a bare array, a `{"<feed>": [...]}` object or a `{"data": ...}` envelope.
//! Records are decoded one by one; a malformed record is logged and skipped
//! unless every record in a non-empty list is malformed.

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::backends::DashboardBackend;
use crate::configs::SyncConfig;
use crate::error::SyncError;
use crate::models::{Alert, CameraStatus, DetectionBatch};
use crate::retrieve::{ApiClient, ClientOptions};

const CAMERAS_PATH: &str = "cameras";
const ALERTS_PATH: &str = "alerts/active";
const DETECTIONS_PATH: &str = "detections/recent";
const HEALTH_PATH: &str = "health";

/// REST client for the real dashboard backend.
pub struct LiveBackend {
    api: ApiClient,
    detection_limit: usize,
}

impl LiveBackend {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let api = ApiClient::new(
            &config.api_base_url,
            config.api_token.clone(),
            ClientOptions {
                timeout: config.http_timeout,
                max_retries: config.http_max_retries,
            },
        )?;
        Ok(Self {
            api,
            detection_limit: config.detection_capacity,
        })
    }

    async fn get_list<T: DeserializeOwned>(&self, path: &str, key: &str) -> Result<Vec<T>, SyncError> {
        let body: Value = self.api.get_json(path).await?;
        let list = extract_list(body, key)
            .ok_or_else(|| SyncError::Parse(format!("'{}' response has no {} list", path, key)))?;
        decode_records(list, key)
    }

    fn acknowledge_url(&self, alert_id: &str) -> Result<Url, SyncError> {
        if matches!(alert_id.trim(), "" | "." | "..") {
            return Err(SyncError::Parse(format!("invalid alert id '{}'", alert_id)));
        }
        let mut url = self.api.base_url().clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Config("API base URL cannot take a path".into()))?
            .pop_if_empty()
            .extend(["alerts", alert_id, "acknowledge"]);
        Ok(url)
    }
}

impl DashboardBackend for LiveBackend {
    fn name(&self) -> &'static str {
        "live"
    }

    fn fetch_cameras(&self) -> BoxFuture<'_, Result<Vec<CameraStatus>, SyncError>> {
        self.get_list(CAMERAS_PATH, "cameras").boxed()
    }

    fn fetch_alerts(&self) -> BoxFuture<'_, Result<Vec<Alert>, SyncError>> {
        self.get_list(ALERTS_PATH, "alerts").boxed()
    }

    fn fetch_detections(&self) -> BoxFuture<'_, Result<DetectionBatch, SyncError>> {
        async move {
            let path = format!("{}?limit={}", DETECTIONS_PATH, self.detection_limit);
            let body: Value = self.api.get_json(&path).await?;
            parse_detection_batch(body)
        }
        .boxed()
    }

    fn fetch_system_status(&self) -> BoxFuture<'_, Result<Value, SyncError>> {
        async move {
            let body: Value = self.api.get_json(HEALTH_PATH).await?;
            Ok(unwrap_data(body))
        }
        .boxed()
    }

    fn acknowledge_alert(&self, alert_id: String) -> BoxFuture<'_, Result<(), SyncError>> {
        async move {
            // An absolute URL joins to itself, keeping the escaped id intact.
            let url = self.acknowledge_url(&alert_id)?;
            self.api.send_no_content::<()>(Method::POST, url.as_str(), None).await
        }
        .boxed()
    }
}

/// `{"data": X}` → `X`; anything else is returned untouched.
fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn extract_list(body: Value, key: &str) -> Option<Value> {
    match body {
        Value::Array(_) => Some(body),
        Value::Object(mut map) => {
            if let Some(list @ Value::Array(_)) = map.remove(key) {
                return Some(list);
            }
            match map.remove("data") {
                Some(inner @ (Value::Array(_) | Value::Object(_))) => extract_list(inner, key),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Decodes each element of a JSON array on its own, skipping bad records.
fn decode_records<T: DeserializeOwned>(list: Value, what: &str) -> Result<Vec<T>, SyncError> {
    let items = match list {
        Value::Array(items) => items,
        other => return Err(SyncError::Parse(format!("expected a {} list, got {}", what, other))),
    };
    let total = items.len();
    let mut records = Vec::with_capacity(total);
    let mut last_err = None;
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!("Skipping malformed {} record: {}", what, e);
                last_err = Some(e);
            }
        }
    }
    match last_err {
        Some(e) if records.is_empty() => Err(SyncError::Parse(format!(
            "all {} {} records are malformed: {}",
            total, what, e
        ))),
        _ => Ok(records),
    }
}

fn parse_detection_batch(body: Value) -> Result<DetectionBatch, SyncError> {
    match unwrap_data(body) {
        list @ Value::Array(_) => Ok(DetectionBatch {
            detections: decode_records(list, "detections")?,
            stats: None,
        }),
        Value::Object(mut map) => {
            let detections = match map.remove("detections") {
                Some(list @ Value::Array(_)) => decode_records(list, "detections")?,
                _ => {
                    return Err(SyncError::Parse(
                        "detections response has no detections list".into(),
                    ))
                }
            };
            let stats = map.remove("stats").or_else(|| map.remove("detection_stats"));
            Ok(DetectionBatch { detections, stats })
        }
        other => Err(SyncError::Parse(format!(
            "unexpected detections payload: {}",
            other
        ))),
    }
}
