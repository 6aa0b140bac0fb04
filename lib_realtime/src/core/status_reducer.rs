//! # Status Reducer
//!
//! Collapses whatever the backend reports as "system status" into the three
//! states the dashboard can show. Three payload shapes are in the wild:
//!
//! - a flat boolean, or an object with a boolean `running` field (mock engine),
//! - a nested map of service name → status string (`services` / `components`),
//! - a single top-level status string.
//!
//! The payload is first parsed into [`StatusPayload`], trying each shape in a
//! fixed order, then reduced with the priority `Error > Standby > Active`. The
//! dashboard must never claim "active" while any subsystem reports trouble.
//! Anything unrecognised reduces to `Standby`; this module never fails.

use serde_json::{Map, Value};

use crate::models::AiModelUiState;

/// Maps that may hold per-service statuses, checked in this order.
const SERVICE_MAP_KEYS: &[&str] = &["services", "components"];

/// Known AI service names, in scan order: detection, model, behavior,
/// recognition and agent families.
const KNOWN_SERVICE_KEYS: &[&str] = &[
    "ai_detection",
    "detection",
    "object_detection",
    "yolo",
    "ai_model",
    "model",
    "models",
    "inference",
    "behavior_analysis",
    "behavior",
    "face_recognition",
    "recognition",
    "plate_recognition",
    "ai_agent",
    "agent",
    "autonomous_agent",
];

/// Top-level fields that may carry a single overall status string.
const OVERALL_STATUS_KEYS: &[&str] = &["status", "overall_status", "state"];

// Checked in this order, so "unhealthy" is a failure and "inactive" is standby.
const FAILURE_MARKERS: &[&str] = &[
    "error",
    "fail",
    "down",
    "offline",
    "unhealthy",
    "critical",
    "crash",
    "dead",
    "unreachable",
    "broken",
];
const DEGRADED_MARKERS: &[&str] = &[
    "degraded",
    "warn",
    "standby",
    "inactive",
    "idle",
    "stopped",
    "paused",
    "starting",
    "loading",
    "partial",
];
const HEALTHY_MARKERS: &[&str] = &["healthy", "ok", "online", "running", "active"];

/// The recognised payload shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusPayload {
    /// No payload, or JSON `null`.
    Absent,
    /// Flat boolean "is the engine running".
    Running(bool),
    /// Case-folded statuses of known services, in scan order.
    Services(Vec<String>),
    /// Case-folded overall status string.
    Overall(String),
    /// Anything else (numbers, arrays, objects with no known fields).
    Unrecognized,
}

impl StatusPayload {
    /// Tries each known shape in priority order.
    pub fn parse(payload: Option<&Value>) -> StatusPayload {
        match payload {
            None | Some(Value::Null) => StatusPayload::Absent,
            Some(Value::Bool(running)) => StatusPayload::Running(*running),
            Some(Value::String(s)) => StatusPayload::Overall(s.to_lowercase()),
            Some(Value::Object(map)) => running_flag(map)
                .or_else(|| service_statuses(map))
                .or_else(|| overall_status(map))
                .unwrap_or(StatusPayload::Unrecognized),
            Some(_) => StatusPayload::Unrecognized,
        }
    }
}

/// Reduces a raw status payload to the UI state.
pub fn reduce_status(payload: Option<&Value>) -> AiModelUiState {
    match StatusPayload::parse(payload) {
        StatusPayload::Absent | StatusPayload::Unrecognized => AiModelUiState::Standby,
        StatusPayload::Running(true) => AiModelUiState::Active,
        StatusPayload::Running(false) => AiModelUiState::Standby,
        StatusPayload::Services(values) => aggregate(values.iter().map(|v| classify(v))),
        StatusPayload::Overall(value) => aggregate(std::iter::once(classify(&value))),
    }
}

/// Classifies one case-folded status string; `None` when it carries no signal.
pub fn classify(value: &str) -> Option<AiModelUiState> {
    let contains_any = |markers: &[&str]| markers.iter().any(|m| value.contains(m));

    if contains_any(FAILURE_MARKERS) {
        Some(AiModelUiState::Error)
    } else if contains_any(DEGRADED_MARKERS) {
        Some(AiModelUiState::Standby)
    } else if contains_any(HEALTHY_MARKERS) || value == "up" {
        Some(AiModelUiState::Active)
    } else {
        None
    }
}

/// Error beats standby beats active; no signal at all means standby.
fn aggregate<I>(signals: I) -> AiModelUiState
where
    I: IntoIterator<Item = Option<AiModelUiState>>,
{
    let mut seen_standby = false;
    let mut seen_active = false;

    for signal in signals.into_iter().flatten() {
        match signal {
            AiModelUiState::Error => return AiModelUiState::Error,
            AiModelUiState::Standby => seen_standby = true,
            AiModelUiState::Active => seen_active = true,
        }
    }

    if seen_standby {
        AiModelUiState::Standby
    } else if seen_active {
        AiModelUiState::Active
    } else {
        AiModelUiState::Standby
    }
}

fn running_flag(map: &Map<String, Value>) -> Option<StatusPayload> {
    map.get("running")
        .and_then(Value::as_bool)
        .map(StatusPayload::Running)
}

fn service_statuses(map: &Map<String, Value>) -> Option<StatusPayload> {
    let services = SERVICE_MAP_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_object))?;

    let values: Vec<String> = KNOWN_SERVICE_KEYS
        .iter()
        .filter_map(|key| services.get(*key))
        .filter_map(service_status_text)
        .map(str::to_lowercase)
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(StatusPayload::Services(values))
    }
}

// A service entry is either a bare string or an object with a `status` string.
fn service_status_text(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(obj) => obj.get("status").and_then(Value::as_str),
        _ => None,
    }
}

fn overall_status(map: &Map<String, Value>) -> Option<StatusPayload> {
    OVERALL_STATUS_KEYS
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(|s| StatusPayload::Overall(s.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reduce(v: Value) -> AiModelUiState {
        reduce_status(Some(&v))
    }

    #[test]
    fn test_absent_payload_is_standby() {
        assert_eq!(reduce_status(None), AiModelUiState::Standby);
        assert_eq!(reduce(Value::Null), AiModelUiState::Standby);
    }

    #[test]
    fn test_running_flag() {
        assert_eq!(reduce(json!({"running": true})), AiModelUiState::Active);
        assert_eq!(reduce(json!({"running": false})), AiModelUiState::Standby);
        assert_eq!(reduce(json!(true)), AiModelUiState::Active);
        assert_eq!(reduce(json!(false)), AiModelUiState::Standby);
    }

    #[test]
    fn test_running_flag_takes_precedence_over_services() {
        let payload = json!({"running": true, "services": {"detection": "down"}});
        assert_eq!(reduce(payload), AiModelUiState::Active);
    }

    #[test]
    fn test_failure_beats_any_number_of_healthy_services() {
        let payload = json!({
            "services": {
                "detection": "healthy",
                "model": "OK",
                "behavior_analysis": "Healthy",
                "face_recognition": "healthy",
                "ai_agent": "ERROR: model not loaded"
            }
        });
        assert_eq!(reduce(payload), AiModelUiState::Error);
    }

    #[test]
    fn test_degraded_beats_healthy() {
        let payload = json!({"services": {"detection": "healthy", "agent": "degraded"}});
        assert_eq!(reduce(payload), AiModelUiState::Standby);
    }

    #[test]
    fn test_all_healthy_services_are_active() {
        let payload = json!({
            "components": {
                "detection": {"status": "healthy", "latency_ms": 12},
                "recognition": "ok"
            }
        });
        assert_eq!(reduce(payload), AiModelUiState::Active);
    }

    #[test]
    fn test_unknown_services_fall_back_to_overall_status() {
        let payload = json!({"status": "healthy", "services": {"database": "down"}});
        assert_eq!(reduce(payload), AiModelUiState::Active);
    }

    #[test]
    fn test_overall_status_strings() {
        assert_eq!(reduce(json!({"status": "healthy"})), AiModelUiState::Active);
        assert_eq!(reduce(json!({"status": "Degraded"})), AiModelUiState::Standby);
        assert_eq!(reduce(json!({"status": "warning"})), AiModelUiState::Standby);
        assert_eq!(reduce(json!({"status": "offline"})), AiModelUiState::Error);
        assert_eq!(reduce(json!({"status": "unhealthy"})), AiModelUiState::Error);
        assert_eq!(reduce(json!("down")), AiModelUiState::Error);
        assert_eq!(reduce(json!({"status": "mystery"})), AiModelUiState::Standby);
    }

    #[test]
    fn test_garbage_never_panics() {
        let shapes = vec![
            json!(42),
            json!(-1.5),
            json!([]),
            json!([1, "down", {"status": "error"}]),
            json!({}),
            json!({"running": "yes"}),
            json!({"services": "all good"}),
            json!({"services": {"detection": 7, "model": null}}),
            json!({"services": {"detection": ["error"]}}),
            json!({"status": 500}),
            json!(""),
        ];
        for shape in shapes {
            let state = reduce(shape.clone());
            assert!(
                matches!(
                    state,
                    AiModelUiState::Active | AiModelUiState::Standby | AiModelUiState::Error
                ),
                "unexpected state for {shape}"
            );
        }
        assert_eq!(reduce(json!({"running": "yes"})), AiModelUiState::Standby);
        assert_eq!(reduce(json!([1, "down"])), AiModelUiState::Standby);
    }

    #[test]
    fn test_parse_prefers_shapes_in_order() {
        assert_eq!(
            StatusPayload::parse(Some(&json!({"services": {"model": "OK"}, "status": "down"}))),
            StatusPayload::Services(vec!["ok".to_string()])
        );
        assert_eq!(
            StatusPayload::parse(Some(&json!({"status": "OK"}))),
            StatusPayload::Overall("ok".to_string())
        );
    }
}
