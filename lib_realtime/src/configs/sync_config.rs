//! # Sync Configuration
//!
//! Layered configuration, resolved once at startup:
//!
//! 1. built-in defaults,
//! 2. an optional JSON file,
//! 3. `.env` / process environment (`DASHBOARD_*` variables).
//!
//! Each layer only overrides the fields it actually sets.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::configs::runtime_mode::RuntimeMode;
use crate::error::SyncError;
use crate::orchestrator::fallback::ReconnectPolicy;

pub const ENV_WS_URL: &str = "DASHBOARD_WS_URL";
pub const ENV_API_URL: &str = "DASHBOARD_API_URL";
pub const ENV_API_TOKEN: &str = "DASHBOARD_API_TOKEN";
pub const ENV_USE_MOCK: &str = "DASHBOARD_USE_MOCK";
pub const ENV_RUNTIME_MODE: &str = "DASHBOARD_RUNTIME_MODE";
pub const ENV_POLL_INTERVAL: &str = "DASHBOARD_POLL_INTERVAL_SECS";
pub const ENV_CONNECT_TIMEOUT: &str = "DASHBOARD_CONNECT_TIMEOUT_MS";
pub const ENV_HEARTBEAT: &str = "DASHBOARD_HEARTBEAT_SECS";

// Upper bounds applied on resolve; anything larger is clamped.
pub const MAX_POLL_INTERVAL_SECS: u64 = 86_400;
pub const MAX_HEARTBEAT_SECS: u64 = 3_600;
pub const MAX_CONNECT_TIMEOUT_MS: u64 = 300_000;
pub const MAX_DELAY_MS: u64 = 3_600_000;
pub const MAX_HTTP_TIMEOUT_SECS: u64 = 600;
pub const MAX_RECONNECT_ATTEMPTS: u32 = 100;
pub const MAX_HTTP_RETRIES: u32 = 10;
pub const MAX_CAPACITY: usize = 10_000;

/// One configuration layer. Every field is optional so layers can be merged.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    pub ws_url: Option<String>,
    pub api_base_url: Option<String>,
    pub api_token: Option<String>,
    pub force_mock: Option<bool>,
    pub mode: Option<RuntimeMode>,
    pub poll_interval_secs: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub heartbeat_interval_secs: Option<u64>,
    pub reconnect_base_delay_ms: Option<u64>,
    pub reconnect_max_delay_ms: Option<u64>,
    pub reconnect_max_attempts: Option<u32>,
    pub http_timeout_secs: Option<u64>,
    pub http_max_retries: Option<u32>,
    pub alert_capacity: Option<usize>,
    pub detection_capacity: Option<usize>,
    pub camera_capacity: Option<usize>,
    pub mock_event_interval_ms: Option<u64>,
}

impl RawConfig {
    /// Built-in defaults.
    pub fn defaults() -> Self {
        RawConfig {
            ws_url: Some("ws://localhost:8000/ws".to_string()),
            api_base_url: Some("http://localhost:8000/api/".to_string()),
            api_token: None,
            force_mock: Some(false),
            mode: None,
            poll_interval_secs: Some(30),
            connect_timeout_ms: Some(5000),
            heartbeat_interval_secs: Some(25),
            reconnect_base_delay_ms: Some(1000),
            reconnect_max_delay_ms: Some(10_000),
            reconnect_max_attempts: Some(3),
            http_timeout_secs: Some(10),
            http_max_retries: Some(2),
            alert_capacity: Some(50),
            detection_capacity: Some(100),
            camera_capacity: Some(64),
            mock_event_interval_ms: Some(5000),
        }
    }

    /// Merge two layers; `other` overrides `self` wherever it has a value.
    pub fn merge(self, other: RawConfig) -> RawConfig {
        RawConfig {
            ws_url: other.ws_url.or(self.ws_url),
            api_base_url: other.api_base_url.or(self.api_base_url),
            api_token: other.api_token.or(self.api_token),
            force_mock: other.force_mock.or(self.force_mock),
            mode: other.mode.or(self.mode),
            poll_interval_secs: other.poll_interval_secs.or(self.poll_interval_secs),
            connect_timeout_ms: other.connect_timeout_ms.or(self.connect_timeout_ms),
            heartbeat_interval_secs: other.heartbeat_interval_secs.or(self.heartbeat_interval_secs),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            reconnect_max_attempts: other.reconnect_max_attempts.or(self.reconnect_max_attempts),
            http_timeout_secs: other.http_timeout_secs.or(self.http_timeout_secs),
            http_max_retries: other.http_max_retries.or(self.http_max_retries),
            alert_capacity: other.alert_capacity.or(self.alert_capacity),
            detection_capacity: other.detection_capacity.or(self.detection_capacity),
            camera_capacity: other.camera_capacity.or(self.camera_capacity),
            mock_event_interval_ms: other.mock_event_interval_ms.or(self.mock_event_interval_ms),
        }
    }

    /// Reads the environment layer through `lookup` (normally `std::env::var`).
    pub fn from_lookup<F>(lookup: F) -> Result<RawConfig, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mode = match non_empty(ENV_RUNTIME_MODE) {
            Some(raw) => Some(raw.parse::<RuntimeMode>()?),
            None => None,
        };

        Ok(RawConfig {
            ws_url: non_empty(ENV_WS_URL),
            api_base_url: non_empty(ENV_API_URL),
            api_token: non_empty(ENV_API_TOKEN),
            force_mock: non_empty(ENV_USE_MOCK).map(|v| parse_flag(&v)),
            mode,
            poll_interval_secs: parse_number(ENV_POLL_INTERVAL, non_empty(ENV_POLL_INTERVAL))?,
            connect_timeout_ms: parse_number(ENV_CONNECT_TIMEOUT, non_empty(ENV_CONNECT_TIMEOUT))?,
            heartbeat_interval_secs: parse_number(ENV_HEARTBEAT, non_empty(ENV_HEARTBEAT))?,
            ..Default::default()
        })
    }

    /// Turns a fully merged layer into a validated [`SyncConfig`].
    pub fn resolve(self) -> Result<SyncConfig, SyncError> {
        let d = RawConfig::defaults();

        let ws_url = self.ws_url.or(d.ws_url).unwrap_or_default();
        let parsed_ws = Url::parse(&ws_url)?;
        if !matches!(parsed_ws.scheme(), "ws" | "wss") {
            return Err(SyncError::Config(format!(
                "WebSocket URL must use ws:// or wss://, got '{}'",
                ws_url
            )));
        }

        // Url::join drops the last path segment unless the base ends with '/'.
        let mut api_base_url = self.api_base_url.or(d.api_base_url).unwrap_or_default();
        if !api_base_url.ends_with('/') {
            api_base_url.push('/');
        }
        Url::parse(&api_base_url)?;

        let pick = |v: Option<u64>, def: Option<u64>| v.or(def).unwrap_or_default();
        let capacity = |v: Option<usize>, def: Option<usize>| v.or(def).unwrap_or(1).clamp(1, MAX_CAPACITY);

        let poll_secs = pick(self.poll_interval_secs, d.poll_interval_secs);
        if poll_secs == 0 {
            return Err(SyncError::Config("poll interval must be at least one second".into()));
        }
        let poll_secs = poll_secs.min(MAX_POLL_INTERVAL_SECS);

        Ok(SyncConfig {
            ws_url,
            api_base_url,
            api_token: self.api_token,
            force_mock: self.force_mock.unwrap_or(false),
            mode_override: self.mode,
            poll_interval: Duration::from_secs(poll_secs),
            connect_timeout: Duration::from_millis(
                pick(self.connect_timeout_ms, d.connect_timeout_ms).min(MAX_CONNECT_TIMEOUT_MS),
            ),
            heartbeat_interval: Duration::from_secs(
                pick(self.heartbeat_interval_secs, d.heartbeat_interval_secs).clamp(1, MAX_HEARTBEAT_SECS),
            ),
            reconnect: ReconnectPolicy {
                base_delay: Duration::from_millis(
                    pick(self.reconnect_base_delay_ms, d.reconnect_base_delay_ms).min(MAX_DELAY_MS),
                ),
                max_delay: Duration::from_millis(
                    pick(self.reconnect_max_delay_ms, d.reconnect_max_delay_ms).min(MAX_DELAY_MS),
                ),
                max_attempts: self
                    .reconnect_max_attempts
                    .or(d.reconnect_max_attempts)
                    .unwrap_or(1)
                    .clamp(1, MAX_RECONNECT_ATTEMPTS),
            },
            http_timeout: Duration::from_secs(
                pick(self.http_timeout_secs, d.http_timeout_secs).min(MAX_HTTP_TIMEOUT_SECS),
            ),
            http_max_retries: self
                .http_max_retries
                .or(d.http_max_retries)
                .unwrap_or(0)
                .min(MAX_HTTP_RETRIES),
            alert_capacity: capacity(self.alert_capacity, d.alert_capacity),
            detection_capacity: capacity(self.detection_capacity, d.detection_capacity),
            camera_capacity: capacity(self.camera_capacity, d.camera_capacity),
            mock_event_interval: Duration::from_millis(
                pick(self.mock_event_interval_ms, d.mock_event_interval_ms).clamp(10, MAX_DELAY_MS),
            ),
        })
    }
}

/// Resolved, validated settings for one scheduler session.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub ws_url: String,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub force_mock: bool,
    pub mode_override: Option<RuntimeMode>,
    pub poll_interval: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub http_timeout: Duration,
    pub http_max_retries: u32,
    pub alert_capacity: usize,
    pub detection_capacity: usize,
    pub camera_capacity: usize,
    pub mock_event_interval: Duration,
}

impl SyncConfig {
    /// The session's runtime mode: explicit override, then the mock flag, then auto.
    pub fn runtime_mode(&self) -> RuntimeMode {
        RuntimeMode::resolve(self.mode_override, self.force_mock)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000/ws".to_string(),
            api_base_url: "http://localhost:8000/api/".to_string(),
            api_token: None,
            force_mock: false,
            mode_override: None,
            poll_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_millis(5000),
            heartbeat_interval: Duration::from_secs(25),
            reconnect: ReconnectPolicy::default(),
            http_timeout: Duration::from_secs(10),
            http_max_retries: 2,
            alert_capacity: 50,
            detection_capacity: 100,
            camera_capacity: 64,
            mock_event_interval: Duration::from_millis(5000),
        }
    }
}

/// Loads the configuration: defaults, then `config_path` (JSON) if it exists,
/// then `.env` and the process environment.
pub fn load_config(config_path: Option<&Path>) -> Result<SyncConfig, SyncError> {
    let mut current = RawConfig::defaults();

    if let Some(path) = config_path {
        if path.exists() {
            let text = fs::read_to_string(path).map_err(|e| {
                SyncError::Config(format!("failed to read {}: {}", path.display(), e))
            })?;
            let file_layer: RawConfig = serde_json::from_str(&text).map_err(|e| {
                SyncError::Config(format!("failed to parse {}: {}", path.display(), e))
            })?;
            current = current.merge(file_layer);
        } else {
            tracing::info!(
                "Config file not found at {}. Using defaults and environment variables.",
                path.display()
            );
        }
    }

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let env_layer = RawConfig::from_lookup(|key| env::var(key).ok())?;
    current.merge(env_layer).resolve()
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>, SyncError> {
    match raw {
        Some(v) => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SyncError::Config(format!("{} must be a number, got '{}'", key, v))),
        None => Ok(None),
    }
}
