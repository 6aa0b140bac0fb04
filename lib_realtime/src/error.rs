//! # Sync Errors
//!
//! A single error taxonomy for the whole synchronization layer. Transport and
//! fallback failures are folded into the snapshot's `error` banner by the
//! scheduler; only live-mode failures travel back to callers as `Err`.

use std::time::Duration;

use thiserror::Error;

use crate::models::Feed;

/// Errors produced by the connection, retrieval and orchestration layers.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Handshake, socket or HTTP transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The streaming handshake did not complete in time.
    #[error("connection attempt timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend answered with a non-2xx status.
    #[error("HTTP {status} from {url}")]
    Http {
        status: u16,
        url: String,
        body: Option<String>,
    },

    /// A payload could not be decoded into the expected shape.
    #[error("malformed payload: {0}")]
    Parse(String),

    /// Both the live and the mock backend failed for one feed (auto mode only).
    #[error("{feed} unavailable from both backends (live: {live}; mock: {mock})")]
    FallbackExhausted {
        feed: Feed,
        live: String,
        mock: String,
    },

    /// An in-flight connect was superseded by `disconnect()`.
    #[error("connection attempt cancelled")]
    Cancelled,

    /// A command needed an open streaming session.
    #[error("streaming connection is not open")]
    NotConnected,

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The scheduler was torn down before the request could run.
    #[error("sync scheduler is no longer active")]
    Inactive,
}

impl SyncError {
    /// True for failures of the network path (as opposed to bad data or local state).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Timeout(_) | SyncError::Http { .. }
        )
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Parse(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

impl From<reqwest_middleware::Error> for SyncError {
    fn from(e: reqwest_middleware::Error) -> Self {
        match e {
            reqwest_middleware::Error::Reqwest(inner) => inner.into(),
            other => SyncError::Transport(other.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(e: url::ParseError) -> Self {
        SyncError::Config(format!("invalid URL: {}", e))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Parse(e.to_string())
    }
}
