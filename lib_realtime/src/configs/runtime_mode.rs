//! # Runtime Mode
//!
//! Decides whether the dashboard talks to the live backend, the in-process
//! mock backend, or tries live first and falls back per call.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// Backend selection policy for one scheduler session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Live first, mock on failure, decided per call.
    #[default]
    Auto,
    /// Mock backend only. The live backend is never contacted.
    Mock,
    /// Live backend only. Failures are reported, never papered over.
    Live,
}

impl RuntimeMode {
    /// Resolves the effective mode.
    ///
    /// An explicit mode always wins. Otherwise the "force mock" flag selects
    /// [`RuntimeMode::Mock`], and everything else runs in [`RuntimeMode::Auto`].
    pub fn resolve(explicit: Option<RuntimeMode>, force_mock: bool) -> RuntimeMode {
        match explicit {
            Some(mode) => mode,
            None if force_mock => RuntimeMode::Mock,
            None => RuntimeMode::Auto,
        }
    }

    /// Whether this mode may open a connection to the live stream.
    pub fn allows_live(self) -> bool {
        !matches!(self, RuntimeMode::Mock)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeMode::Auto => "auto",
            RuntimeMode::Mock => "mock",
            RuntimeMode::Live => "live",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(RuntimeMode::Auto),
            "mock" => Ok(RuntimeMode::Mock),
            "live" => Ok(RuntimeMode::Live),
            other => Err(SyncError::Config(format!(
                "unknown runtime mode '{}' (expected auto, mock or live)",
                other
            ))),
        }
    }
}
