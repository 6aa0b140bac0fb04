//! # lib_realtime
//!
//! Real-time data synchronization for the security-operations dashboard.
//!
//! The crate keeps one consistent [`SystemData`] snapshot of cameras, alerts,
//! detections and AI pipeline health, fed by a WebSocket push stream and REST
//! polling against the live backend, or by a local mock backend when live is
//! unavailable or disabled.
//!
//! Start with [`SyncScheduler::from_config`] and [`load_config`]:
//!
//! ```no_run
//! # async fn run() -> Result<(), lib_realtime::SyncError> {
//! let config = lib_realtime::load_config(None)?;
//! let scheduler = lib_realtime::SyncScheduler::from_config(config)?;
//! let mut updates = scheduler.subscribe();
//! while updates.changed().await.is_ok() {
//!     let snapshot = updates.borrow().clone();
//!     println!("{} alerts", snapshot.alerts.len());
//! }
//! scheduler.teardown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod backends;
pub mod configs;
pub mod connection;
pub mod core;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod retrieve;
pub mod scheduler;

#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(test)]
pub(crate) mod test_support;

// --- Public API Re-exports ---
pub use backends::{DashboardBackend, LiveBackend, MockBackend};
pub use configs::{load_config, RuntimeMode, SyncConfig};
pub use connection::{ConnectionManager, ConnectionState, Credentials, StreamEvent};
pub use error::SyncError;
pub use models::{AiModelUiState, Alert, CameraStatus, DataSource, Detection, SystemData};
pub use orchestrator::{FallbackOrchestrator, ReconnectPolicy};
pub use scheduler::SyncScheduler;
