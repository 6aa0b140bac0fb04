//! # Core Module
//!
//! Pure building blocks of the sync layer. Nothing in here does I/O or holds
//! a lock, which keeps them trivially testable and lets the scheduler call
//! them from inside its event loop.
//!
//! ## Core Components:
//!
//! - **`event_buffer`**: A fixed-capacity, most-recent-first history. Alerts,
//!   detections and camera reports are kept in these so memory stays bounded
//!   however long the dashboard runs.
//!
//! - **`status_reducer`**: Turns any of the backend's status payload shapes
//!   into `active`, `standby` or `error`, leaning towards the pessimistic
//!   answer whenever signals disagree.

/// Fixed-capacity, arrival-ordered history buffer.
pub mod event_buffer;
/// Backend status payload → UI state reduction.
pub mod status_reducer;

// --- Public API Re-exports ---
pub use event_buffer::BoundedEventBuffer;
pub use status_reducer::{reduce_status, StatusPayload};
