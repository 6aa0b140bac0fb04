//! # Streaming Connection
//!
//! The WebSocket side of the sync layer.
//!
//! - **`state`**: the four-state connection lifecycle.
//! - **`messages`**: the `{"type", "data"}` wire envelope, decoded into closed
//!   enums, plus the events handed to subscribers.
//! - **`manager`**: `ConnectionManager`, which owns the session task, the
//!   handler registry and the cancellation of superseded attempts.

pub mod manager;
pub mod messages;
pub mod state;

pub use manager::{ConnectionManager, ConnectionOptions, Credentials, EventHandler, HandlerId};
pub use messages::{ClientCommand, EventKind, ServerMessage, StreamEvent};
pub use state::ConnectionState;
