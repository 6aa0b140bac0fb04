//! # Orchestrator
//!
//! Live/mock routing for REST feeds and the streaming connection.

pub mod fallback;

pub use fallback::{FallbackOrchestrator, FeedOutcome, ReconnectPolicy, StreamSource};
