//! # Configuration Modules
//!
//! This module aggregates the startup configuration of the sync layer: the
//! runtime mode resolver and the layered (defaults → file → environment)
//! settings loader.

/// Resolves `auto` / `mock` / `live` from an explicit override and the mock flag.
pub mod runtime_mode;

/// Layered configuration loading and validation.
pub mod sync_config;

pub use runtime_mode::RuntimeMode;
pub use sync_config::{load_config, RawConfig, SyncConfig};
