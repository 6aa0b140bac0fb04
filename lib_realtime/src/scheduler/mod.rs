//! # Scheduler
//!
//! Owns a synchronization session end to end: initial load, periodic
//! polling, stream event application and snapshot publication.

pub mod sync_scheduler;

pub use sync_scheduler::SyncScheduler;
