//! Quarry Runner
//!
//! Runs queries against a remote engine and tracks them to completion.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Services: Execution state machine, status sync, admission pool
//! - Scheduler: Reconcile loop driving every tracked job

pub mod config;
pub mod context;
pub mod scheduler;
pub mod service;

#[cfg(test)]
mod testing;

pub use config::{Config, RoutingGroupConfig};
pub use context::JobContext;
