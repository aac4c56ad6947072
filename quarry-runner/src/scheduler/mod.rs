//! Scheduler layer for the runner
//!
//! This layer drives tracked jobs tick by tick until they reach a terminal
//! phase, and cleans up after them.

pub mod reconciler;

pub use reconciler::{JobOutcome, Reconciler, TrackedJob};
