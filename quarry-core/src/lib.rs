//! Quarry Core
//!
//! Core types and abstractions for tracking remote query execution.
//!
//! This crate contains:
//! - Domain types: job keys, handles, execution state, cache items
//! - Phase taxonomy: coarse remote phases, execution phases, plugin phases
//! - Collaborator traits: the remote backend and the admission controller

pub mod admission;
pub mod backend;
pub mod domain;
pub mod error;

pub use admission::{AdmissionController, AllocationStatus};
pub use backend::RemoteBackend;
pub use error::{AdmissionError, BackendError, PhaseError};
