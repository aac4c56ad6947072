//! Core domain types
//!
//! This module contains the structures shared between the cache engine, the
//! backend client, and the execution state machine.

pub mod job;
pub mod phase;
pub mod query;
