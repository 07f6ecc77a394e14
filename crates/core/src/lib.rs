//! Shared domain types for the darkroom generation orchestrator.
//!
//! Holds the job data model (requests, statuses, results), the error
//! taxonomy shared across crates, and environment-driven configuration.
//! This crate has no internal dependencies so that every other workspace
//! member can depend on it.

pub mod config;
pub mod error;
pub mod types;

pub use error::CoreError;
