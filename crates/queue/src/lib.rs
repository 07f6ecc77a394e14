//! FIFO job queue and bounded worker pool.
//!
//! [`manager::JobQueue`] accepts generation requests, tracks per-job
//! status, and dispatches work to a configured number of worker tasks,
//! each of which drives one job at a time through an
//! [`darkroom_bridge::Engine`].

pub mod manager;

pub use manager::JobQueue;
