//! Lifecycle management for the external inference service.
//!
//! The service is a Python process owned by this crate: [`bootstrap`]
//! prepares its virtual environment, [`process::ProcessSupervisor`]
//! spawns it and tears it down gracefully, [`health`] answers whether it
//! is serving, and [`logs`] forwards its output into the tracing
//! pipeline at an appropriate severity.

use std::path::PathBuf;

pub mod bootstrap;
pub mod health;
pub mod logs;
pub mod process;

pub use process::ProcessSupervisor;

/// Errors from supervising the inference service process.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Inference service directory not found: {0}")]
    ServiceDirMissing(PathBuf),

    #[error("Inference service entrypoint not found: {0}")]
    EntrypointMissing(PathBuf),

    #[error("Failed to create virtual environment (exit code {exit_code})")]
    VenvCreate { exit_code: i32 },

    #[error("Failed to install requirements (exit code {exit_code}): {stderr}")]
    PipInstall { exit_code: i32, stderr: String },

    #[error("Inference service did not become healthy within {0}s")]
    StartupTimeout(u64),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
