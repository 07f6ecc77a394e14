//! Virtual environment bootstrap for the inference service.
//!
//! The venv lives at `{service_dir}/venv` and is reused when its Python
//! interpreter is already present. A failed dependency install removes
//! the partial venv so the next attempt starts clean.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::process::Command;

use crate::SupervisorError;

/// Path to the venv's Python interpreter.
pub fn python_path(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}

/// Path to the venv's pip.
pub fn pip_path(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("pip.exe")
    } else {
        venv_dir.join("bin").join("pip")
    }
}

/// Ensure the service's virtual environment exists and has its
/// dependencies installed. Returns the venv directory.
pub async fn ensure_venv(service_dir: &Path) -> Result<PathBuf, SupervisorError> {
    let venv_dir = service_dir.join("venv");

    if fs::metadata(python_path(&venv_dir)).await.is_ok() {
        tracing::debug!(venv = %venv_dir.display(), "Reusing existing virtual environment");
        return Ok(venv_dir);
    }

    tracing::info!(venv = %venv_dir.display(), "Creating virtual environment");

    let create_status = Command::new("python3")
        .arg("-m")
        .arg("venv")
        .arg(&venv_dir)
        .status()
        .await?;

    if !create_status.success() {
        return Err(SupervisorError::VenvCreate {
            exit_code: create_status.code().unwrap_or(-1),
        });
    }

    let requirements = service_dir.join("requirements.txt");
    if fs::metadata(&requirements).await.is_ok() {
        tracing::info!("Installing inference service requirements");

        let install = Command::new(pip_path(&venv_dir))
            .arg("install")
            .arg("-r")
            .arg(&requirements)
            .output()
            .await?;

        if !install.status.success() {
            // Remove the partial venv so a retry does not reuse it.
            let _ = fs::remove_dir_all(&venv_dir).await;
            return Err(SupervisorError::PipInstall {
                exit_code: install.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&install.stderr).into_owned(),
            });
        }
    }

    Ok(venv_dir)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
