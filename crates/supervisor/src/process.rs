//! Spawning and stopping the inference service process.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use darkroom_core::config::SupervisorConfig;

use crate::bootstrap;
use crate::health::HealthProbe;
use crate::logs;
use crate::SupervisorError;

/// Interval between health polls while waiting for startup.
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Owns the inference service child process.
///
/// `start` is idempotent against an externally managed instance: when a
/// healthy service already answers on the configured address, it is
/// adopted rather than double-spawned. Liveness is always judged by the
/// health endpoint, not by child-process state, so an adopted or
/// crashed-and-restarted service reports correctly.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    probe: HealthProbe,
    child: Mutex<Option<Child>>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let probe = HealthProbe::new(&config.host, config.port);
        Self {
            config,
            probe,
            child: Mutex::new(None),
        }
    }

    /// Start the service and wait for it to become healthy.
    pub async fn start(&self) -> Result<(), SupervisorError> {
        // Adoption comes first: a healthy external instance needs no
        // local service directory at all.
        if self.probe.is_healthy().await {
            tracing::info!("Inference service already running, adopting it");
            return Ok(());
        }

        let service_dir = PathBuf::from(&self.config.service_dir);
        if !service_dir.is_dir() {
            return Err(SupervisorError::ServiceDirMissing(service_dir));
        }

        let entrypoint = service_dir.join("main.py");
        if !entrypoint.is_file() {
            return Err(SupervisorError::EntrypointMissing(entrypoint));
        }

        let venv_dir = bootstrap::ensure_venv(&service_dir).await?;

        tracing::info!(
            service_dir = %service_dir.display(),
            port = self.config.port,
            "Starting inference service",
        );

        let mut child = Command::new(bootstrap::python_path(&venv_dir))
            .arg("main.py")
            .current_dir(&service_dir)
            .env("HOST", &self.config.host)
            .env("PORT", self.config.port.to_string())
            .env("ENV", "production")
            .env("PYTHONUNBUFFERED", "1")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            logs::forward_stream("stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            logs::forward_stream("stderr", stderr);
        }

        *self.child.lock().await = Some(child);

        let deadline = Duration::from_secs(self.config.startup_timeout_secs);
        if !self
            .probe
            .wait_until_healthy(deadline, STARTUP_POLL_INTERVAL)
            .await
        {
            self.stop().await?;
            return Err(SupervisorError::StartupTimeout(
                self.config.startup_timeout_secs,
            ));
        }

        tracing::info!("Inference service is healthy");
        Ok(())
    }

    /// Stop the owned child: graceful termination first, then a hard
    /// kill after the grace period. A no-op when no child is owned.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        tracing::info!("Stopping inference service");

        #[cfg(unix)]
        let terminated = {
            match child.id() {
                Some(pid) => {
                    // SAFETY: signalling our own child by pid.
                    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
                    let grace = Duration::from_secs(self.config.grace_secs);
                    tokio::time::timeout(grace, child.wait()).await.is_ok()
                }
                None => true, // already reaped
            }
        };

        #[cfg(not(unix))]
        let terminated = false;

        if !terminated {
            tracing::warn!("Inference service ignored termination, killing it");
            child.kill().await?;
        }

        Ok(())
    }

    /// Whether the service currently answers its health endpoint.
    pub async fn is_running(&self) -> bool {
        self.probe.is_healthy().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn config(service_dir: &str) -> SupervisorConfig {
        SupervisorConfig {
            service_dir: service_dir.to_string(),
            host: "127.0.0.1".to_string(),
            port: 1,
            startup_timeout_secs: 1,
            grace_secs: 1,
        }
    }

    /// Minimal HTTP endpoint answering every request with `status`.
    async fn spawn_http_responder(status: &'static str) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut sock, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = sock.read(&mut buf).await;
                    let resp = format!("HTTP/1.1 {status}\r\ncontent-length: 0\r\n\r\n");
                    let _ = sock.write_all(resp.as_bytes()).await;
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn stop_without_a_child_is_a_no_op() {
        let supervisor = ProcessSupervisor::new(config("/nonexistent"));
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_rejects_missing_service_dir() {
        let supervisor = ProcessSupervisor::new(config("/nonexistent/inference-service"));
        assert_matches!(
            supervisor.start().await,
            Err(SupervisorError::ServiceDirMissing(_))
        );
    }

    #[tokio::test]
    async fn start_rejects_missing_entrypoint() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = ProcessSupervisor::new(config(dir.path().to_str().unwrap()));
        assert_matches!(
            supervisor.start().await,
            Err(SupervisorError::EntrypointMissing(_))
        );
    }

    #[tokio::test]
    async fn is_running_is_false_with_nothing_listening() {
        let supervisor = ProcessSupervisor::new(config("/nonexistent"));
        assert!(!supervisor.is_running().await);
    }

    #[tokio::test]
    async fn adopts_healthy_external_service_without_service_dir() {
        let addr = spawn_http_responder("200 OK").await;
        let mut cfg = config("/nonexistent/inference-service");
        cfg.port = addr.port();
        let supervisor = ProcessSupervisor::new(cfg);

        assert!(supervisor.is_running().await);
        supervisor.start().await.unwrap();
        // Nothing was spawned, so stop stays a no-op.
        supervisor.stop().await.unwrap();
        assert!(supervisor.is_running().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_times_out_when_service_never_becomes_healthy() {
        use std::os::unix::fs::PermissionsExt;

        // Accepts connections but never answers 2xx.
        let addr = spawn_http_responder("503 Service Unavailable").await;

        // Service dir with a prepared venv whose interpreter just
        // parks, standing in for a server that never comes up.
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "").unwrap();
        let bin = dir.path().join("venv").join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let python = bin.join("python");
        std::fs::write(&python, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&python, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut cfg = config(dir.path().to_str().unwrap());
        cfg.port = addr.port();
        let supervisor = ProcessSupervisor::new(cfg);

        assert_matches!(
            supervisor.start().await,
            Err(SupervisorError::StartupTimeout(1))
        );
        assert!(!supervisor.is_running().await);
    }
}
