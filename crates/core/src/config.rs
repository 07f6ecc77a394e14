//! Environment-driven configuration.
//!
//! All fields have defaults suitable for local development; override via
//! environment variables (binaries load `.env` through `dotenvy` first).

use std::str::FromStr;

/// Read an env var and parse it, falling back to `default` when unset.
///
/// Panics with a descriptive message when the variable is set but
/// unparsable; configuration errors should fail fast at startup.
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Top-level configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    pub queue: QueueConfig,
    pub inference: InferenceConfig,
    pub storage: StorageConfig,
    pub supervisor: SupervisorConfig,
}

impl Config {
    /// Load all sections from environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            queue: QueueConfig::from_env(),
            inference: InferenceConfig::from_env(),
            storage: StorageConfig::from_env(),
            supervisor: SupervisorConfig::from_env(),
        }
    }
}

/// Queue and worker-pool configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Number of worker slots (default: `1` — the accelerator is a
    /// single-owner resource).
    pub max_concurrent: usize,
    /// Maximum pending jobs before enqueue rejects (default: `100`).
    pub max_queue_size: usize,
    /// Per-job timeout in seconds (default: `300`).
    pub job_timeout_secs: u64,
    /// How long terminal status records are retained before eviction
    /// (default: `3600`).
    pub status_ttl_secs: u64,
}

impl QueueConfig {
    /// Load from environment variables.
    ///
    /// | Env Var                  | Default |
    /// |--------------------------|---------|
    /// | `QUEUE_MAX_CONCURRENT`   | `1`     |
    /// | `QUEUE_MAX_SIZE`         | `100`   |
    /// | `QUEUE_JOB_TIMEOUT_SECS` | `300`   |
    /// | `QUEUE_STATUS_TTL_SECS`  | `3600`  |
    pub fn from_env() -> Self {
        Self {
            max_concurrent: env_parse("QUEUE_MAX_CONCURRENT", 1),
            max_queue_size: env_parse("QUEUE_MAX_SIZE", 100),
            job_timeout_secs: env_parse("QUEUE_JOB_TIMEOUT_SECS", 300),
            status_ttl_secs: env_parse("QUEUE_STATUS_TTL_SECS", 3600),
        }
    }
}

/// Inference service client configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Base URL of the inference service (default: `http://localhost:8001`).
    pub base_url: String,
    /// Whether request/response bodies are encrypted in transit.
    pub encryption_enabled: bool,
    /// Shared secret the transport key is derived from.
    pub encryption_secret: String,
    /// Model loaded after startup, best-effort (empty = skip).
    pub default_model: String,
}

impl InferenceConfig {
    /// Load from environment variables.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `INFERENCE_URL`               | `http://localhost:8001`  |
    /// | `INFERENCE_ENCRYPTION`        | `false`                  |
    /// | `INFERENCE_ENCRYPTION_SECRET` | (development placeholder)|
    /// | `INFERENCE_DEFAULT_MODEL`     | (empty)                  |
    pub fn from_env() -> Self {
        Self {
            base_url: env_string("INFERENCE_URL", "http://localhost:8001"),
            encryption_enabled: env_parse("INFERENCE_ENCRYPTION", false),
            encryption_secret: env_string(
                "INFERENCE_ENCRYPTION_SECRET",
                "development-secret-change-in-production",
            ),
            default_model: env_string("INFERENCE_DEFAULT_MODEL", ""),
        }
    }
}

/// Output storage configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory generated images are written to (default: `./outputs`).
    pub output_dir: String,
}

impl StorageConfig {
    /// Load from environment variables.
    ///
    /// | Env Var      | Default     |
    /// |--------------|-------------|
    /// | `OUTPUT_DIR` | `./outputs` |
    pub fn from_env() -> Self {
        Self {
            output_dir: env_string("OUTPUT_DIR", "./outputs"),
        }
    }
}

/// External inference process supervision configuration.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Directory the inference service lives in (contains `main.py`
    /// and `requirements.txt`).
    pub service_dir: String,
    /// Bind address handed to the child process.
    pub host: String,
    /// Bind port handed to the child process.
    pub port: u16,
    /// Deadline for the child to become healthy (default: `30`).
    pub startup_timeout_secs: u64,
    /// Grace period before forced termination (default: `5`).
    pub grace_secs: u64,
}

impl SupervisorConfig {
    /// Load from environment variables.
    ///
    /// | Env Var                          | Default               |
    /// |----------------------------------|-----------------------|
    /// | `INFERENCE_SERVICE_DIR`          | `./inference-service` |
    /// | `INFERENCE_HOST`                 | `0.0.0.0`             |
    /// | `INFERENCE_PORT`                 | `8001`                |
    /// | `SUPERVISOR_STARTUP_TIMEOUT_SECS`| `30`                  |
    /// | `SUPERVISOR_GRACE_SECS`          | `5`                   |
    pub fn from_env() -> Self {
        Self {
            service_dir: env_string("INFERENCE_SERVICE_DIR", "./inference-service"),
            host: env_string("INFERENCE_HOST", "0.0.0.0"),
            port: env_parse("INFERENCE_PORT", 8001),
            startup_timeout_secs: env_parse("SUPERVISOR_STARTUP_TIMEOUT_SECS", 30),
            grace_secs: env_parse("SUPERVISOR_GRACE_SECS", 5),
        }
    }
}
