//! Orchestrator entrypoint.
//!
//! Wires configuration, the inference service supervisor, the engine
//! bridge, and the job queue together, then parks until interrupted.
//! The queue stays usable even when the supervised service cannot
//! start; jobs simply take the placeholder path.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use darkroom_bridge::client::InferenceClient;
use darkroom_bridge::crypto::PayloadCipher;
use darkroom_bridge::InferenceBridge;
use darkroom_core::config::Config;
use darkroom_queue::JobQueue;
use darkroom_supervisor::ProcessSupervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "darkroom=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tokio::fs::create_dir_all(&config.storage.output_dir).await?;

    let supervisor = ProcessSupervisor::new(config.supervisor.clone());
    match supervisor.start().await {
        Ok(()) => warm_inference(&config).await,
        Err(e) => {
            // The placeholder path keeps the queue functional.
            tracing::warn!(error = %e, "Inference service unavailable, generations will use the placeholder path");
        }
    }

    let engine = Arc::new(InferenceBridge::new(&config.inference, &config.storage));
    let queue = JobQueue::new(config.queue.clone(), engine);

    let shutdown = CancellationToken::new();
    queue.start_workers(shutdown.clone());

    tracing::info!("Orchestrator running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    shutdown.cancel();
    supervisor.stop().await?;

    Ok(())
}

/// Best-effort warm-up after the service comes up: load the configured
/// default model and report what the service ended up with loaded.
async fn warm_inference(config: &Config) {
    let cipher = config
        .inference
        .encryption_enabled
        .then(|| PayloadCipher::new(&config.inference.encryption_secret));
    let client = InferenceClient::new(config.inference.base_url.clone(), cipher);

    if !config.inference.default_model.is_empty() {
        match client
            .load_model(&config.inference.default_model, "stable_diffusion")
            .await
        {
            Ok(()) => tracing::info!(model = %config.inference.default_model, "Default model loaded"),
            Err(e) => tracing::warn!(error = %e, "Failed to load default model"),
        }
    }

    match client.loaded_models().await {
        Ok(models) => tracing::info!(?models, "Inference service ready"),
        Err(e) => tracing::warn!(error = %e, "Could not list loaded models"),
    }
}
