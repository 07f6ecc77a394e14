//! The production [`Engine`]: remote generation with local fallback.
//!
//! Submits encoded jobs to the inference service and polls the job
//! endpoint at a fixed interval until a terminal remote state. When the
//! service is unhealthy (or submission itself fails), the deterministic
//! placeholder path runs instead so a dependency outage degrades
//! functionality rather than failing every job.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use uuid::Uuid;

use darkroom_core::config::{InferenceConfig, StorageConfig};
use darkroom_core::types::{GenerationRequest, GenerationResult};
use darkroom_core::CoreError;

use crate::client::{InferenceApiError, InferenceClient};
use crate::codec::{self, RemoteImageResult, REMOTE_ACCEPTED, REMOTE_COMPLETED, REMOTE_FAILED};
use crate::crypto::PayloadCipher;
use crate::mock::MockGenerator;
use crate::{Engine, ProgressFn};

/// Fixed interval between remote status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Bridge between the worker pool and the inference service.
pub struct InferenceBridge {
    client: InferenceClient,
    mock: MockGenerator,
    output_dir: PathBuf,
}

impl InferenceBridge {
    /// Build a bridge from configuration.
    pub fn new(inference: &InferenceConfig, storage: &StorageConfig) -> Self {
        let cipher = inference
            .encryption_enabled
            .then(|| PayloadCipher::new(&inference.encryption_secret));

        Self {
            client: InferenceClient::new(inference.base_url.clone(), cipher),
            mock: MockGenerator::new(&storage.output_dir),
            output_dir: PathBuf::from(&storage.output_dir),
        }
    }

    /// Poll the remote job until it completes or fails.
    async fn poll_to_completion(
        &self,
        request: &GenerationRequest,
        remote_job_id: &str,
        progress: &ProgressFn,
    ) -> Result<Vec<GenerationResult>, CoreError> {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let status = self
                .client
                .job_status(remote_job_id)
                .await
                .map_err(|e| CoreError::Transport(e.to_string()))?;

            if status.total_steps > 0 {
                progress(status.progress, status.current_step);
            }

            match status.status.as_str() {
                REMOTE_COMPLETED => return self.process_results(request, status.results).await,
                REMOTE_FAILED => {
                    return Err(CoreError::Remote(
                        status.error.unwrap_or_else(|| "unknown error".to_string()),
                    ));
                }
                _ => {}
            }
        }
    }

    /// Decode remote results and write them to the output directory.
    ///
    /// Filenames are generated locally, never derived from remote or
    /// user input, so a hostile image id cannot escape the directory.
    async fn process_results(
        &self,
        request: &GenerationRequest,
        remote: Vec<RemoteImageResult>,
    ) -> Result<Vec<GenerationResult>, CoreError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let mut results = Vec::with_capacity(remote.len());
        for (index, image) in remote.into_iter().enumerate() {
            let bytes = self.decode_image_data(&image.image_data)?;

            let filename = format!("{}_{index}.png", Uuid::new_v4());
            let path = self.output_dir.join(&filename);
            tokio::fs::write(&path, &bytes).await?;

            let mut metadata: HashMap<String, String> = image
                .metadata
                .iter()
                .map(|(k, v)| {
                    let value = match v.as_str() {
                        Some(s) => s.to_string(),
                        None => v.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect();
            metadata.insert("batch_index".to_string(), index.to_string());
            metadata.insert("generated_at".to_string(), Utc::now().to_rfc3339());
            metadata
                .entry("prompt".to_string())
                .or_insert_with(|| request.prompt.clone());

            results.push(GenerationResult {
                image_path: path.to_string_lossy().into_owned(),
                image_url: format!("/outputs/{filename}"),
                seed: image.seed,
                width: image.width,
                height: image.height,
                metadata,
            });
        }

        Ok(results)
    }

    /// Unwrap one image payload: optionally decrypt the cipher layer,
    /// then base64-decode the PNG bytes.
    fn decode_image_data(&self, data: &str) -> Result<Vec<u8>, CoreError> {
        let encoded = match self.client.cipher() {
            Some(cipher) => {
                let plaintext = cipher
                    .decrypt(data)
                    .map_err(|e| CoreError::Transport(format!("image decryption failed: {e}")))?;
                String::from_utf8(plaintext)
                    .map_err(|e| CoreError::Transport(format!("image payload not UTF-8: {e}")))?
            }
            None => data.to_string(),
        };

        BASE64
            .decode(encoded.trim())
            .map_err(|e| CoreError::Transport(format!("image payload not base64: {e}")))
    }
}

impl Engine for InferenceBridge {
    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: &ProgressFn,
    ) -> Result<Vec<GenerationResult>, CoreError> {
        if !self.client.health().await {
            tracing::info!(job_id = %request.id, "Inference service unavailable, using placeholder path");
            return self.mock.generate(request, progress).await;
        }

        let wire = codec::encode(request);
        let accepted = match self.client.submit(&wire).await {
            Ok(response) => response,
            Err(InferenceApiError::Request(e)) => {
                // The service dropped between the health check and the
                // submission; degrade the same way.
                tracing::warn!(job_id = %request.id, error = %e, "Submission failed, using placeholder path");
                return self.mock.generate(request, progress).await;
            }
            Err(e) => return Err(CoreError::Transport(e.to_string())),
        };

        if accepted.status != REMOTE_ACCEPTED {
            return Err(CoreError::Remote(format!(
                "generation not accepted: {}",
                accepted.message
            )));
        }

        tracing::info!(
            job_id = %request.id,
            remote_job_id = %accepted.job_id,
            "Generation submitted to inference service",
        );

        self.poll_to_completion(request, &accepted.job_id, progress)
            .await
    }
}
