//! REST client for the inference service HTTP endpoints.
//!
//! Wraps submission, job-status polling, health checking, and model
//! loading using [`reqwest`]. When a [`PayloadCipher`] is configured,
//! request and response bodies are encrypted and the `X-Encrypted`
//! header signals it; both sides must agree on the flag before a body is
//! decrypted.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::codec::{RemoteJobStatus, SubmitRequest, SubmitResponse};
use crate::crypto::{CryptoError, PayloadCipher};

/// Header flagging an encrypted body.
pub const ENCRYPTED_HEADER: &str = "X-Encrypted";

/// Timeout for the lightweight health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Errors from the inference service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum InferenceApiError {
    /// The HTTP request itself failed (network, DNS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The service returned a non-2xx status code.
    #[error("Inference service error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body failed to decode or decrypt.
    #[error("Invalid response body: {0}")]
    Body(String),

    /// Payload decryption failed.
    #[error("Decryption failed: {0}")]
    Crypto(#[from] CryptoError),

    /// The service flagged a body as encrypted but no cipher is
    /// configured locally.
    #[error("Encryption flag mismatch with inference service")]
    EncryptionMismatch,
}

/// HTTP client for a single inference service.
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
    cipher: Option<PayloadCipher>,
}

impl InferenceClient {
    /// Create a new client.
    ///
    /// * `base_url` - service base URL, e.g. `http://localhost:8001`.
    /// * `cipher`   - transport cipher, or `None` for plaintext bodies.
    pub fn new(base_url: String, cipher: Option<PayloadCipher>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            cipher,
        }
    }

    /// The configured transport cipher, if any.
    pub fn cipher(&self) -> Option<&PayloadCipher> {
        self.cipher.as_ref()
    }

    /// Whether the service currently answers its health endpoint.
    ///
    /// This is the liveness definition used across the system: a hung
    /// process that no longer answers counts as not running.
    pub async fn health(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }

    /// Submit a generation job. Returns the server-assigned job id and
    /// acceptance status.
    pub async fn submit(
        &self,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, InferenceApiError> {
        let url = format!("{}/generate", self.base_url);
        let response = match &self.cipher {
            Some(cipher) => {
                let body = serde_json::to_vec(request)
                    .map_err(|e| InferenceApiError::Body(e.to_string()))?;
                self.client
                    .post(url)
                    .header(ENCRYPTED_HEADER, "true")
                    .header("Content-Type", "application/octet-stream")
                    .body(cipher.encrypt(&body))
                    .send()
                    .await?
            }
            None => self.client.post(url).json(request).send().await?,
        };

        self.read_json(response).await
    }

    /// Fetch the status of a remote job.
    pub async fn job_status(&self, job_id: &str) -> Result<RemoteJobStatus, InferenceApiError> {
        let response = self
            .client
            .get(format!("{}/job/{}", self.base_url, job_id))
            .send()
            .await?;
        self.read_json(response).await
    }

    /// Ask the service to load a model. Best-effort from the caller's
    /// perspective; errors are reported but typically only logged.
    pub async fn load_model(
        &self,
        model_path: &str,
        model_type: &str,
    ) -> Result<(), InferenceApiError> {
        let response = self
            .client
            .post(format!("{}/load-model", self.base_url))
            .query(&[("model_path", model_path), ("model_type", model_type)])
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// List the models the service currently has loaded.
    pub async fn loaded_models(&self) -> Result<Vec<String>, InferenceApiError> {
        #[derive(serde::Deserialize)]
        struct ModelsResponse {
            #[serde(default)]
            loaded: Vec<String>,
        }

        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .send()
            .await?;
        let models: ModelsResponse = self.read_json(response).await?;
        Ok(models.loaded)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, or surface the
    /// status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, InferenceApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(InferenceApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Decode a JSON response body, decrypting first when both sides
    /// agree the body is encrypted.
    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, InferenceApiError> {
        let response = Self::ensure_success(response).await?;
        let flagged = response
            .headers()
            .get(ENCRYPTED_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        match (&self.cipher, flagged) {
            (Some(cipher), true) => {
                let body = response.text().await?;
                let plaintext = cipher.decrypt(&body)?;
                serde_json::from_slice(&plaintext)
                    .map_err(|e| InferenceApiError::Body(e.to_string()))
            }
            (None, true) => Err(InferenceApiError::EncryptionMismatch),
            // An unflagged body is parsed as plaintext even when a cipher
            // is configured; the flag governs decryption, not transport.
            (_, false) => {
                let body = response.bytes().await?;
                serde_json::from_slice(&body).map_err(|e| InferenceApiError::Body(e.to_string()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// One-shot HTTP endpoint answering any request with `body` as JSON.
    async fn spawn_json_responder(body: &'static str) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let resp = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
                body.len(),
            );
            let _ = sock.write_all(resp.as_bytes()).await;
        });
        addr
    }

    // -- loaded_models -------------------------------------------------------

    #[tokio::test]
    async fn loaded_models_parses_the_models_payload() {
        let addr = spawn_json_responder(r#"{"loaded":["sd15","sdxl"]}"#).await;
        let client = InferenceClient::new(format!("http://{addr}"), None);
        let models = client.loaded_models().await.unwrap();
        assert_eq!(models, vec!["sd15", "sdxl"]);
    }

    #[tokio::test]
    async fn loaded_models_defaults_to_empty_list() {
        let addr = spawn_json_responder("{}").await;
        let client = InferenceClient::new(format!("http://{addr}"), None);
        let models = client.loaded_models().await.unwrap();
        assert!(models.is_empty());
    }
}
