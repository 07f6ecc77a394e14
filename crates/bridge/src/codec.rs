//! Wire schema of the inference service REST API.
//!
//! Translates between [`GenerationRequest`] and the JSON bodies the
//! service accepts, and mirrors the job-status payloads it returns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use darkroom_core::types::GenerationRequest;

// ---------------------------------------------------------------------------
// Remote status constants
// ---------------------------------------------------------------------------

/// Submission was accepted and a job id assigned.
pub const REMOTE_ACCEPTED: &str = "accepted";
/// Remote job finished successfully.
pub const REMOTE_COMPLETED: &str = "completed";
/// Remote job failed; the error field carries the reason.
pub const REMOTE_FAILED: &str = "failed";

// ---------------------------------------------------------------------------
// Request encoding
// ---------------------------------------------------------------------------

/// Body of `POST /generate`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler: String,
    pub seed: i64,
    pub batch_size: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loras: Option<Value>,
    pub enable_lcm: bool,
    pub clip_skip: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
}

/// Encode a request into the service's wire schema.
///
/// Named engine options ride in `request.extra`; unknown keys are
/// ignored rather than rejected so newer clients degrade gracefully.
pub fn encode(request: &GenerationRequest) -> SubmitRequest {
    let mut wire = SubmitRequest {
        prompt: request.prompt.clone(),
        negative_prompt: request.negative_prompt.clone(),
        width: request.width,
        height: request.height,
        steps: request.steps,
        cfg_scale: request.cfg_scale,
        sampler: request.sampler.clone(),
        seed: request.seed,
        batch_size: request.batch_size,
        model: request.model.clone(),
        loras: None,
        enable_lcm: false,
        clip_skip: 1,
        init_image: request.init_image.clone(),
        strength: request.strength,
    };

    if let Some(extra) = &request.extra {
        if let Some(enable) = extra.get("enable_lcm").and_then(Value::as_bool) {
            wire.enable_lcm = enable;
        }
        if let Some(skip) = extra.get("clip_skip").and_then(Value::as_u64) {
            wire.clip_skip = skip as u32;
        }
        if let Some(loras) = extra.get("loras") {
            wire.loras = Some(loras.clone());
        }
    }

    wire
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

/// Reply to `POST /generate`.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// One image in a completed remote job.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteImageResult {
    pub image_id: String,
    /// Base64-encoded PNG (additionally cipher-wrapped when transport
    /// encryption is on).
    pub image_data: String,
    pub seed: i64,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// Reply to `GET /job/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteJobStatus {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub current_step: u32,
    #[serde(default)]
    pub total_steps: u32,
    #[serde(default)]
    pub results: Vec<RemoteImageResult>,
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_extra(extra: serde_json::Value) -> GenerationRequest {
        let mut req = GenerationRequest::new("a lighthouse at dusk");
        req.extra = match extra {
            Value::Object(map) => Some(map),
            _ => None,
        };
        req
    }

    // -- encode --------------------------------------------------------------

    #[test]
    fn encode_carries_core_fields() {
        let mut req = GenerationRequest::new("a lighthouse at dusk");
        req.negative_prompt = "blurry".to_string();
        req.model = "sd15".to_string();
        req.seed = 42;

        let wire = encode(&req);
        assert_eq!(wire.prompt, "a lighthouse at dusk");
        assert_eq!(wire.negative_prompt, "blurry");
        assert_eq!(wire.model, "sd15");
        assert_eq!(wire.seed, 42);
        assert_eq!(wire.steps, 20);
        assert!(!wire.enable_lcm);
        assert_eq!(wire.clip_skip, 1);
    }

    #[test]
    fn encode_maps_extra_options() {
        let req = request_with_extra(serde_json::json!({
            "enable_lcm": true,
            "clip_skip": 2,
            "loras": [{"name": "detail", "weight": 0.8}],
        }));

        let wire = encode(&req);
        assert!(wire.enable_lcm);
        assert_eq!(wire.clip_skip, 2);
        assert!(wire.loras.is_some());
    }

    #[test]
    fn encode_ignores_unknown_extra_keys() {
        let req = request_with_extra(serde_json::json!({"future_option": 7}));
        let wire = encode(&req);
        assert!(!wire.enable_lcm);
        assert_eq!(wire.clip_skip, 1);
        assert!(wire.loras.is_none());
    }

    #[test]
    fn encode_omits_empty_optionals_in_json() {
        let req = GenerationRequest::new("a cat");
        let json = serde_json::to_value(encode(&req)).unwrap();
        let obj = json.as_object().unwrap();
        assert!(!obj.contains_key("model"));
        assert!(!obj.contains_key("init_image"));
        assert!(!obj.contains_key("strength"));
        assert!(!obj.contains_key("loras"));
    }

    // -- decode --------------------------------------------------------------

    #[test]
    fn decode_job_status_with_results() {
        let json = serde_json::json!({
            "job_id": "abc",
            "status": "completed",
            "progress": 100.0,
            "current_step": 20,
            "total_steps": 20,
            "results": [{
                "image_id": "img-1",
                "image_data": "aGVsbG8=",
                "seed": 1234,
                "width": 512,
                "height": 512,
                "metadata": {"sampler": "euler_a"},
            }],
        });

        let status: RemoteJobStatus = serde_json::from_value(json).unwrap();
        assert_eq!(status.status, REMOTE_COMPLETED);
        assert_eq!(status.results.len(), 1);
        assert_eq!(status.results[0].seed, 1234);
    }

    #[test]
    fn decode_job_status_minimal() {
        let json = serde_json::json!({"job_id": "abc", "status": "processing"});
        let status: RemoteJobStatus = serde_json::from_value(json).unwrap();
        assert_eq!(status.progress, 0.0);
        assert!(status.results.is_empty());
        assert!(status.error.is_none());
    }
}
