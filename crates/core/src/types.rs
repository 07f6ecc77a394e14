//! Job data model: requests, lifecycle states, statuses, and results.
//!
//! A job is one [`GenerationRequest`] plus its [`StatusRecord`]. The
//! request is immutable after enqueue; the status record is mutated by
//! exactly one worker at a time and read concurrently by pollers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Validation bounds
// ---------------------------------------------------------------------------

/// Minimum image dimension in pixels.
pub const MIN_DIMENSION: u32 = 64;
/// Maximum image dimension in pixels.
pub const MAX_DIMENSION: u32 = 2048;
/// Minimum diffusion step count.
pub const MIN_STEPS: u32 = 1;
/// Maximum diffusion step count.
pub const MAX_STEPS: u32 = 150;
/// Minimum classifier-free guidance scale.
pub const MIN_CFG_SCALE: f32 = 1.0;
/// Maximum classifier-free guidance scale.
pub const MAX_CFG_SCALE: f32 = 30.0;
/// Maximum images per request.
pub const MAX_BATCH_SIZE: u32 = 10;
/// Maximum prompt length in characters.
pub const MAX_PROMPT_LEN: usize = 1000;

// ---------------------------------------------------------------------------
// Lifecycle state
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
///
/// Legal transitions: `Queued -> Processing`, `Queued -> Cancelled`,
/// `Processing -> Completed | Failed | Cancelled`. The three terminal
/// states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Whether this state is terminal (no further transitions allowed).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a transition from `self` to `next` is legal.
    pub fn can_transition_to(self, next: JobState) -> bool {
        match self {
            Self::Queued => matches!(next, Self::Processing | Self::Cancelled),
            Self::Processing => next.is_terminal(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Generation request
// ---------------------------------------------------------------------------

/// Immutable input for one generation job.
///
/// Created once at enqueue time and never mutated afterwards. Optional
/// `extra` parameters carry named engine options (`enable_lcm`,
/// `clip_skip`, `loras`) that are forwarded to the inference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: Uuid,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub cfg_scale: f32,
    /// Requested seed; `-1` means "pick randomly".
    pub seed: i64,
    pub batch_size: u32,
    pub sampler: String,
    /// Base64-encoded conditioning image for image-to-image variants.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub init_image: Option<String>,
    /// Conditioning strength, only meaningful with `init_image`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strength: Option<f32>,
    /// Named engine options forwarded verbatim to the inference service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Map<String, serde_json::Value>>,
    pub created_at: DateTime<Utc>,
}

impl GenerationRequest {
    /// Create a request with the platform defaults: 512x512, 20 steps,
    /// cfg 7.5, random seed, batch of one, `euler_a` sampler.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            negative_prompt: String::new(),
            model: String::new(),
            width: 512,
            height: 512,
            steps: 20,
            cfg_scale: 7.5,
            seed: -1,
            batch_size: 1,
            sampler: "euler_a".to_string(),
            init_image: None,
            strength: None,
            extra: None,
            created_at: Utc::now(),
        }
    }

    /// Validate the request bounds.
    ///
    /// Rules:
    /// - Prompt must be non-empty and at most [`MAX_PROMPT_LEN`] characters.
    /// - Dimensions must be within [`MIN_DIMENSION`]..=[`MAX_DIMENSION`].
    /// - Steps within [`MIN_STEPS`]..=[`MAX_STEPS`].
    /// - Guidance scale within [`MIN_CFG_SCALE`]..=[`MAX_CFG_SCALE`].
    /// - Batch size within `1..=`[`MAX_BATCH_SIZE`].
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "Prompt must not be empty".to_string(),
            ));
        }
        if self.prompt.chars().count() > MAX_PROMPT_LEN {
            return Err(CoreError::Validation(format!(
                "Prompt must not exceed {MAX_PROMPT_LEN} characters"
            )));
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                return Err(CoreError::Validation(format!(
                    "{name} must be within {MIN_DIMENSION}..={MAX_DIMENSION}, got {value}"
                )));
            }
        }
        if !(MIN_STEPS..=MAX_STEPS).contains(&self.steps) {
            return Err(CoreError::Validation(format!(
                "steps must be within {MIN_STEPS}..={MAX_STEPS}, got {}",
                self.steps
            )));
        }
        if !(MIN_CFG_SCALE..=MAX_CFG_SCALE).contains(&self.cfg_scale) {
            return Err(CoreError::Validation(format!(
                "cfg_scale must be within {MIN_CFG_SCALE}..={MAX_CFG_SCALE}, got {}",
                self.cfg_scale
            )));
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            return Err(CoreError::Validation(format!(
                "batch_size must be within 1..={MAX_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Status record
// ---------------------------------------------------------------------------

/// Mutable per-job status, owned by the queue and written by one worker
/// at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    pub id: Uuid,
    pub state: JobState,
    /// Progress percentage in `0.0..=100.0`.
    pub progress: f64,
    pub current_step: u32,
    pub total_steps: u32,
    /// Populated only when the job completes.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub results: Vec<GenerationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusRecord {
    /// Create the initial record for a freshly enqueued request.
    pub fn queued(request: &GenerationRequest) -> Self {
        Self {
            id: request.id,
            state: JobState::Queued,
            progress: 0.0,
            current_step: 0,
            total_steps: request.steps,
            results: Vec::new(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Generation result
// ---------------------------------------------------------------------------

/// One produced image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    /// Filesystem path of the written PNG.
    pub image_path: String,
    /// URL under which the file server exposes the image.
    pub image_url: String,
    /// The seed actually used (random seeds resolved to an integer).
    pub seed: i64,
    pub width: u32,
    pub height: u32,
    /// String-keyed metadata bag (prompt, sampler, model, timing;
    /// `mock=true` when produced by the placeholder path).
    pub metadata: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Queue entry
// ---------------------------------------------------------------------------

/// A pending request paired with its 1-based position.
///
/// Positions are recomputed whenever an entry leaves the pending list,
/// so they always reflect the current order.
#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub request: GenerationRequest,
    pub position: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    // -- JobState ------------------------------------------------------------

    #[test]
    fn queued_can_start_or_cancel() {
        assert!(JobState::Queued.can_transition_to(JobState::Processing));
        assert!(JobState::Queued.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Queued.can_transition_to(JobState::Completed));
        assert!(!JobState::Queued.can_transition_to(JobState::Failed));
    }

    #[test]
    fn processing_can_reach_all_terminal_states() {
        assert!(JobState::Processing.can_transition_to(JobState::Completed));
        assert!(JobState::Processing.can_transition_to(JobState::Failed));
        assert!(JobState::Processing.can_transition_to(JobState::Cancelled));
        assert!(!JobState::Processing.can_transition_to(JobState::Queued));
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for state in [JobState::Completed, JobState::Failed, JobState::Cancelled] {
            assert!(state.is_terminal());
            for next in [
                JobState::Queued,
                JobState::Processing,
                JobState::Completed,
                JobState::Failed,
                JobState::Cancelled,
            ] {
                assert!(!state.can_transition_to(next));
            }
        }
    }

    #[test]
    fn state_serializes_lowercase() {
        let json = serde_json::to_string(&JobState::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }

    // -- GenerationRequest::validate ----------------------------------------

    #[test]
    fn default_request_is_valid() {
        assert!(GenerationRequest::new("a cat").validate().is_ok());
    }

    #[test]
    fn empty_prompt_rejected() {
        let req = GenerationRequest::new("   ");
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn oversized_prompt_rejected() {
        let req = GenerationRequest::new("p".repeat(MAX_PROMPT_LEN + 1));
        assert_matches!(req.validate(), Err(CoreError::Validation(_)));
    }

    #[test]
    fn dimension_bounds_enforced() {
        let mut req = GenerationRequest::new("a cat");
        req.width = MIN_DIMENSION - 1;
        assert!(req.validate().is_err());
        req.width = 512;
        req.height = MAX_DIMENSION + 1;
        assert!(req.validate().is_err());
    }

    #[test]
    fn step_bounds_enforced() {
        let mut req = GenerationRequest::new("a cat");
        req.steps = 0;
        assert!(req.validate().is_err());
        req.steps = MAX_STEPS + 1;
        assert!(req.validate().is_err());
        req.steps = MAX_STEPS;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn cfg_scale_bounds_enforced() {
        let mut req = GenerationRequest::new("a cat");
        req.cfg_scale = 0.5;
        assert!(req.validate().is_err());
        req.cfg_scale = 30.5;
        assert!(req.validate().is_err());
    }

    #[test]
    fn batch_size_bounds_enforced() {
        let mut req = GenerationRequest::new("a cat");
        req.batch_size = 0;
        assert!(req.validate().is_err());
        req.batch_size = MAX_BATCH_SIZE + 1;
        assert!(req.validate().is_err());
    }

    // -- StatusRecord --------------------------------------------------------

    #[test]
    fn queued_record_mirrors_request() {
        let req = GenerationRequest::new("a cat");
        let status = StatusRecord::queued(&req);
        assert_eq!(status.id, req.id);
        assert_eq!(status.state, JobState::Queued);
        assert_eq!(status.total_steps, req.steps);
        assert_eq!(status.progress, 0.0);
        assert!(status.results.is_empty());
        assert!(status.started_at.is_none());
    }
}
