//! Inference bridge: submits jobs to the inference service and polls
//! for completion, with a deterministic local placeholder fallback.
//!
//! Provides the wire codec for the service's REST schema, the optional
//! transport cipher, the HTTP client, and [`Engine`], the seam the
//! worker pool drives generations through.

pub mod client;
pub mod codec;
pub mod crypto;
pub mod engine;
pub mod mock;

use darkroom_core::types::{GenerationRequest, GenerationResult};
use darkroom_core::CoreError;

pub use engine::InferenceBridge;

/// Progress callback invoked as a generation advances.
///
/// Arguments are the progress percentage (`0.0..=100.0`) and the current
/// step number.
pub type ProgressFn = dyn Fn(f64, u32) + Send + Sync;

/// A generation backend driven by the worker pool.
///
/// [`engine::InferenceBridge`] is the production implementation; tests
/// substitute stubs.
pub trait Engine: Send + Sync {
    /// Drive one request to completion, reporting progress along the way.
    ///
    /// Dropping the returned future abandons the generation from the
    /// orchestrator's perspective; it does not interrupt work already
    /// running on the inference service.
    fn generate(
        &self,
        request: &GenerationRequest,
        progress: &ProgressFn,
    ) -> impl std::future::Future<Output = Result<Vec<GenerationResult>, CoreError>> + Send;
}
