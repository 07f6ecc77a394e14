//! Error taxonomy shared by the queue, bridge, and supervisor crates.

use uuid::Uuid;

/// Errors produced while accepting, scheduling, or executing jobs.
///
/// Capacity and not-found errors surface synchronously to the caller of
/// the triggering operation. Timeouts and cancellations are terminal for
/// the job they hit and are never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The request failed shape validation before enqueue.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The pending queue is at its configured capacity.
    #[error("Queue is full")]
    QueueFull,

    /// No job with this id exists in the status table.
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// The inference service was unreachable or answered non-success.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The job exceeded its configured per-job timeout.
    #[error("Generation timeout")]
    Timeout,

    /// Cooperative cancellation was observed before completion.
    #[error("Generation cancelled")]
    Cancelled,

    /// The inference service explicitly reported a failure.
    /// The message is passed through verbatim.
    #[error("Generation failed: {0}")]
    Remote(String),

    /// A local filesystem operation failed (output writing, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_queue_full() {
        assert_eq!(CoreError::QueueFull.to_string(), "Queue is full");
    }

    #[test]
    fn display_not_found_includes_id() {
        let id = Uuid::new_v4();
        let err = CoreError::NotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn display_remote_passes_message_through() {
        let err = CoreError::Remote("CUDA out of memory".to_string());
        assert_eq!(err.to_string(), "Generation failed: CUDA out of memory");
    }

    #[test]
    fn io_error_converts() {
        let inner = std::io::Error::other("disk gone");
        let err: CoreError = inner.into();
        assert!(err.to_string().contains("disk gone"));
    }
}
