//! Child process output forwarding.
//!
//! The service logs free-form lines on stdout and stderr; each line is
//! classified by content and re-emitted through `tracing` so service
//! output lands in the same structured stream as our own logs.

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;

/// Severity inferred from a log line's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSeverity {
    Error,
    Warning,
    Info,
}

/// Classify one line of service output.
///
/// Python tracebacks and uvicorn/logging severity markers map onto
/// error and warning; everything else is informational.
pub fn classify_line(line: &str) -> LineSeverity {
    if line.contains("ERROR") || line.contains("CRITICAL") || line.contains("Traceback") {
        LineSeverity::Error
    } else if line.contains("WARNING") || line.contains("WARN") {
        LineSeverity::Warning
    } else {
        LineSeverity::Info
    }
}

/// Spawn a task that forwards every line of `stream` into tracing,
/// tagged with the stream name. The task ends when the stream closes.
pub fn forward_stream<R>(stream_name: &'static str, stream: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match classify_line(&line) {
                LineSeverity::Error => {
                    tracing::error!(stream = stream_name, "[inference] {line}")
                }
                LineSeverity::Warning => {
                    tracing::warn!(stream = stream_name, "[inference] {line}")
                }
                LineSeverity::Info => {
                    tracing::info!(stream = stream_name, "[inference] {line}")
                }
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- classify_line -------------------------------------------------------

    #[test]
    fn error_markers_classify_as_error() {
        assert_eq!(classify_line("ERROR: model load failed"), LineSeverity::Error);
        assert_eq!(classify_line("CRITICAL shutdown"), LineSeverity::Error);
        assert_eq!(
            classify_line("Traceback (most recent call last):"),
            LineSeverity::Error
        );
    }

    #[test]
    fn warning_markers_classify_as_warning() {
        assert_eq!(classify_line("WARNING: slow sampler"), LineSeverity::Warning);
        assert_eq!(classify_line("uvicorn WARN something"), LineSeverity::Warning);
    }

    #[test]
    fn plain_output_classifies_as_info() {
        assert_eq!(
            classify_line("INFO: Uvicorn running on http://0.0.0.0:8001"),
            LineSeverity::Info
        );
        assert_eq!(classify_line("loading weights..."), LineSeverity::Info);
    }

    // -- forward_stream ------------------------------------------------------

    #[tokio::test]
    async fn forwarding_drains_the_stream_to_completion() {
        let data: &[u8] = b"line one\nWARNING line two\nERROR line three\n";
        forward_stream("stdout", data).await.unwrap();
    }
}
