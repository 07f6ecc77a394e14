//! Health probing for the supervised service.

use std::time::Duration;

use tokio::time::Instant;

/// Per-request timeout for a single health check.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP probe against the service's `/health` endpoint.
#[derive(Clone)]
pub struct HealthProbe {
    client: reqwest::Client,
    url: String,
}

impl HealthProbe {
    /// Build a probe for a service bound to `host:port`.
    ///
    /// A wildcard bind address is probed via loopback.
    pub fn new(host: &str, port: u16) -> Self {
        let probe_host = if host == "0.0.0.0" || host == "::" {
            "127.0.0.1"
        } else {
            host
        };

        Self {
            client: reqwest::Client::new(),
            url: format!("http://{probe_host}:{port}/health"),
        }
    }

    /// One probe: true when the endpoint answers 2xx.
    pub async fn is_healthy(&self) -> bool {
        match self
            .client
            .get(&self.url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Poll at `interval` until healthy or `deadline` elapses.
    pub async fn wait_until_healthy(&self, deadline: Duration, interval: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if self.is_healthy().await {
                return true;
            }
            tokio::time::sleep(interval).await;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_service_is_unhealthy() {
        // Reserved port nothing listens on.
        let probe = HealthProbe::new("127.0.0.1", 1);
        assert!(!probe.is_healthy().await);
    }

    #[tokio::test]
    async fn waiting_on_unreachable_service_times_out() {
        let probe = HealthProbe::new("127.0.0.1", 1);
        let healthy = probe
            .wait_until_healthy(Duration::from_millis(200), Duration::from_millis(50))
            .await;
        assert!(!healthy);
    }

    #[test]
    fn wildcard_bind_is_probed_via_loopback() {
        let probe = HealthProbe::new("0.0.0.0", 8001);
        assert_eq!(probe.url, "http://127.0.0.1:8001/health");
    }
}
