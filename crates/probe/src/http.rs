use std::time::{Duration, Instant};

use async_trait::async_trait;
use inspection_models::{PlatformError, ProbeOutcome};
use reqwest::Client;
use tracing::{debug, instrument};

/// A single liveness check.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self) -> ProbeOutcome;
}

/// `GET <url>` with a per-request timeout. Any non-2xx status, timeout or
/// connection error is a failure.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PlatformError::InternalError { reason: e.to_string() })?;
        Ok(Self { client, url: url.into() })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Probe for HttpProbe {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn check(&self) -> ProbeOutcome {
        let started = Instant::now();
        let result = self.client.get(&self.url).send().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(response) if response.status().is_success() => {
                ProbeOutcome::passed(response.status().as_u16(), latency_ms)
            }
            Ok(response) => {
                let status = response.status();
                ProbeOutcome::failed(Some(status.as_u16()), latency_ms, format!("unexpected status {status}"))
            }
            Err(e) => {
                debug!(error = %e, "Probe request failed");
                let reason = if e.is_timeout() {
                    "timed out".to_string()
                } else {
                    e.to_string()
                };
                ProbeOutcome::failed(None, latency_ms, reason)
            }
        }
    }
}

/// One probe for the image HEALTHCHECK command. A failed check is returned as
/// `HealthCheckFailed` so the caller can exit non-zero.
pub async fn probe_once(url: &str, timeout: Duration) -> Result<ProbeOutcome, PlatformError> {
    let outcome = HttpProbe::new(url, timeout)?.check().await;
    if outcome.success {
        Ok(outcome)
    } else {
        Err(PlatformError::HealthCheckFailed {
            reason: format!(
                "{} ({})",
                url,
                outcome.error.as_deref().unwrap_or("no detail")
            ),
        })
    }
}
