use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing of the liveness probe. The same values are written into the image
/// HEALTHCHECK and drive the in-process monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HealthPolicy {
    pub path: String,
    pub host: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub start_period_secs: u64,
    pub retries: u32,
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            host: "localhost".to_string(),
            interval_secs: 30,
            timeout_secs: 3,
            start_period_secs: 5,
            retries: 3,
        }
    }
}

impl HealthPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn start_period(&self) -> Duration {
        Duration::from_secs(self.start_period_secs)
    }

    pub fn url_for(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.host, port, self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Starting => "starting",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }

    /// Numeric encoding exported as a gauge.
    pub fn gauge_value(&self) -> i64 {
        match self {
            HealthStatus::Starting => 0,
            HealthStatus::Healthy => 1,
            HealthStatus::Unhealthy => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single probe request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn passed(status_code: u16, latency_ms: u64) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            latency_ms,
            error: None,
            checked_at: Utc::now(),
        }
    }

    pub fn failed(status_code: Option<u16>, latency_ms: u64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            latency_ms,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}

/// Body served on the liveness path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceInfo {
    pub message: String,
    pub version: String,
}
