pub mod service;
pub mod tracing;

pub use service::*;
pub use crate::tracing::*;

#[cfg(test)]
mod tests {
    use super::*;
    use inspection_models::{HealthStatus, ProbeOutcome};

    #[test]
    fn test_probe_metrics_exported() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_probe(&ProbeOutcome::passed(200, 4));
        metrics.record_probe(&ProbeOutcome::failed(None, 3000, "timed out"));
        metrics.set_health_status(HealthStatus::Unhealthy);

        let text = metrics.get_prometheus_metrics().unwrap();
        assert!(text.contains("inspection_health_checks_total{result=\"success\"} 1"));
        assert!(text.contains("inspection_health_checks_total{result=\"failure\"} 1"));
        assert!(text.contains("inspection_health_status 2"));
    }

    #[test]
    fn test_bootstrap_outcomes_counted() {
        let metrics = MetricsService::new().unwrap();
        metrics.record_bootstrap("applied");
        metrics.record_bootstrap("already_applied");
        metrics.record_bootstrap("already_applied");

        let text = metrics.get_prometheus_metrics().unwrap();
        assert!(text.contains("inspection_bootstrap_runs_total{outcome=\"already_applied\"} 2"));
    }
}
