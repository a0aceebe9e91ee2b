use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use inspection_models::{HealthStatus, PlatformError, ProbeOutcome};
use tracing::{debug, instrument};

fn internal(e: impl std::fmt::Display) -> PlatformError {
    PlatformError::InternalError { reason: e.to_string() }
}

pub struct MetricsService {
    registry: Registry,
    health_checks_total: IntCounterVec,
    health_status: IntGauge,
    health_check_latency_ms: Histogram,
    bootstrap_runs_total: IntCounterVec,
    http_requests_total: IntCounter,
}

impl MetricsService {
    pub fn new() -> Result<Self, PlatformError> {
        let registry = Registry::new();

        let health_checks_total = IntCounterVec::new(
            Opts::new("inspection_health_checks_total", "Total number of liveness probes"),
            &["result"],
        ).map_err(internal)?;

        let health_status = IntGauge::new(
            "inspection_health_status",
            "Current health status (0 starting, 1 healthy, 2 unhealthy)",
        ).map_err(internal)?;

        let health_check_latency_ms = Histogram::with_opts(HistogramOpts::new(
            "inspection_health_check_latency_ms",
            "Liveness probe latency in milliseconds",
        )).map_err(internal)?;

        let bootstrap_runs_total = IntCounterVec::new(
            Opts::new("inspection_bootstrap_runs_total", "Database bootstrap runs by outcome"),
            &["outcome"],
        ).map_err(internal)?;

        let http_requests_total = IntCounter::new(
            "inspection_http_requests_total",
            "Total number of HTTP requests served",
        ).map_err(internal)?;

        registry.register(Box::new(health_checks_total.clone())).map_err(internal)?;
        registry.register(Box::new(health_status.clone())).map_err(internal)?;
        registry.register(Box::new(health_check_latency_ms.clone())).map_err(internal)?;
        registry.register(Box::new(bootstrap_runs_total.clone())).map_err(internal)?;
        registry.register(Box::new(http_requests_total.clone())).map_err(internal)?;

        Ok(Self {
            registry,
            health_checks_total,
            health_status,
            health_check_latency_ms,
            bootstrap_runs_total,
            http_requests_total,
        })
    }

    pub fn record_probe(&self, outcome: &ProbeOutcome) {
        let result = if outcome.success { "success" } else { "failure" };
        self.health_checks_total.with_label_values(&[result]).inc();
        self.health_check_latency_ms.observe(outcome.latency_ms as f64);
        debug!(result, latency_ms = outcome.latency_ms, "Recorded probe");
    }

    pub fn set_health_status(&self, status: HealthStatus) {
        self.health_status.set(status.gauge_value());
    }

    pub fn record_bootstrap(&self, outcome: &str) {
        self.bootstrap_runs_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_request(&self) {
        self.http_requests_total.inc();
    }

    #[instrument(skip(self))]
    pub fn get_prometheus_metrics(&self) -> Result<String, PlatformError> {
        let metric_families = self.registry.gather();
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();

        encoder.encode(&metric_families, &mut buffer).map_err(internal)?;

        String::from_utf8(buffer).map_err(internal)
    }
}
