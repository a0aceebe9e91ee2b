use tracing::{info, error, warn};
use tracing_subscriber::EnvFilter;
use inspection_models::{HealthStatus, LogFormat, LoggingConfig, ProbeOutcome};

pub struct TracingService;

impl TracingService {
    /// Installs the global subscriber. `RUST_LOG` wins over the configured
    /// level when set.
    pub fn init(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Self::install(config, false)
    }

    /// Same as [`TracingService::init`] but logs to stderr, leaving stdout to
    /// command output.
    pub fn init_stderr(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Self::install(config, true)
    }

    fn install(config: &LoggingConfig, stderr: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))?;
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339());

        match (&config.format, stderr) {
            (LogFormat::Json, false) => builder.json().with_current_span(true).try_init()?,
            (LogFormat::Json, true) => builder
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr)
                .try_init()?,
            (LogFormat::Pretty, false) => builder.try_init()?,
            (LogFormat::Pretty, true) => builder.with_writer(std::io::stderr).try_init()?,
        }

        Ok(())
    }

    pub fn log_probe(outcome: &ProbeOutcome, status: HealthStatus, failing_streak: u32) {
        if outcome.success {
            info!(
                status_code = outcome.status_code.unwrap_or(0),
                latency_ms = outcome.latency_ms,
                status = %status,
                "Health check passed"
            );
        } else {
            warn!(
                status_code = outcome.status_code.unwrap_or(0),
                latency_ms = outcome.latency_ms,
                error = %outcome.error.as_deref().unwrap_or("none"),
                failing_streak = failing_streak,
                status = %status,
                "Health check failed"
            );
        }
    }

    pub fn log_status_transition(from: HealthStatus, to: HealthStatus, failing_streak: u32) {
        match to {
            HealthStatus::Unhealthy => error!(
                from = %from,
                to = %to,
                failing_streak = failing_streak,
                "Container reported unhealthy"
            ),
            _ => info!(
                from = %from,
                to = %to,
                "Health status changed"
            ),
        }
    }

    pub fn log_bootstrap_step(step: &str, database: &str, role: Option<&str>) {
        info!(
            step = %step,
            database = %database,
            role = %role.unwrap_or("none"),
            "Bootstrap step applied"
        );
    }

    pub fn log_server_started(bind: &str, port: u16) {
        info!(
            bind = %bind,
            port = port,
            "HTTP server listening"
        );
    }
}
