use std::future::Future;
use std::sync::Arc;

use inspection_metrics::{MetricsService, TracingService};
use inspection_models::HealthPolicy;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, instrument};

use crate::http::Probe;
use crate::monitor::{HealthMonitor, HealthSnapshot};

/// Probes on a fixed interval until `shutdown` resolves, publishing every
/// snapshot on `tx`. The first probe fires one interval after start. The
/// status is advisory: nothing here acts on an unhealthy result.
#[instrument(skip_all, fields(interval_secs = policy.interval_secs, retries = policy.retries))]
pub async fn run_monitor<P, F>(
    probe: P,
    policy: HealthPolicy,
    metrics: Arc<MetricsService>,
    tx: watch::Sender<HealthSnapshot>,
    shutdown: F,
) where
    P: Probe,
    F: Future<Output = ()>,
{
    let started = Instant::now();
    let mut ticker = interval_at(started + policy.interval(), policy.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut monitor = HealthMonitor::new(policy);
    metrics.set_health_status(monitor.status());
    tokio::pin!(shutdown);

    info!("Health monitor started");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {
                let outcome = probe.check().await;
                let transition = monitor.observe(&outcome, started.elapsed());

                metrics.record_probe(&outcome);
                metrics.set_health_status(monitor.status());
                TracingService::log_probe(&outcome, monitor.status(), monitor.failing_streak());
                if let Some(t) = transition {
                    TracingService::log_status_transition(t.from, t.to, monitor.failing_streak());
                }

                tx.send_replace(monitor.snapshot().clone());
            }
        }
    }
    info!("Health monitor stopped");
}

/// Spawns [`run_monitor`] on its own task.
pub fn spawn_monitor<P, F>(
    probe: P,
    policy: HealthPolicy,
    metrics: Arc<MetricsService>,
    shutdown: F,
) -> (JoinHandle<()>, watch::Receiver<HealthSnapshot>)
where
    P: Probe + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let (tx, rx) = watch::channel(HealthSnapshot::default());
    let handle = tokio::spawn(run_monitor(probe, policy, metrics, tx, shutdown));
    (handle, rx)
}
