//! Vehicle inspection service runtime: the HTTP liveness surface plus the
//! in-process health monitor that mirrors the image HEALTHCHECK.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use inspection_api::AppState;
use inspection_metrics::MetricsService;
use inspection_models::{Config, PlatformError};
use inspection_probe::{spawn_monitor, HealthSnapshot, HttpProbe};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub use inspection_api as api;
pub use inspection_metrics as metrics;
pub use inspection_models as models;
pub use inspection_probe as probe;

pub struct RunningService {
    pub addr: SocketAddr,
    pub state: AppState,
    pub health: watch::Receiver<HealthSnapshot>,
    server: JoinHandle<Result<(), PlatformError>>,
    monitor: JoinHandle<()>,
}

impl RunningService {
    /// Waits for the server to stop, then for the monitor.
    pub async fn wait(self) -> Result<(), PlatformError> {
        let served = self
            .server
            .await
            .map_err(|e| PlatformError::InternalError { reason: e.to_string() })?;
        if let Err(e) = self.monitor.await {
            warn!(error = %e, "Health monitor task ended abnormally");
        }
        served
    }
}

/// Serves on `listener` and monitors the service's own liveness endpoint
/// until `shutdown` resolves.
pub async fn start<F>(
    config: Arc<Config>,
    listener: TcpListener,
    shutdown: F,
) -> Result<RunningService, PlatformError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let metrics = Arc::new(MetricsService::new()?);
    let state = AppState::new(config.clone(), metrics.clone());

    let probe = HttpProbe::new(config.health.url_for(addr.port()), config.health.timeout())?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let (monitor, health) = spawn_monitor(probe, config.health.clone(), metrics, stopped(stop_rx));

    let server_state = state.clone();
    let server = tokio::spawn(async move {
        let server_stop = async move {
            shutdown.await;
            info!("Shutdown requested");
            let _ = stop_tx.send(true);
        };
        inspection_api::serve(listener, server_state, server_stop).await
    });

    Ok(RunningService {
        addr,
        state,
        health,
        server,
        monitor,
    })
}

/// Resolves once `true` is published or the sender is gone.
async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}
