use std::path::PathBuf;
use std::sync::Arc;

use inspection_metrics::TracingService;
use inspection_models::Config;
use tokio::net::TcpListener;
use tracing::info;

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("VEHICLE_INSPECTION_CONFIG").map(PathBuf::from);
    let config = Arc::new(Config::load(config_path.as_deref())?);

    TracingService::init(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))?;

    info!(
        service = %config.server.service_name,
        version = %config.server.version,
        "Starting inspection server"
    );

    let listener = TcpListener::bind(format!("{}:{}", config.server.bind, config.server.port)).await?;
    TracingService::log_server_started(&config.server.bind, config.server.port);

    let service = inspection_runtime::start(config, listener, shutdown_signal()).await?;
    service.wait().await?;

    info!("Inspection server stopped");
    Ok(())
}
