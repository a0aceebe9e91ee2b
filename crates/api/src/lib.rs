pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use handlers::*;
pub use middleware::*;
pub use routes::*;
pub use state::*;

use std::future::Future;

use inspection_models::PlatformError;
use tokio::net::TcpListener;
use tracing::info;

/// Serves on an already bound listener and marks the state ready.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<(), PlatformError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state.clone());
    state.mark_ready();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("HTTP server stopped");
    Ok(())
}
