use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use inspection_api::AppState;
use inspection_metrics::MetricsService;
use inspection_models::Config;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// The HTTP surface served in-process on an ephemeral port.
pub struct TestServer {
    pub base_url: String,
    pub addr: SocketAddr,
    pub state: AppState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        (&mut self.handle).await?;
        Ok(())
    }
}

pub async fn spawn_server(config: Config) -> Result<TestServer> {
    let metrics = Arc::new(MetricsService::new()?);
    let state = AppState::new(Arc::new(config), metrics);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (tx, rx) = oneshot::channel::<()>();

    let serve_state = state.clone();
    let handle = tokio::spawn(async move {
        let shutdown = async move {
            let _ = rx.await;
        };
        if let Err(e) = inspection_api::serve(listener, serve_state, shutdown).await {
            eprintln!("test server failed: {e}");
        }
    });

    Ok(TestServer {
        base_url: format!("http://{}", addr),
        addr,
        state,
        shutdown: Some(tx),
        handle,
    })
}
