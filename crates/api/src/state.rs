use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use inspection_metrics::MetricsService;
use inspection_models::Config;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub metrics: Arc<MetricsService>,
    ready: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: Arc<Config>, metrics: Arc<MetricsService>) -> Self {
        Self {
            config,
            metrics,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flips the liveness endpoint from 503 to 200. Startup calls this once
    /// the listener is bound.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
