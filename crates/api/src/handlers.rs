use axum::{extract::State, http::StatusCode, response::Json};
use inspection_models::{HealthResponse, HealthStatus, ServiceInfo};
use tracing::{debug, error, instrument};

use crate::AppState;

const SERVICE_MESSAGE: &str = "Vehicle Inspection System API";

#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = if state.is_ready() {
        (StatusCode::OK, HealthStatus::Healthy)
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Starting)
    };
    debug!(status = %status, "Liveness requested");
    (
        code,
        Json(HealthResponse {
            status: status.as_str().to_string(),
            service: state.config.server.service_name.clone(),
        }),
    )
}

pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: SERVICE_MESSAGE.to_string(),
        version: state.config.server.version.clone(),
    })
}

#[instrument(skip(state))]
pub async fn metrics(State(state): State<AppState>) -> Result<String, StatusCode> {
    match state.metrics.get_prometheus_metrics() {
        Ok(metrics) => Ok(metrics),
        Err(e) => {
            error!("Failed to get metrics: {}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
