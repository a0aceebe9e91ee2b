use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers::*, middleware::*, AppState};

pub fn create_router(health_path: &str) -> Router<AppState> {
    Router::new()
        .route("/", get(service_info))
        .route(health_path, get(health_check))
        .route("/metrics", get(metrics))
}

pub fn build_router(state: AppState) -> Router {
    let health_path = state.config.health.path.clone();
    create_router(&health_path)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(correlation_id))
                .layer(TraceLayer::new_for_http().make_span_with(request_span))
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(state.clone(), count_requests)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use inspection_metrics::MetricsService;
    use inspection_models::{Config, HealthResponse, ServiceInfo};
    use std::sync::Arc;
    use tower::util::ServiceExt;

    fn state() -> AppState {
        AppState::new(Arc::new(Config::default()), Arc::new(MetricsService::new().unwrap()))
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_unavailable_before_ready() {
        let app = build_router(state());
        let response = get(app, "/health").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "starting");
    }

    #[tokio::test]
    async fn test_health_ok_after_ready() {
        let state = state();
        state.mark_ready();
        let response = get(build_router(state), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            health,
            HealthResponse {
                status: "healthy".into(),
                service: "vehicle-inspection-system".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_custom_health_path_is_mounted() {
        let mut config = Config::default();
        config.health.path = "/livez".to_string();
        config.validate().unwrap();
        let state = AppState::new(Arc::new(config), Arc::new(MetricsService::new().unwrap()));
        state.mark_ready();

        let app = build_router(state);
        assert_eq!(get(app.clone(), "/livez").await.status(), StatusCode::OK);
        assert_eq!(get(app.clone(), "/health").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(get(app, "/metrics").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_service_info() {
        let response = get(build_router(state()), "/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let info: ServiceInfo = serde_json::from_slice(&body).unwrap();
        assert_eq!(info.message, "Vehicle Inspection System API");
        assert_eq!(info.version, "0.1.0");
    }

    #[tokio::test]
    async fn test_correlation_id_generated_and_propagated() {
        let app = build_router(state());
        let response = get(app.clone(), "/").await;
        let generated = response.headers().get(CORRELATION_HEADER).unwrap();
        assert!(uuid::Uuid::parse_str(generated.to_str().unwrap()).is_ok());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header(CORRELATION_HEADER, "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers().get(CORRELATION_HEADER).unwrap(), "abc-123");
    }

    #[tokio::test]
    async fn test_custom_health_path_and_request_metrics() {
        let mut config = Config::default();
        config.health.path = "/livez".into();
        let state = AppState::new(Arc::new(config), Arc::new(MetricsService::new().unwrap()));
        state.mark_ready();
        let app = build_router(state);

        assert_eq!(get(app.clone(), "/livez").await.status(), StatusCode::OK);
        assert_eq!(get(app.clone(), "/livez").await.status(), StatusCode::OK);

        let response = get(app.clone(), "/metrics").await;
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("inspection_http_requests_total 3"));

        assert_eq!(get(app, "/health").await.status(), StatusCode::NOT_FOUND);
    }
}
