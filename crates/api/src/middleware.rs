use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::Span;
use uuid::Uuid;

use crate::AppState;

pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Reuses the caller's correlation id or assigns a fresh one, and echoes it
/// on the response.
pub async fn correlation_id(mut request: Request, next: Next) -> Response {
    let id = match request.headers().get(CORRELATION_HEADER) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            let fresh = HeaderValue::from_str(&Uuid::new_v4().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("invalid"));
            request.headers_mut().insert(CORRELATION_HEADER, fresh.clone());
            fresh
        }
    };

    let mut response = next.run(request).await;
    response.headers_mut().insert(CORRELATION_HEADER, id);
    response
}

pub async fn count_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    state.metrics.record_request();
    next.run(request).await
}

pub fn request_span(request: &Request) -> Span {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        correlation_id = %correlation_id,
    )
}
