use crate::domain::payment::ErrorEnvelope;
use crate::gateways::http::constant_time_eq;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub const INTERNAL_API_KEY_HEADER: &str = "X-Internal-Api-Key";

/// Guards admin routes. An empty configured key locks them entirely.
pub async fn require_internal_api_key(
    State(expected): State<String>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(INTERNAL_API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");

    if expected.is_empty() || !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        tracing::warn!(path = %request.uri().path(), "rejected admin request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorEnvelope::new("UNAUTHORIZED", "missing or invalid internal API key")),
        )
            .into_response();
    }

    next.run(request).await
}
