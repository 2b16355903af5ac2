use crate::gateways::{ConnectionReport, PaymentGateway};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct GatewayCheck {
    pub gateway: &'static str,
    pub configured: bool,
    pub report: Option<ConnectionReport>,
}

pub async fn refresh_rates(State(state): State<AppState>) -> impl IntoResponse {
    let refreshed = state.registry.refresh_rates().await;
    (StatusCode::OK, Json(json!({ "refreshed": refreshed }))).into_response()
}

pub async fn test_gateways(State(state): State<AppState>) -> impl IntoResponse {
    let plisio = match state.gateways.plisio().await {
        Some(g) => GatewayCheck {
            gateway: g.name(),
            configured: true,
            report: Some(g.test_connection().await),
        },
        None => GatewayCheck {
            gateway: "plisio",
            configured: false,
            report: None,
        },
    };
    let binance = match state.gateways.binance().await {
        Some(g) if state.config.binance_enabled => GatewayCheck {
            gateway: g.name(),
            configured: true,
            report: Some(g.test_connection().await),
        },
        _ => GatewayCheck {
            gateway: "binance",
            configured: false,
            report: None,
        },
    };
    (StatusCode::OK, Json(vec![plisio, binance])).into_response()
}
