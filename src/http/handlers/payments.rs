use crate::domain::payment::{DepositRequest, WithdrawalRequest};
use crate::error::LedgerError;
use crate::gateways::PaymentGateway;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// The deposit gateway: an injected override, else Plisio from settings.
async fn deposit_gateway(state: &AppState) -> Result<Arc<dyn PaymentGateway>, LedgerError> {
    if let Some(gateway) = &state.deposit_gateway {
        return Ok(gateway.clone());
    }
    Ok(state.gateways.by_name("plisio").await?)
}

pub async fn create_deposit(State(state): State<AppState>, Json(req): Json<DepositRequest>) -> impl IntoResponse {
    let gateway = match deposit_gateway(&state).await {
        Ok(g) => g,
        Err(e) => return e.into_response(),
    };
    match state.ledger.create_deposit(req, gateway.as_ref()).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_payment(State(state): State<AppState>, Path(payment_id): Path<String>) -> impl IntoResponse {
    match state.ledger.payment(&payment_id).await {
        Ok(p) => (StatusCode::OK, Json(p)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_withdrawal(
    State(state): State<AppState>,
    Json(req): Json<WithdrawalRequest>,
) -> impl IntoResponse {
    match state.ledger.request_withdrawal(req).await {
        Ok(resp) => (StatusCode::OK, Json(resp)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
