use crate::error::RegistryError;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize)]
pub struct CurrencyView {
    pub code: String,
    pub display_name: String,
    pub name: String,
    pub symbol: String,
    pub network: Option<String>,
    pub icon: Option<String>,
    pub decimals: u32,
    pub min_amount: Decimal,
    pub exchange_rate: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ConvertQuery {
    pub usd: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub address: String,
}

pub async fn list_currencies(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.list_active().await {
        Ok(items) => {
            let views: Vec<CurrencyView> = items
                .into_iter()
                .map(|c| CurrencyView {
                    display_name: state.registry.display_name(&c.code),
                    code: c.code,
                    name: c.name,
                    symbol: c.symbol,
                    network: c.network,
                    icon: c.icon,
                    decimals: c.decimals,
                    min_amount: c.min_amount,
                    exchange_rate: c.exchange_rate,
                })
                .collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn get_rate(State(state): State<AppState>, Path(code): Path<String>) -> impl IntoResponse {
    match state.registry.get(&code).await {
        Ok(Some(_)) => {
            let rate = state.registry.exchange_rate(&code).await;
            (StatusCode::OK, Json(json!({ "code": code, "rate_usd": rate }))).into_response()
        }
        Ok(None) => RegistryError::NotFound(code).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn convert(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(q): Query<ConvertQuery>,
) -> impl IntoResponse {
    match state.registry.convert_usd_to_crypto(q.usd, &code).await {
        Ok(amount) => (
            StatusCode::OK,
            Json(json!({
                "code": code,
                "usd": q.usd,
                "amount": state.registry.format_amount(amount, &code),
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn validate_address(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(q): Query<ValidateQuery>,
) -> impl IntoResponse {
    let valid = state.registry.validate_address(&q.address, &code);
    (
        StatusCode::OK,
        Json(json!({ "code": code, "address": q.address, "valid": valid })),
    )
        .into_response()
}
