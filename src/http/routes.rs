use crate::http::handlers::{admin, currencies, ops, payments, webhooks};
use crate::http::middleware::admin_auth::require_internal_api_key;
use crate::AppState;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/admin/currencies/refresh", post(admin::refresh_rates))
        .route("/admin/gateways/test", get(admin::test_gateways))
        .layer(from_fn_with_state(
            state.config.internal_api_key.clone(),
            require_internal_api_key,
        ));

    Router::new()
        .route("/health", get(payments::health))
        .route("/api/webhook/plisio", post(webhooks::plisio_webhook))
        .route("/api/webhook/binance", post(webhooks::binance_webhook))
        .route("/deposits", post(payments::create_deposit))
        .route("/withdrawals", post(payments::create_withdrawal))
        .route("/payments/:payment_id", get(payments::get_payment))
        .route("/currencies", get(currencies::list_currencies))
        .route("/currencies/:code/rate", get(currencies::get_rate))
        .route("/currencies/:code/convert", get(currencies::convert))
        .route("/currencies/:code/validate", get(currencies::validate_address))
        .route("/ops/readiness", get(ops::readiness))
        .route("/ops/liveness", get(ops::liveness))
        .merge(admin_routes)
        .with_state(state)
}
