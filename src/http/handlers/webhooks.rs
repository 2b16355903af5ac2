use crate::domain::webhook::{field_str, GatewayKind, WebhookPayload};
use crate::gateways::{binance, plisio};
use crate::settings;
use crate::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{info, warn};

fn plisio_error(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "message": message.into() })),
    )
        .into_response()
}

fn binance_fail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "returnCode": "FAIL", "returnMessage": message.into() })),
    )
        .into_response()
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|h| h.to_str().ok()).unwrap_or("")
}

/// Plisio posts form-encoded callbacks; JSON bodies are accepted too.
pub fn decode_plisio_body(headers: &HeaderMap, body: &[u8]) -> Option<WebhookPayload> {
    let looks_json = header(headers, "content-type").contains("application/json")
        || body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{');
    let payload = if looks_json {
        serde_json::from_slice::<WebhookPayload>(body).ok()?
    } else {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(body)
            .ok()?
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect::<WebhookPayload>()
    };
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}

/// Lifts the Binance envelope's `data` (a JSON string or object) to the top
/// level; `bizStatus` supplies `status` when the body has none.
pub fn flatten_binance_payload(raw: WebhookPayload) -> WebhookPayload {
    let data = match raw.get("data") {
        Some(Value::String(s)) => serde_json::from_str::<WebhookPayload>(s).ok(),
        Some(Value::Object(map)) => Some(map.clone()),
        _ => None,
    };
    let mut out = raw;
    if let Some(data) = data {
        out.remove("data");
        for (k, v) in data {
            out.insert(k, v);
        }
    }
    if field_str(&out, "status").is_none() {
        if let Some(biz) = out.get("bizStatus").cloned() {
            out.insert("status".to_string(), biz);
        }
    }
    out
}

pub async fn plisio_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(payload) = decode_plisio_body(&headers, &body) else {
        warn!("plisio webhook without a readable body");
        return plisio_error("No POST data received");
    };

    if let Some(api_key) = settings::secret(state.settings.as_ref(), settings::PLISIO_API_KEY).await {
        let provided = field_str(&payload, "verify_hash").unwrap_or_default();
        if !plisio::verify_callback_hash(&api_key, &payload, &provided) {
            if state.config.plisio_lenient_verify {
                warn!(
                    order_number = field_str(&payload, "order_number").unwrap_or_default(),
                    "plisio signature verification failed, processing anyway"
                );
            } else {
                warn!(
                    order_number = field_str(&payload, "order_number").unwrap_or_default(),
                    "plisio signature verification failed"
                );
                return plisio_error("Invalid signature");
            }
        }
    }

    match state.ledger.process_webhook(GatewayKind::Plisio, &payload).await {
        Ok(outcome) => {
            info!(payment_id = %outcome.payment_id, changed = outcome.changed, "plisio webhook processed");
            (StatusCode::OK, Json(json!({ "status": "success" }))).into_response()
        }
        Err(e) => {
            warn!(error = %e, "plisio webhook rejected");
            plisio_error(e.to_string())
        }
    }
}

pub async fn binance_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if !state.config.binance_enabled {
        return binance_fail(StatusCode::NOT_FOUND, "Binance Pay integration is disabled");
    }

    let Ok(text) = std::str::from_utf8(&body) else {
        return binance_fail(StatusCode::BAD_REQUEST, "Body is not valid UTF-8");
    };

    if let Some(secret) = settings::secret(state.settings.as_ref(), settings::BINANCE_SECRET_KEY).await {
        let ok = binance::verify_signature(
            &secret,
            text,
            header(&headers, binance::HEADER_SIGNATURE),
            header(&headers, binance::HEADER_TIMESTAMP),
            header(&headers, binance::HEADER_NONCE),
        );
        if !ok {
            warn!("binance webhook signature verification failed");
            return binance_fail(StatusCode::BAD_REQUEST, "Invalid signature");
        }
    }

    let Ok(raw) = serde_json::from_str::<WebhookPayload>(text) else {
        return binance_fail(StatusCode::BAD_REQUEST, "Invalid JSON payload");
    };
    let payload = flatten_binance_payload(raw);

    match state.ledger.process_webhook(GatewayKind::Binance, &payload).await {
        Ok(outcome) => {
            info!(payment_id = %outcome.payment_id, changed = outcome.changed, "binance webhook processed");
            (
                StatusCode::OK,
                Json(json!({ "returnCode": "SUCCESS", "returnMessage": null })),
            )
                .into_response()
        }
        Err(e) => {
            warn!(error = %e, "binance webhook rejected");
            binance_fail(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}
