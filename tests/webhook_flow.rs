mod common;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use common::*;
use rust_decimal::Decimal;
use star_rent_payments::config::AppConfig;
use star_rent_payments::domain::payment::PaymentStatus;
use star_rent_payments::domain::webhook::GatewayKind;
use star_rent_payments::gateways::binance;
use star_rent_payments::http::handlers::webhooks::{binance_webhook, plisio_webhook};
use star_rent_payments::repo::payments_repo::PaymentStore;
use star_rent_payments::service::notifier::{Notifier, RecordingNotifier};
use star_rent_payments::settings::StaticSettings;
use std::sync::Arc;

fn form_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "content-type",
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    headers
}

async fn post_plisio(h: &Harness, body: String) -> (StatusCode, serde_json::Value) {
    let resp = plisio_webhook(State(h.state.clone()), form_headers(), Bytes::from(body)).await;
    let status = resp.status();
    (status, body_json(resp).await)
}

fn binance_config() -> AppConfig {
    AppConfig {
        binance_enabled: true,
        ..AppConfig::default()
    }
}

fn binance_headers(body: &str, secret: &str) -> HeaderMap {
    let ts = "1700000000000";
    let nonce = "abcdefghijklmnopqrstuvwxyz123456";
    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    headers.insert(binance::HEADER_TIMESTAMP, HeaderValue::from_static(ts));
    headers.insert(binance::HEADER_NONCE, HeaderValue::from_static(nonce));
    let sig = binance::sign(secret, ts, nonce, body);
    headers.insert(binance::HEADER_SIGNATURE, HeaderValue::from_str(&sig).unwrap());
    headers
}

#[tokio::test]
async fn completed_plisio_callback_credits_exactly_once() {
    let h = harness(default_settings(), AppConfig::default()).await;
    insert_deposit(&h.store, "a1b2c3", Decimal::from(100)).await;

    let mut payload = plisio_payload("a1b2c3", "5f8a1c", "completed");
    sign_plisio(PLISIO_KEY, &mut payload);
    let body = form_body(&payload);

    let (status, json) = post_plisio(&h, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");

    let payment = h.store.get("a1b2c3").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.transaction_id.as_deref(), Some("5f8a1c"));
    assert_eq!(balance(&h.store).await, (Decimal::from(100), Decimal::from(100)));

    // Redelivery acks success and changes nothing.
    let (status, _) = post_plisio(&h, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance(&h.store).await, (Decimal::from(100), Decimal::from(100)));

    let sent = wait_for_notifications(&h.notifier, 1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].message, "Your deposit of $100.00 has been completed successfully!");

    let activity = h.store.activity().await;
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].description, "Deposit of $100.00 completed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_deliveries_credit_once() {
    let h = harness(default_settings(), AppConfig::default()).await;
    insert_deposit(&h.store, "ord-race", Decimal::from(100)).await;

    let mut payload = plisio_payload("ord-race", "tx-race", "completed");
    sign_plisio(PLISIO_KEY, &mut payload);

    let ledger = &h.state.ledger;
    let (a, b) = tokio::join!(
        ledger.process_webhook(GatewayKind::Plisio, &payload),
        ledger.process_webhook(GatewayKind::Plisio, &payload),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!([&a, &b].iter().filter(|o| o.changed).count(), 1);
    assert_eq!(a.status, PaymentStatus::Completed);
    assert_eq!(b.status, PaymentStatus::Completed);

    // Same again through the endpoint, racing two deliveries of a second order.
    insert_deposit(&h.store, "ord-race-2", Decimal::from(40)).await;
    let mut second = plisio_payload("ord-race-2", "tx-race-2", "completed");
    sign_plisio(PLISIO_KEY, &mut second);
    let body = form_body(&second);
    let ((s1, j1), (s2, j2)) = tokio::join!(post_plisio(&h, body.clone()), post_plisio(&h, body));
    assert_eq!(s1, StatusCode::OK);
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(j1["status"], "success");
    assert_eq!(j2["status"], "success");

    assert_eq!(balance(&h.store).await, (Decimal::from(140), Decimal::from(140)));
    assert_eq!(h.store.activity().await.len(), 2);
}

#[tokio::test]
async fn pending_then_completed_credits_on_completion() {
    let h = harness(default_settings(), AppConfig::default()).await;
    insert_deposit(&h.store, "ord-2", Decimal::new(25050, 2)).await;

    let mut pending = plisio_payload("ord-2", "tx-2", "pending");
    sign_plisio(PLISIO_KEY, &mut pending);
    let (status, _) = post_plisio(&h, form_body(&pending)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance(&h.store).await.0, Decimal::ZERO);

    let mut done = plisio_payload("ord-2", "tx-2", "completed");
    sign_plisio(PLISIO_KEY, &mut done);
    let (status, _) = post_plisio(&h, form_body(&done)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance(&h.store).await.0, Decimal::new(25050, 2));
}

#[tokio::test]
async fn unknown_order_is_rejected() {
    let h = harness(default_settings(), AppConfig::default()).await;
    let mut payload = plisio_payload("missing", "tx-x", "completed");
    sign_plisio(PLISIO_KEY, &mut payload);

    let (status, json) = post_plisio(&h, form_body(&payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], "error");
    assert!(json["message"].as_str().unwrap().contains("Payment not found for order: missing"));
}

#[tokio::test]
async fn missing_field_and_empty_body_are_rejected() {
    let h = harness(default_settings(), AppConfig::default()).await;

    let (status, json) = post_plisio(&h, String::new()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "No POST data received");

    let mut payload = plisio_payload("a1b2c3", "tx", "completed");
    payload.remove("txn_id");
    sign_plisio(PLISIO_KEY, &mut payload);
    let (status, json) = post_plisio(&h, form_body(&payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Missing required field: txn_id");
}

#[tokio::test]
async fn bad_signature_is_rejected_in_strict_mode() {
    let h = harness(default_settings(), AppConfig::default()).await;
    insert_deposit(&h.store, "ord-3", Decimal::from(100)).await;

    let mut payload = plisio_payload("ord-3", "tx-3", "completed");
    sign_plisio("some-other-key", &mut payload);

    let (status, json) = post_plisio(&h, form_body(&payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["message"], "Invalid signature");
    let payment = h.store.get("ord-3").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(balance(&h.store).await.0, Decimal::ZERO);
}

#[tokio::test]
async fn bad_signature_is_processed_in_lenient_mode() {
    let config = AppConfig {
        plisio_lenient_verify: true,
        ..AppConfig::default()
    };
    let h = harness(default_settings(), config).await;
    insert_deposit(&h.store, "ord-4", Decimal::from(100)).await;

    let payload = plisio_payload("ord-4", "tx-4", "completed");
    let (status, _) = post_plisio(&h, form_body(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance(&h.store).await.0, Decimal::from(100));
}

#[tokio::test]
async fn json_callback_is_accepted() {
    let h = harness(default_settings(), AppConfig::default()).await;
    insert_deposit(&h.store, "ord-5", Decimal::from(150)).await;

    let mut payload = plisio_payload("ord-5", "tx-5", "expired");
    sign_plisio(PLISIO_KEY, &mut payload);
    let body = serde_json::to_string(&payload).unwrap();

    let mut headers = HeaderMap::new();
    headers.insert("content-type", HeaderValue::from_static("application/json"));
    let resp = plisio_webhook(State(h.state.clone()), headers, Bytes::from(body)).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let payment = h.store.get("ord-5").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Failed);
    assert_eq!(balance(&h.store).await.0, Decimal::ZERO);
}

#[tokio::test]
async fn terminal_payment_is_not_reopened() {
    let h = harness(default_settings(), AppConfig::default()).await;
    insert_deposit(&h.store, "ord-6", Decimal::from(100)).await;

    let mut done = plisio_payload("ord-6", "tx-6", "completed");
    sign_plisio(PLISIO_KEY, &mut done);
    post_plisio(&h, form_body(&done)).await;

    let mut late = plisio_payload("ord-6", "tx-6", "expired");
    sign_plisio(PLISIO_KEY, &mut late);
    let (status, json) = post_plisio(&h, form_body(&late)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "success");

    let payment = h.store.get("ord-6").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(balance(&h.store).await.0, Decimal::from(100));
}

#[tokio::test]
async fn failed_credit_rolls_back_and_redelivery_recovers() {
    let h = harness(default_settings(), AppConfig::default()).await;
    insert_deposit(&h.store, "ord-7", Decimal::from(200)).await;

    let mut payload = plisio_payload("ord-7", "tx-7", "completed");
    sign_plisio(PLISIO_KEY, &mut payload);
    let body = form_body(&payload);

    h.store.set_fail_credits(true);
    let (status, json) = post_plisio(&h, body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], "error");
    let payment = h.store.get("ord-7").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(balance(&h.store).await, (Decimal::ZERO, Decimal::ZERO));

    h.store.set_fail_credits(false);
    let (status, _) = post_plisio(&h, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance(&h.store).await, (Decimal::from(200), Decimal::from(200)));
}

#[tokio::test]
async fn notification_failure_does_not_undo_credit() {
    let mut h = harness(default_settings(), AppConfig::default()).await;
    let failing = Arc::new(RecordingNotifier::failing());
    h.state.ledger.notifier = failing.clone() as Arc<dyn Notifier>;
    insert_deposit(&h.store, "ord-8", Decimal::from(100)).await;

    let mut payload = plisio_payload("ord-8", "tx-8", "completed");
    sign_plisio(PLISIO_KEY, &mut payload);
    let (status, _) = post_plisio(&h, form_body(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(failing.sent().is_empty());
    assert_eq!(balance(&h.store).await.0, Decimal::from(100));
}

#[tokio::test]
async fn unsigned_callbacks_pass_without_configured_key() {
    let h = harness(StaticSettings::new(), AppConfig::default()).await;
    insert_deposit(&h.store, "ord-9", Decimal::from(100)).await;

    let payload = plisio_payload("ord-9", "tx-9", "completed");
    let (status, _) = post_plisio(&h, form_body(&payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance(&h.store).await.0, Decimal::from(100));
}

#[tokio::test]
async fn binance_endpoint_is_disabled_by_default() {
    let h = harness(default_settings(), AppConfig::default()).await;
    let resp = binance_webhook(State(h.state.clone()), HeaderMap::new(), Bytes::from_static(b"{}")).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let json = body_json(resp).await;
    assert_eq!(json["returnCode"], "FAIL");
}

#[tokio::test]
async fn signed_binance_success_credits_deposit() {
    let h = harness(default_settings(), binance_config()).await;
    insert_deposit(&h.store, "bn-1", Decimal::from(300)).await;

    let body = serde_json::json!({
        "bizType": "PAY",
        "bizStatus": "PAY_SUCCESS",
        "data": "{\"merchantTradeNo\":\"bn-1\",\"transactionId\":\"T-991\",\"totalFee\":\"300\"}"
    })
    .to_string();
    let headers = binance_headers(&body, BINANCE_SECRET);

    let resp = binance_webhook(State(h.state.clone()), headers.clone(), Bytes::from(body.clone())).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["returnCode"], "SUCCESS");

    let payment = h.store.get("bn-1").await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
    assert_eq!(payment.transaction_id.as_deref(), Some("T-991"));

    let resp = binance_webhook(State(h.state.clone()), headers, Bytes::from(body)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(balance(&h.store).await, (Decimal::from(300), Decimal::from(300)));
}

#[tokio::test]
async fn binance_bad_signature_is_rejected() {
    let h = harness(default_settings(), binance_config()).await;
    insert_deposit(&h.store, "bn-2", Decimal::from(300)).await;

    let body = r#"{"merchantTradeNo":"bn-2","bizStatus":"PAY_SUCCESS"}"#;
    let headers = binance_headers(body, "wrong-secret");
    let resp = binance_webhook(State(h.state.clone()), headers, Bytes::from_static(body.as_bytes())).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["returnCode"], "FAIL");
    assert_eq!(json["returnMessage"], "Invalid signature");
    assert_eq!(balance(&h.store).await.0, Decimal::ZERO);
}
