#![allow(dead_code)]

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha1::Sha1;
use star_rent_payments::config::AppConfig;
use star_rent_payments::domain::payment::{NewPayment, PaymentType};
use star_rent_payments::domain::webhook::WebhookPayload;
use star_rent_payments::error::GatewayError;
use star_rent_payments::gateways::plisio::canonical_form;
use star_rent_payments::gateways::{GatewayFactory, PaymentGateway, RateSource};
use star_rent_payments::repo::memory::{MemoryCurrencyStore, MemoryPaymentStore};
use star_rent_payments::repo::payments_repo::PaymentStore;
use star_rent_payments::service::currency_registry::CurrencyRegistry;
use star_rent_payments::service::notifier::{Notification, RecordingNotifier};
use star_rent_payments::service::payment_ledger::PaymentLedger;
use star_rent_payments::settings::{self, SettingsProvider, StaticSettings};
use star_rent_payments::AppState;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const PLISIO_KEY: &str = "test-api-key";
pub const BINANCE_SECRET: &str = "binance-secret";
pub const USER_ID: i64 = 7;

/// Rate source that never reaches the network.
pub struct OfflineRates;

#[async_trait::async_trait]
impl RateSource for OfflineRates {
    async fn usd_prices(&self) -> Result<HashMap<String, Decimal>, GatewayError> {
        Err(GatewayError::Network("offline".to_string()))
    }
}

pub struct Harness {
    pub state: AppState,
    pub store: MemoryPaymentStore,
    pub currencies: MemoryCurrencyStore,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn default_settings() -> StaticSettings {
    StaticSettings::new()
        .with(settings::PLISIO_API_KEY, PLISIO_KEY)
        .with(settings::BINANCE_API_KEY, "cert-sn")
        .with(settings::BINANCE_SECRET_KEY, BINANCE_SECRET)
        .with(settings::SITE_URL, "https://rent.example/")
}

pub async fn harness(settings: StaticSettings, config: AppConfig) -> Harness {
    harness_with_gateway(settings, config, None).await
}

pub async fn harness_with_gateway(
    settings: StaticSettings,
    config: AppConfig,
    deposit_gateway: Option<Arc<dyn PaymentGateway>>,
) -> Harness {
    let settings: Arc<dyn SettingsProvider> = Arc::new(settings);
    let store = MemoryPaymentStore::new();
    store.add_user(USER_ID, Decimal::ZERO).await;
    let currencies = MemoryCurrencyStore::new();
    let registry = CurrencyRegistry::new(
        Arc::new(currencies.clone()),
        Arc::new(OfflineRates),
        Duration::from_secs(60),
    );
    registry.seed().await.unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let ledger = PaymentLedger {
        store: Arc::new(store.clone()),
        registry: registry.clone(),
        settings: settings.clone(),
        notifier: notifier.clone(),
    };
    let gateways = GatewayFactory::new(config.gateway.clone(), settings.clone()).unwrap();

    Harness {
        state: AppState {
            ledger,
            registry,
            gateways,
            settings,
            config,
            pool: None,
            deposit_gateway,
        },
        store,
        currencies,
        notifier,
    }
}

pub async fn insert_deposit(store: &MemoryPaymentStore, id: &str, amount: Decimal) {
    store
        .insert_pending(&NewPayment {
            id: id.to_string(),
            user_id: USER_ID,
            amount,
            crypto_currency: Some("BTC".to_string()),
            payment_method: "plisio".to_string(),
            payment_type: PaymentType::Deposit,
            description: Some("Deposit via plisio".to_string()),
        })
        .await
        .unwrap();
}

pub async fn balance(store: &MemoryPaymentStore) -> (Decimal, Decimal) {
    let b = store.balance(USER_ID).await.unwrap().unwrap();
    (b.balance, b.total_deposited)
}

pub fn plisio_payload(order: &str, txn: &str, status: &str) -> WebhookPayload {
    let mut p = WebhookPayload::new();
    for (k, v) in [
        ("txn_id", txn),
        ("order_number", order),
        ("status", status),
        ("amount", "0.00231"),
        ("currency", "BTC"),
        ("source_amount", "100.00000000"),
    ] {
        p.insert(k.to_string(), serde_json::Value::String(v.to_string()));
    }
    p
}

pub fn sign_plisio(key: &str, payload: &mut WebhookPayload) {
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes()).unwrap();
    mac.update(canonical_form(payload).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());
    payload.insert("verify_hash".to_string(), serde_json::Value::String(hash));
}

pub fn form_body(payload: &WebhookPayload) -> String {
    let pairs: Vec<(String, String)> = payload
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
        .collect();
    serde_urlencoded::to_string(pairs).unwrap()
}

/// Spawned notifications land shortly after the handler returns.
pub async fn wait_for_notifications(notifier: &RecordingNotifier, count: usize) -> Vec<Notification> {
    for _ in 0..50 {
        let sent = notifier.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    notifier.sent()
}

pub async fn body_json(resp: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
