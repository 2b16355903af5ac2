pub mod config;
pub mod domain {
    pub mod currency;
    pub mod payment;
    pub mod webhook;
}
pub mod error;
pub mod gateways;
pub mod http {
    pub mod handlers {
        pub mod admin;
        pub mod currencies;
        pub mod ops;
        pub mod payments;
        pub mod webhooks;
    }
    pub mod middleware {
        pub mod admin_auth;
    }
    pub mod routes;
}
pub mod repo {
    pub mod currencies_repo;
    pub mod memory;
    pub mod notifications_repo;
    pub mod payments_repo;
    pub mod settings_repo;
}
pub mod service {
    pub mod currency_registry;
    pub mod notifier;
    pub mod payment_ledger;
}
pub mod settings;

use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub ledger: service::payment_ledger::PaymentLedger,
    pub registry: service::currency_registry::CurrencyRegistry,
    pub gateways: gateways::GatewayFactory,
    pub settings: Arc<dyn settings::SettingsProvider>,
    pub config: config::AppConfig,
    /// `None` when running on the in-memory stores.
    pub pool: Option<sqlx::PgPool>,
    /// Replaces the settings-built Plisio client for deposits.
    pub deposit_gateway: Option<Arc<dyn gateways::PaymentGateway>>,
}
