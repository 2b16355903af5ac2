use sqlx::postgres::PgPoolOptions;
use star_rent_payments::config::AppConfig;
use star_rent_payments::gateways::GatewayFactory;
use star_rent_payments::http::routes::build_router;
use star_rent_payments::repo::currencies_repo::CurrenciesRepo;
use star_rent_payments::repo::notifications_repo::NotificationsRepo;
use star_rent_payments::repo::payments_repo::PaymentsRepo;
use star_rent_payments::repo::settings_repo::SettingsRepo;
use star_rent_payments::service::currency_registry::CurrencyRegistry;
use star_rent_payments::service::notifier::DbNotifier;
use star_rent_payments::service::payment_ledger::PaymentLedger;
use star_rent_payments::settings::SettingsProvider;
use star_rent_payments::AppState;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let settings: Arc<dyn SettingsProvider> = Arc::new(SettingsRepo { pool: pool.clone() });
    let gateways = GatewayFactory::new(cfg.gateway.clone(), settings.clone())?;

    let registry = CurrencyRegistry::new(
        Arc::new(CurrenciesRepo { pool: pool.clone() }),
        Arc::new(gateways.clone()),
        cfg.rate_cache_ttl,
    );
    registry.seed().await?;

    let ledger = PaymentLedger {
        store: Arc::new(PaymentsRepo { pool: pool.clone() }),
        registry: registry.clone(),
        settings: settings.clone(),
        notifier: Arc::new(DbNotifier {
            repo: NotificationsRepo { pool: pool.clone() },
        }),
    };

    if cfg.plisio_lenient_verify {
        tracing::warn!("plisio webhook verification is lenient; unsigned callbacks will be accepted");
    }

    let state = AppState {
        ledger,
        registry,
        gateways,
        settings,
        config: cfg.clone(),
        pool: Some(pool),
        deposit_gateway: None,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
