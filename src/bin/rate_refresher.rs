use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use star_rent_payments::config::AppConfig;
use star_rent_payments::gateways::GatewayFactory;
use star_rent_payments::repo::currencies_repo::CurrenciesRepo;
use star_rent_payments::repo::settings_repo::SettingsRepo;
use star_rent_payments::service::currency_registry::CurrencyRegistry;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&cfg.database_url)
        .await?;

    let settings = Arc::new(SettingsRepo { pool: pool.clone() });
    let gateways = GatewayFactory::new(cfg.gateway.clone(), settings)?;
    let registry = CurrencyRegistry::new(
        Arc::new(CurrenciesRepo { pool }),
        Arc::new(gateways),
        cfg.rate_cache_ttl,
    );

    loop {
        if registry.refresh_rates().await {
            tracing::info!("exchange rates refreshed");
        } else {
            tracing::warn!("no exchange rates updated this round");
        }
        tokio::time::sleep(cfg.rate_refresh_interval).await;
    }
}
