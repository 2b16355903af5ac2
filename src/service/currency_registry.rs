use crate::domain::currency::{self, Currency, SUPPORTED_CURRENCIES};
use crate::error::RegistryError;
use crate::gateways::RateSource;
use crate::repo::currencies_repo::CurrencyStore;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

type PriceSnapshot = (Instant, HashMap<String, Decimal>);

/// Supported currencies, their rules, and USD rates.
///
/// Live prices are cached for `ttl`. A failed fetch is cached as an empty
/// snapshot so callers fall back to static rates until the next window.
#[derive(Clone)]
pub struct CurrencyRegistry {
    store: Arc<dyn CurrencyStore>,
    rates: Arc<dyn RateSource>,
    cache: Arc<RwLock<Option<PriceSnapshot>>>,
    ttl: Duration,
}

impl CurrencyRegistry {
    pub fn new(store: Arc<dyn CurrencyStore>, rates: Arc<dyn RateSource>, ttl: Duration) -> Self {
        Self {
            store,
            rates,
            cache: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    pub async fn seed(&self) -> Result<usize, RegistryError> {
        for spec in SUPPORTED_CURRENCIES {
            self.store.upsert(&spec.to_currency()).await?;
        }
        info!(count = SUPPORTED_CURRENCIES.len(), "currencies seeded");
        Ok(SUPPORTED_CURRENCIES.len())
    }

    pub async fn list_active(&self) -> Result<Vec<Currency>, RegistryError> {
        let mut list = self.store.list_active().await?;
        list.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(list)
    }

    pub async fn get(&self, code: &str) -> Result<Option<Currency>, RegistryError> {
        Ok(self.store.get_active(code).await?)
    }

    async fn require(&self, code: &str) -> Result<Currency, RegistryError> {
        self.get(code)
            .await?
            .ok_or_else(|| RegistryError::NotFound(code.to_string()))
    }

    async fn cached_prices(&self) -> Option<HashMap<String, Decimal>> {
        let read = self.cache.read().await;
        match &*read {
            Some((loaded_at, prices)) if loaded_at.elapsed() <= self.ttl => Some(prices.clone()),
            _ => None,
        }
    }

    async fn live_prices(&self) -> HashMap<String, Decimal> {
        if let Some(prices) = self.cached_prices().await {
            return prices;
        }
        let prices = match self.rates.usd_prices().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "live rate lookup failed, using fallback rates");
                HashMap::new()
            }
        };
        let mut write = self.cache.write().await;
        *write = Some((Instant::now(), prices.clone()));
        prices
    }

    /// USD per unit of `code`. Never fails.
    pub async fn exchange_rate(&self, code: &str) -> Decimal {
        match self.live_prices().await.get(code) {
            Some(rate) if *rate > Decimal::ZERO => *rate,
            _ => currency::fallback_rate(code),
        }
    }

    pub async fn convert_usd_to_crypto(&self, amount_usd: Decimal, code: &str) -> Result<Decimal, RegistryError> {
        self.require(code).await?;
        let rate = self.exchange_rate(code).await;
        amount_usd
            .checked_div(rate)
            .ok_or_else(|| RegistryError::Validation(format!("Exchange rate for {code} is zero")))
    }

    pub async fn convert_crypto_to_usd(&self, amount: Decimal, code: &str) -> Result<Decimal, RegistryError> {
        self.require(code).await?;
        let rate = self.exchange_rate(code).await;
        if rate.is_zero() {
            return Err(RegistryError::Validation(format!("Exchange rate for {code} is zero")));
        }
        amount
            .checked_mul(rate)
            .ok_or_else(|| RegistryError::Validation("Amount is too large to convert".to_string()))
    }

    pub fn validate_address(&self, address: &str, code: &str) -> bool {
        currency::validate_address(address, code)
    }

    /// Re-fetches live prices and stores them. Failures are logged and reported as `false`.
    pub async fn refresh_rates(&self) -> bool {
        let prices = match self.rates.usd_prices().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "rate refresh failed");
                return false;
            }
        };

        let mut updated = 0usize;
        for spec in SUPPORTED_CURRENCIES {
            let Some(rate) = prices.get(spec.code).filter(|r| **r > Decimal::ZERO) else {
                continue;
            };
            match self.store.update_rate(spec.code, *rate).await {
                Ok(()) => updated += 1,
                Err(e) => warn!(code = spec.code, error = %e, "storing refreshed rate failed"),
            }
        }

        *self.cache.write().await = Some((Instant::now(), prices));
        info!(updated, "exchange rates refreshed");
        updated > 0
    }

    /// Fixed-point rendering with the currency's decimals (8 when unknown).
    pub fn format_amount(&self, amount: Decimal, code: &str) -> String {
        let dp = currency::spec_for(code).map(|s| s.decimals).unwrap_or(8);
        format!("{:.*}", dp as usize, amount.round_dp(dp))
    }

    pub fn display_name(&self, code: &str) -> String {
        match currency::spec_for(code) {
            Some(spec) => spec.display_name.unwrap_or(spec.name).to_string(),
            None => code.to_string(),
        }
    }
}
