//! Read-only key/value site settings (gateway credentials, deposit limits, site URLs).

use anyhow::Result;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

pub const PLISIO_API_KEY: &str = "plisio_api_key";
pub const BINANCE_API_KEY: &str = "binance_api_key";
pub const BINANCE_SECRET_KEY: &str = "binance_secret_key";
pub const MIN_DEPOSIT: &str = "min_deposit";
pub const MAX_DEPOSIT: &str = "max_deposit";
pub const MIN_WITHDRAWAL: &str = "min_withdrawal";
pub const WITHDRAWAL_FEE: &str = "withdrawal_fee";
pub const SITE_NAME: &str = "site_name";
pub const SITE_URL: &str = "site_url";
pub const ADMIN_EMAIL: &str = "admin_email";

#[async_trait::async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// Blank values are treated as unset.
pub async fn setting_or(provider: &dyn SettingsProvider, key: &str, default: &str) -> String {
    match provider.get(key).await {
        Ok(Some(v)) if !v.trim().is_empty() => v,
        Ok(_) => default.to_string(),
        Err(e) => {
            tracing::warn!(key, error = %e, "settings lookup failed, using default");
            default.to_string()
        }
    }
}

pub async fn secret(provider: &dyn SettingsProvider, key: &str) -> Option<String> {
    let v = setting_or(provider, key, "").await;
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

pub async fn decimal_or(provider: &dyn SettingsProvider, key: &str, default: Decimal) -> Decimal {
    let raw = setting_or(provider, key, "").await;
    if raw.is_empty() {
        return default;
    }
    Decimal::from_str(raw.trim()).unwrap_or_else(|_| {
        tracing::warn!(key, value = %raw, "setting is not a decimal, using default");
        default
    })
}

/// Fixed settings map for tests and local runs without a settings table.
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    values: HashMap<String, String>,
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

#[async_trait::async_trait]
impl SettingsProvider for StaticSettings {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blank_values_fall_back() {
        let s = StaticSettings::new().with(SITE_NAME, "  ").with(MIN_DEPOSIT, "25.5");
        assert_eq!(setting_or(&s, SITE_NAME, "Star Router Rent").await, "Star Router Rent");
        assert_eq!(decimal_or(&s, MIN_DEPOSIT, Decimal::from(100)).await, Decimal::new(255, 1));
        assert_eq!(decimal_or(&s, MAX_DEPOSIT, Decimal::from(50000)).await, Decimal::from(50000));
        assert_eq!(secret(&s, PLISIO_API_KEY).await, None);
    }

    #[tokio::test]
    async fn malformed_decimal_uses_default() {
        let s = StaticSettings::new().with(WITHDRAWAL_FEE, "two percent");
        assert_eq!(decimal_or(&s, WITHDRAWAL_FEE, Decimal::new(25, 1)).await, Decimal::new(25, 1));
    }
}
