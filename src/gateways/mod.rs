use crate::config::GatewayHttpConfig;
use crate::error::GatewayError;
use crate::settings::{self, SettingsProvider};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

pub mod binance;
pub mod http;
pub mod mock;
pub mod plisio;

use binance::BinancePayGateway;
use plisio::PlisioGateway;

/// Everything a gateway needs to open a hosted checkout for one payment.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub order_id: String,
    /// USD amount.
    pub amount: Decimal,
    pub currency: String,
    pub description: String,
    pub email: Option<String>,
    pub callback_url: Option<String>,
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Invoice {
    pub external_id: String,
    pub redirect_url: String,
    pub amount: String,
    pub currency: String,
    /// Provider response, stored as `gateway_data`.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub message: String,
}

impl ConnectionReport {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "Connection successful".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, GatewayError>;

    async fn query_status(&self, external_id: &str) -> Result<serde_json::Value, GatewayError>;

    /// Never fails; problems are reported in the returned message.
    async fn test_connection(&self) -> ConnectionReport;
}

/// Live USD prices keyed by currency code.
#[async_trait::async_trait]
pub trait RateSource: Send + Sync {
    async fn usd_prices(&self) -> Result<HashMap<String, Decimal>, GatewayError>;
}

pub const PLISIO_BASE_URL: &str = "https://api.plisio.net/api/v1";
pub const BINANCE_BASE_URL: &str = "https://bpay.binanceapi.com";

/// Builds gateway clients from the current settings. Credentials are read on
/// every call so a key rotated in the settings table takes effect immediately.
#[derive(Clone)]
pub struct GatewayFactory {
    pub client: reqwest::Client,
    pub http: GatewayHttpConfig,
    pub settings: Arc<dyn SettingsProvider>,
    pub plisio_base_url: String,
    pub binance_base_url: String,
}

impl GatewayFactory {
    pub fn new(http: GatewayHttpConfig, settings: Arc<dyn SettingsProvider>) -> Result<Self, GatewayError> {
        Ok(Self {
            client: http::build_client(&http)?,
            http,
            settings,
            plisio_base_url: PLISIO_BASE_URL.to_string(),
            binance_base_url: BINANCE_BASE_URL.to_string(),
        })
    }

    /// `None` when no Plisio API key is configured.
    pub async fn plisio(&self) -> Option<PlisioGateway> {
        let api_key = settings::secret(self.settings.as_ref(), settings::PLISIO_API_KEY).await?;
        Some(PlisioGateway {
            base_url: self.plisio_base_url.clone(),
            api_key,
            client: self.client.clone(),
            retry: http::RetryPolicy::from_config(&self.http),
        })
    }

    /// `None` unless both the certificate SN and the secret are configured.
    pub async fn binance(&self) -> Option<BinancePayGateway> {
        let api_key = settings::secret(self.settings.as_ref(), settings::BINANCE_API_KEY).await?;
        let secret_key = settings::secret(self.settings.as_ref(), settings::BINANCE_SECRET_KEY).await?;
        Some(BinancePayGateway {
            base_url: self.binance_base_url.clone(),
            api_key,
            secret_key,
            client: self.client.clone(),
            retry: http::RetryPolicy::from_config(&self.http),
        })
    }

    pub async fn by_name(&self, name: &str) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        let gateway: Option<Arc<dyn PaymentGateway>> = match name {
            "plisio" => self.plisio().await.map(|g| Arc::new(g) as Arc<dyn PaymentGateway>),
            "binance" => self.binance().await.map(|g| Arc::new(g) as Arc<dyn PaymentGateway>),
            other => return Err(GatewayError::Validation(format!("Unknown gateway: {other}"))),
        };
        gateway.ok_or_else(|| GatewayError::Validation(format!("{name} is not configured")))
    }
}

#[async_trait::async_trait]
impl RateSource for GatewayFactory {
    async fn usd_prices(&self) -> Result<HashMap<String, Decimal>, GatewayError> {
        let plisio = self
            .plisio()
            .await
            .ok_or_else(|| GatewayError::Validation("Plisio API key is not configured".to_string()))?;
        plisio.usd_prices().await
    }
}
