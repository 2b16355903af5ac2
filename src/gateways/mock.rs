use crate::error::GatewayError;
use crate::gateways::{ConnectionReport, Invoice, InvoiceRequest, PaymentGateway};
use serde_json::json;
use std::sync::Mutex;

/// In-process gateway for tests and local runs.
///
/// `behavior`: `ALWAYS_FAILURE` answers with a provider error, `ALWAYS_TIMEOUT`
/// with a network error, anything else succeeds.
pub struct MockGateway {
    pub gateway_name: &'static str,
    pub behavior: String,
    pub requests: Mutex<Vec<InvoiceRequest>>,
}

impl MockGateway {
    pub fn new(gateway_name: &'static str, behavior: &str) -> Self {
        Self {
            gateway_name,
            behavior: behavior.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn recorded(&self) -> Vec<InvoiceRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn failure(&self) -> Option<GatewayError> {
        match self.behavior.as_str() {
            "ALWAYS_FAILURE" => Some(GatewayError::Gateway("mock decline".to_string())),
            "ALWAYS_TIMEOUT" => Some(GatewayError::Network("mock timeout".to_string())),
            _ => None,
        }
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockGateway {
    fn name(&self) -> &'static str {
        self.gateway_name
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, GatewayError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request.clone());
        }
        if let Some(e) = self.failure() {
            return Err(e);
        }
        let external_id = format!("mock_txn_{}", uuid::Uuid::new_v4().simple());
        Ok(Invoice {
            redirect_url: format!("https://mock.invalid/invoice/{external_id}"),
            amount: format!("{:.8}", request.amount.round_dp(8)),
            currency: request.currency.clone(),
            raw: json!({ "txn_id": external_id, "order_number": request.order_id }),
            external_id,
        })
    }

    async fn query_status(&self, external_id: &str) -> Result<serde_json::Value, GatewayError> {
        match self.failure() {
            Some(e) => Err(e),
            None => Ok(json!({ "txn_id": external_id, "status": "pending" })),
        }
    }

    async fn test_connection(&self) -> ConnectionReport {
        match self.failure() {
            Some(e) => ConnectionReport::failed(e.to_string()),
            None => ConnectionReport::ok(),
        }
    }
}
