use crate::error::GatewayError;
use crate::gateways::http::{self, into_attempt, with_retries, RetryPolicy};
use crate::gateways::{ConnectionReport, Invoice, InvoiceRequest, PaymentGateway};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sha2::Sha512;
use tracing::{info, instrument};

pub const HEADER_TIMESTAMP: &str = "BinancePay-Timestamp";
pub const HEADER_NONCE: &str = "BinancePay-Nonce";
pub const HEADER_CERTIFICATE_SN: &str = "BinancePay-Certificate-SN";
pub const HEADER_SIGNATURE: &str = "BinancePay-Signature";

const MAX_MERCHANT_TRADE_NO_LEN: usize = 32;

type HmacSha512 = Hmac<Sha512>;

pub struct BinancePayGateway {
    pub base_url: String,
    /// Certificate SN.
    pub api_key: String,
    pub secret_key: String,
    pub client: reqwest::Client,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub request_id: String,
    pub merchant_send_id: String,
    pub batch_name: Option<String>,
    pub currency: String,
    pub amount: Decimal,
    pub receive_type: Option<String>,
    pub receiver: String,
}

pub fn http_error_message(status: u16) -> String {
    match status {
        400 => "Bad request - check your parameters".to_string(),
        401 => "Unauthorized - invalid API credentials".to_string(),
        403 => "Forbidden - insufficient permissions".to_string(),
        404 => "Not found - invalid endpoint".to_string(),
        429 => "Too many requests - rate limit exceeded".to_string(),
        451 => "Service unavailable in your region".to_string(),
        500 => "Internal server error".to_string(),
        502 => "Bad gateway".to_string(),
        503 => "Service unavailable".to_string(),
        504 => "Gateway timeout".to_string(),
        other => format!("HTTP error {other}"),
    }
}

/// Uppercase hex HMAC-SHA512 over `timestamp\nnonce\nbody\n`.
pub fn sign(secret: &str, timestamp: &str, nonce: &str, body: &str) -> String {
    let payload = format!("{timestamp}\n{nonce}\n{body}\n");
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return String::new(),
    };
    mac.update(payload.as_bytes());
    hex::encode_upper(mac.finalize().into_bytes())
}

/// Checks a webhook signature. The supplied signature is compared case-insensitively.
pub fn verify_signature(secret: &str, body: &str, signature: &str, timestamp: &str, nonce: &str) -> bool {
    if secret.is_empty() || signature.is_empty() || timestamp.is_empty() || nonce.is_empty() {
        return false;
    }
    let expected = sign(secret, timestamp, nonce, body);
    http::constant_time_eq(expected.as_bytes(), signature.to_ascii_uppercase().as_bytes())
}

/// Unwraps `{"status":"SUCCESS","data":...}`.
pub fn parse_envelope(body: &str) -> Result<Value, GatewayError> {
    let mut v: Value = serde_json::from_str(body)
        .map_err(|_| GatewayError::Gateway("Invalid JSON response from Binance Pay API".to_string()))?;
    if v.get("status").and_then(Value::as_str) == Some("SUCCESS") {
        return Ok(match v.get_mut("data") {
            Some(data) => data.take(),
            None => v,
        });
    }
    let message = v
        .get("errorMessage")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error");
    Err(GatewayError::Gateway(format!("Binance Pay API error: {message}")))
}

pub fn order_body(request: &InvoiceRequest) -> Result<Value, GatewayError> {
    if request.order_id.trim().is_empty() {
        return Err(GatewayError::Validation("Missing required parameter: order_id".to_string()));
    }
    if request.order_id.len() > MAX_MERCHANT_TRADE_NO_LEN {
        return Err(GatewayError::Validation(
            "Order ID is too long (max 32 characters)".to_string(),
        ));
    }
    if request.amount <= Decimal::ZERO {
        return Err(GatewayError::Validation("Amount must be a positive number".to_string()));
    }

    let currency = if request.currency.is_empty() { "USDT" } else { request.currency.as_str() };
    let goods_name = if request.description.is_empty() { "Payment" } else { request.description.as_str() };
    let goods_detail = if request.description.is_empty() {
        "Payment for services"
    } else {
        request.description.as_str()
    };

    let mut body = json!({
        "env": { "terminalType": "WEB" },
        "merchantTradeNo": request.order_id,
        "orderAmount": format!("{:.2}", request.amount.round_dp(2)),
        "currency": currency,
        "goods": {
            "goodsType": "02",
            "goodsCategory": "Z000",
            "referenceGoodsId": request.order_id,
            "goodsName": goods_name,
            "goodsDetail": goods_detail,
        }
    });
    if let Some(url) = request.success_url.as_ref().filter(|u| !u.is_empty()) {
        body["returnUrl"] = Value::String(url.clone());
    }
    if let Some(url) = request.cancel_url.as_ref().filter(|u| !u.is_empty()) {
        body["cancelUrl"] = Value::String(url.clone());
    }
    Ok(body)
}

pub fn payout_body(payout: &PayoutRequest) -> Result<Value, GatewayError> {
    for (name, value) in [
        ("request_id", &payout.request_id),
        ("receiver", &payout.receiver),
        ("merchant_send_id", &payout.merchant_send_id),
    ] {
        if value.trim().is_empty() {
            return Err(GatewayError::Validation(format!("Missing required parameter: {name}")));
        }
    }
    if payout.amount <= Decimal::ZERO {
        return Err(GatewayError::Validation("Amount must be a positive number".to_string()));
    }
    let amount = format!("{:.2}", payout.amount.round_dp(2));
    Ok(json!({
        "requestId": payout.request_id,
        "batchName": payout.batch_name.clone().unwrap_or_else(|| "Withdrawal Batch".to_string()),
        "currency": if payout.currency.is_empty() { "USDT" } else { payout.currency.as_str() },
        "totalAmount": amount,
        "totalNumber": 1,
        "bizScene": "CRYPTO_BOX",
        "transferDetailList": [{
            "merchantSendId": payout.merchant_send_id,
            "transferAmount": amount,
            "receiveType": payout.receive_type.clone().unwrap_or_else(|| "EMAIL".to_string()),
            "receiver": payout.receiver,
        }]
    }))
}

impl BinancePayGateway {
    #[instrument(skip(self, data), fields(gateway = "binance"))]
    async fn call(&self, endpoint: &str, data: &Value) -> Result<Value, GatewayError> {
        let body = serde_json::to_string(data)
            .map_err(|e| GatewayError::Validation(format!("cannot encode request: {e}")))?;
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), endpoint);

        let response = with_retries(endpoint, &self.retry, http_error_message, || {
            let timestamp = chrono::Utc::now().timestamp_millis().to_string();
            let nonce = uuid::Uuid::new_v4().simple().to_string();
            let signature = sign(&self.secret_key, &timestamp, &nonce, &body);
            let req = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .header(HEADER_TIMESTAMP, timestamp)
                .header(HEADER_NONCE, nonce)
                .header(HEADER_CERTIFICATE_SN, &self.api_key)
                .header(HEADER_SIGNATURE, signature)
                .body(body.clone());
            async move { into_attempt(req.send().await).await }
        })
        .await?;

        parse_envelope(&response)
    }

    pub async fn query_order(&self, merchant_trade_no: &str) -> Result<Value, GatewayError> {
        if merchant_trade_no.trim().is_empty() {
            return Err(GatewayError::Validation("Merchant trade number is required".to_string()));
        }
        self.call(
            "/binancepay/openapi/v2/order/query",
            &json!({ "merchantTradeNo": merchant_trade_no }),
        )
        .await
    }

    pub async fn create_payout(&self, payout: &PayoutRequest) -> Result<Value, GatewayError> {
        let body = payout_body(payout)?;
        let result = self.call("/binancepay/openapi/payout/transfer", &body).await?;
        info!(request_id = %payout.request_id, amount = %payout.amount, "binance payout created");
        Ok(result)
    }

    pub async fn query_payout(&self, request_id: &str) -> Result<Value, GatewayError> {
        if request_id.trim().is_empty() {
            return Err(GatewayError::Validation("Request ID is required".to_string()));
        }
        self.call("/binancepay/openapi/payout/query", &json!({ "requestId": request_id }))
            .await
    }

    pub async fn currencies(&self) -> Result<Value, GatewayError> {
        self.call(
            "/binancepay/openapi/v2/currencies",
            &json!({ "env": { "terminalType": "WEB" } }),
        )
        .await
    }

    pub fn verify_webhook(&self, body: &str, signature: &str, timestamp: &str, nonce: &str) -> bool {
        verify_signature(&self.secret_key, body, signature, timestamp, nonce)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for BinancePayGateway {
    fn name(&self) -> &'static str {
        "binance"
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, GatewayError> {
        let body = order_body(request)?;
        let data = self.call("/binancepay/openapi/v2/order", &body).await?;
        let prepay_id = data.get("prepayId").and_then(Value::as_str).map(str::to_string);
        let checkout_url = data.get("checkoutUrl").and_then(Value::as_str).map(str::to_string);
        let (Some(external_id), Some(redirect_url)) = (prepay_id, checkout_url) else {
            return Err(GatewayError::Gateway(
                "Invalid response from Binance Pay API: missing required fields".to_string(),
            ));
        };
        Ok(Invoice {
            external_id,
            redirect_url,
            amount: format!("{:.2}", request.amount.round_dp(2)),
            currency: body["currency"].as_str().unwrap_or("USDT").to_string(),
            raw: data,
        })
    }

    async fn query_status(&self, external_id: &str) -> Result<Value, GatewayError> {
        self.query_order(external_id).await
    }

    async fn test_connection(&self) -> ConnectionReport {
        match self.currencies().await {
            Ok(Value::Null) => ConnectionReport::failed("Invalid response from API"),
            Ok(_) => ConnectionReport::ok(),
            Err(e) => ConnectionReport::failed(connection_failure_message(&e)),
        }
    }
}

fn connection_failure_message(err: &GatewayError) -> String {
    let message = err.to_string();
    if message == http_error_message(451) {
        "Binance Pay is not available in your region".to_string()
    } else if message == http_error_message(401) || message.to_ascii_lowercase().contains("authentication") {
        "Invalid API credentials - check your certificate SN and private key".to_string()
    } else {
        message
    }
}
