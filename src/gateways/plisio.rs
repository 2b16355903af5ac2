use crate::domain::currency::SUPPORTED_CURRENCIES;
use crate::domain::webhook::WebhookPayload;
use crate::error::GatewayError;
use crate::gateways::http::{self, into_attempt, redact_url, with_retries, RetryPolicy};
use crate::gateways::{ConnectionReport, Invoice, InvoiceRequest, PaymentGateway};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::Value;
use sha1::Sha1;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::str::FromStr;
use tracing::{info, instrument};

const PLUGIN: &str = "star-router-rent";
const PLUGIN_VERSION: &str = "2.0";
const MAX_ORDER_ID_LEN: usize = 255;

type HmacSha1 = Hmac<Sha1>;

pub struct PlisioGateway {
    pub base_url: String,
    pub api_key: String,
    pub client: reqwest::Client,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub currency: String,
    pub amount: Decimal,
    pub address: String,
}

pub fn http_error_message(status: u16) -> String {
    match status {
        400 => "Bad request - check your parameters".to_string(),
        401 => "Invalid API key or authentication failed".to_string(),
        403 => "Access forbidden - check API key permissions".to_string(),
        404 => "API endpoint not found".to_string(),
        429 => "Rate limit exceeded - please try again later".to_string(),
        451 => "Service unavailable in your region".to_string(),
        500 => "Plisio server error - please try again later".to_string(),
        502 => "Bad gateway - Plisio service temporarily unavailable".to_string(),
        503 => "Service unavailable - Plisio maintenance in progress".to_string(),
        504 => "Gateway timeout - request took too long".to_string(),
        other => format!("HTTP error {other}"),
    }
}

impl PlisioGateway {
    #[instrument(skip(self, params), fields(gateway = "plisio"))]
    async fn call(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> Result<Value, GatewayError> {
        let mut query = params;
        query.push(("api_key", self.api_key.clone()));
        let qs = serde_urlencoded::to_string(&query)
            .map_err(|e| GatewayError::Validation(format!("cannot encode request: {e}")))?;
        let url = format!("{}/{}?{}", self.base_url.trim_end_matches('/'), endpoint, qs);
        let desc = redact_url(&url);

        let body = with_retries(&desc, &self.retry, http_error_message, || {
            let req = self
                .client
                .get(&url)
                .header("Accept", "application/json")
                .header("Cache-Control", "no-cache");
            async move { into_attempt(req.send().await).await }
        })
        .await?;

        parse_envelope(&body)
    }

    pub async fn invoice_status(&self, invoice_id: &str) -> Result<Value, GatewayError> {
        if invoice_id.trim().is_empty() {
            return Err(GatewayError::Validation("Invoice ID is required".to_string()));
        }
        self.call(&format!("invoices/{invoice_id}"), Vec::new()).await
    }

    /// Raw `currencies/USD` listing with hidden entries removed.
    pub async fn currencies(&self) -> Result<Vec<Value>, GatewayError> {
        let data = self.call("currencies/USD", Vec::new()).await?;
        Ok(currency_entries(&data)
            .into_iter()
            .filter(|c| !c.get("hidden").map(truthy).unwrap_or(false))
            .cloned()
            .collect())
    }

    /// Listing restricted to the currencies this platform accepts.
    pub async fn supported_currencies(&self) -> Result<Vec<Value>, GatewayError> {
        let all = self.currencies().await?;
        Ok(all
            .into_iter()
            .filter(|c| {
                c.get("cid")
                    .and_then(Value::as_str)
                    .map(|cid| SUPPORTED_CURRENCIES.iter().any(|s| s.code == cid))
                    .unwrap_or(false)
            })
            .collect())
    }

    pub async fn usd_prices(&self) -> Result<HashMap<String, Decimal>, GatewayError> {
        let data = self.call("currencies/USD", Vec::new()).await?;
        let prices = price_map(&data);
        if prices.is_empty() {
            return Err(GatewayError::Gateway("Plisio returned no usable rates".to_string()));
        }
        Ok(prices)
    }

    pub async fn withdraw(&self, payout: &PayoutRequest) -> Result<Value, GatewayError> {
        let params = payout_params(payout)?;
        let result = self.call("operations/withdraw", params).await?;
        info!(currency = %payout.currency, amount = %payout.amount, "plisio payout created");
        Ok(result)
    }

    pub async fn withdrawal_status(&self, operation_id: &str) -> Result<Value, GatewayError> {
        if operation_id.trim().is_empty() {
            return Err(GatewayError::Validation("Operation ID is required".to_string()));
        }
        self.call(&format!("operations/{operation_id}"), Vec::new()).await
    }

    pub async fn balances(&self, currency: Option<&str>) -> Result<Value, GatewayError> {
        match currency {
            Some(code) if !code.is_empty() => self.call(&format!("balances/{code}"), Vec::new()).await,
            _ => self.call("balances", Vec::new()).await,
        }
    }

    pub async fn shop_info(&self) -> Result<Value, GatewayError> {
        self.call("shops", Vec::new()).await
    }

    pub fn verify_callback(&self, fields: &WebhookPayload, provided_hash: &str) -> bool {
        verify_callback_hash(&self.api_key, fields, provided_hash)
    }
}

#[async_trait::async_trait]
impl PaymentGateway for PlisioGateway {
    fn name(&self) -> &'static str {
        "plisio"
    }

    async fn create_invoice(&self, request: &InvoiceRequest) -> Result<Invoice, GatewayError> {
        let params = invoice_params(request)?;
        let data = self.call("invoices/new", params).await?;
        invoice_from_response(request, data)
    }

    async fn query_status(&self, external_id: &str) -> Result<Value, GatewayError> {
        self.invoice_status(external_id).await
    }

    async fn test_connection(&self) -> ConnectionReport {
        match self.shop_info().await {
            Ok(Value::Null) => ConnectionReport::failed("Invalid response from API"),
            Ok(_) => ConnectionReport::ok(),
            Err(e) => ConnectionReport::failed(e.to_string()),
        }
    }
}

pub fn invoice_params(request: &InvoiceRequest) -> Result<Vec<(&'static str, String)>, GatewayError> {
    if request.order_id.trim().is_empty() {
        return Err(GatewayError::Validation("Missing required parameter: order_id".to_string()));
    }
    if request.order_id.len() > MAX_ORDER_ID_LEN {
        return Err(GatewayError::Validation(
            "Order ID is too long (max 255 characters)".to_string(),
        ));
    }
    if request.amount <= Decimal::ZERO {
        return Err(GatewayError::Validation("Amount must be a positive number".to_string()));
    }

    let description = if request.description.is_empty() {
        "Payment for services".to_string()
    } else {
        request.description.clone()
    };
    let currency = if request.currency.is_empty() {
        "USDT".to_string()
    } else {
        request.currency.clone()
    };

    let mut params = vec![
        ("order_name", description.clone()),
        ("order_number", request.order_id.clone()),
        ("description", description),
        ("source_amount", format!("{:.8}", request.amount.round_dp(8))),
        ("source_currency", "USD".to_string()),
        ("currency", currency),
        ("email", request.email.clone().unwrap_or_default()),
        ("plugin", PLUGIN.to_string()),
        ("version", PLUGIN_VERSION.to_string()),
    ];
    for (key, value) in [
        ("callback_url", &request.callback_url),
        ("success_url", &request.success_url),
        ("cancel_url", &request.cancel_url),
    ] {
        if let Some(v) = value.as_ref().filter(|v| !v.is_empty()) {
            params.push((key, v.clone()));
        }
    }
    Ok(params)
}

fn invoice_from_response(request: &InvoiceRequest, data: Value) -> Result<Invoice, GatewayError> {
    let txn_id = data.get("txn_id").and_then(value_text);
    let invoice_url = data.get("invoice_url").and_then(value_text);
    let (Some(external_id), Some(redirect_url)) = (txn_id, invoice_url) else {
        return Err(GatewayError::Gateway(
            "Invalid response from Plisio API: missing required fields".to_string(),
        ));
    };
    Ok(Invoice {
        external_id,
        redirect_url,
        amount: data
            .get("amount")
            .and_then(value_text)
            .unwrap_or_else(|| format!("{:.8}", request.amount.round_dp(8))),
        currency: data
            .get("psys_cid")
            .and_then(value_text)
            .unwrap_or_else(|| request.currency.clone()),
        raw: data,
    })
}

pub fn payout_params(payout: &PayoutRequest) -> Result<Vec<(&'static str, String)>, GatewayError> {
    for (name, value) in [("currency", &payout.currency), ("address", &payout.address)] {
        if value.trim().is_empty() {
            return Err(GatewayError::Validation(format!("Missing required parameter: {name}")));
        }
    }
    if payout.amount <= Decimal::ZERO {
        return Err(GatewayError::Validation("Amount must be a positive number".to_string()));
    }
    Ok(vec![
        ("currency", payout.currency.clone()),
        ("amount", format!("{:.8}", payout.amount.round_dp(8))),
        ("to", payout.address.clone()),
        ("type", "cash_out".to_string()),
    ])
}

/// Unwraps `{"status":"success","data":...}`; anything else becomes a gateway error.
pub fn parse_envelope(body: &str) -> Result<Value, GatewayError> {
    let mut v: Value = serde_json::from_str(body)
        .map_err(|_| GatewayError::Gateway("Invalid JSON response from Plisio API".to_string()))?;

    if v.get("status").and_then(Value::as_str) == Some("success") {
        return Ok(match v.get_mut("data") {
            Some(data) => data.take(),
            None => v,
        });
    }

    let message = v
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| v.pointer("/data/message").and_then(Value::as_str))
        .unwrap_or("Unknown error");
    Err(GatewayError::Gateway(format!("Plisio API error: {message}")))
}

fn currency_entries(data: &Value) -> Vec<&Value> {
    match data {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}

/// USD price per unit keyed by `cid`: `price_usd` when positive, else `1 / rate_usd`.
pub fn price_map(data: &Value) -> HashMap<String, Decimal> {
    let mut out = HashMap::new();
    for entry in currency_entries(data) {
        let Some(cid) = entry.get("cid").and_then(Value::as_str) else {
            continue;
        };
        let price = entry
            .get("price_usd")
            .and_then(decimal_from_value)
            .filter(|p| *p > Decimal::ZERO)
            .or_else(|| {
                entry
                    .get("rate_usd")
                    .and_then(decimal_from_value)
                    .filter(|r| *r > Decimal::ZERO)
                    .and_then(|r| Decimal::ONE.checked_div(r))
            });
        if let Some(p) = price {
            out.insert(cid.to_string(), p);
        }
    }
    out
}

pub fn decimal_from_value(v: &Value) -> Option<Decimal> {
    let text = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        _ => false,
    }
}

/// HMAC-SHA1 over the canonical form of every field except `verify_hash`.
pub fn verify_callback_hash(api_key: &str, fields: &WebhookPayload, provided_hash: &str) -> bool {
    if provided_hash.is_empty() || api_key.is_empty() {
        return false;
    }
    let Ok(mut mac) = HmacSha1::new_from_slice(api_key.as_bytes()) else {
        return false;
    };
    mac.update(canonical_form(fields).as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());
    http::constant_time_eq(expected.as_bytes(), provided_hash.to_ascii_lowercase().as_bytes())
}

/// Length-prefixed serialization of the key-sorted callback fields, the byte
/// string Plisio signs. `expire_utc` is always a string and `tx_urls` is
/// entity-decoded before serialization.
pub fn canonical_form(fields: &WebhookPayload) -> String {
    let mut entries: Vec<(&str, Value)> = fields
        .iter()
        .filter(|(k, _)| k.as_str() != "verify_hash")
        .map(|(k, v)| (k.as_str(), normalize_field(k, v)))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    let _ = write!(out, "a:{}:{{", entries.len());
    for (key, value) in &entries {
        write_key(&mut out, key);
        write_value(&mut out, value);
    }
    out.push('}');
    out
}

fn normalize_field(key: &str, value: &Value) -> Value {
    match (key, value) {
        (_, Value::Null) => Value::Null,
        ("expire_utc", Value::String(_)) => value.clone(),
        ("expire_utc", Value::Number(n)) => Value::String(n.to_string()),
        ("expire_utc", Value::Bool(b)) => Value::String(if *b { "1".into() } else { String::new() }),
        ("tx_urls", Value::String(s)) => Value::String(decode_html_entities(s)),
        _ => value.clone(),
    }
}

/// Keys that look like canonical integers are serialized as integers.
fn write_key(out: &mut String, key: &str) {
    match integer_key(key) {
        Some(n) => {
            let _ = write!(out, "i:{n};");
        }
        None => write_str(out, key),
    }
}

fn integer_key(key: &str) -> Option<i64> {
    let digits = key.strip_prefix('-').unwrap_or(key);
    let canonical = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'))
        && key != "-0";
    if canonical {
        key.parse().ok()
    } else {
        None
    }
}

fn write_str(out: &mut String, s: &str) {
    let _ = write!(out, "s:{}:\"{}\";", s.len(), s);
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("N;"),
        Value::Bool(b) => {
            let _ = write!(out, "b:{};", u8::from(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                let _ = write!(out, "i:{i};");
            } else if let Some(u) = n.as_u64() {
                let _ = write!(out, "i:{u};");
            } else {
                let _ = write!(out, "d:{};", n.as_f64().unwrap_or_default());
            }
        }
        Value::String(s) => write_str(out, s),
        Value::Array(items) => {
            let _ = write!(out, "a:{}:{{", items.len());
            for (i, item) in items.iter().enumerate() {
                let _ = write!(out, "i:{i};");
                write_value(out, item);
            }
            out.push('}');
        }
        Value::Object(map) => {
            let _ = write!(out, "a:{}:{{", map.len());
            for (k, v) in map {
                write_key(out, k);
                write_value(out, v);
            }
            out.push('}');
        }
    }
}

/// Decodes the entities Plisio escapes in `tx_urls`: the five XML entities and numeric references.
pub fn decode_html_entities(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match tail.find(';').filter(|end| *end <= 10) {
            Some(end) => match decode_entity(&tail[1..end]) {
                Some(c) => {
                    out.push(c);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse::<u32>().ok()?,
            };
            char::from_u32(code)
        }
    }
}
