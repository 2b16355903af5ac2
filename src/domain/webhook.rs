use crate::domain::payment::PaymentStatus;
use serde::Serialize;

/// Decoded webhook body. Keys are kept sorted, which the Plisio hash relies on.
pub type WebhookPayload = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    Plisio,
    Binance,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayKind::Plisio => "plisio",
            GatewayKind::Binance => "binance",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "plisio" => Some(GatewayKind::Plisio),
            "binance" => Some(GatewayKind::Binance),
            _ => None,
        }
    }

    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            GatewayKind::Plisio => &["txn_id", "status", "order_number"],
            GatewayKind::Binance => &["merchantTradeNo", "status"],
        }
    }

    pub fn order_ref_field(&self) -> &'static str {
        match self {
            GatewayKind::Plisio => "order_number",
            GatewayKind::Binance => "merchantTradeNo",
        }
    }

    /// Fields tried in order for the provider's own transaction id.
    pub fn txn_id_fields(&self) -> &'static [&'static str] {
        match self {
            GatewayKind::Plisio => &["txn_id"],
            GatewayKind::Binance => &["transactionId", "prepayId"],
        }
    }

    /// Unrecognised provider statuses stay `pending`.
    pub fn map_status(&self, provider_status: &str) -> PaymentStatus {
        match self {
            GatewayKind::Plisio => match provider_status {
                "new" | "pending" => PaymentStatus::Pending,
                "completed" => PaymentStatus::Completed,
                "expired" | "error" | "cancelled" => PaymentStatus::Failed,
                _ => PaymentStatus::Pending,
            },
            GatewayKind::Binance => match provider_status.to_ascii_uppercase().as_str() {
                "INITIAL" | "PENDING" => PaymentStatus::Pending,
                "PAID" | "PAY_SUCCESS" | "SUCCESS" => PaymentStatus::Completed,
                "CANCELED" | "CANCELLED" | "EXPIRED" | "ERROR" | "PAY_CLOSED" => PaymentStatus::Failed,
                _ => PaymentStatus::Pending,
            },
        }
    }

    pub fn known_statuses(&self) -> &'static [&'static str] {
        match self {
            GatewayKind::Plisio => &["new", "pending", "completed", "expired", "error", "cancelled"],
            GatewayKind::Binance => &[
                "INITIAL",
                "PENDING",
                "PAID",
                "PAY_SUCCESS",
                "SUCCESS",
                "CANCELED",
                "CANCELLED",
                "EXPIRED",
                "ERROR",
                "PAY_CLOSED",
            ],
        }
    }

    pub fn is_known_status(&self, provider_status: &str) -> bool {
        match self {
            GatewayKind::Plisio => self.known_statuses().contains(&provider_status),
            GatewayKind::Binance => self
                .known_statuses()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(provider_status)),
        }
    }
}

/// Reads a payload field as text; numbers are rendered, empty strings count as absent.
pub fn field_str(payload: &WebhookPayload, key: &str) -> Option<String> {
    match payload.get(key)? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub payment_id: String,
    pub status: PaymentStatus,
    pub changed: bool,
    pub message: Option<String>,
}
