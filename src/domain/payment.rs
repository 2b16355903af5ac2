use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Deposit,
    Withdrawal,
    Investment,
    Rental,
    ReferralBonus,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Deposit => "deposit",
            PaymentType::Withdrawal => "withdrawal",
            PaymentType::Investment => "investment",
            PaymentType::Rental => "rental",
            PaymentType::ReferralBonus => "referral_bonus",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(PaymentType::Deposit),
            "withdrawal" => Some(PaymentType::Withdrawal),
            "investment" => Some(PaymentType::Investment),
            "rental" => Some(PaymentType::Rental),
            "referral_bonus" => Some(PaymentType::ReferralBonus),
            _ => None,
        }
    }
}

/// One money-movement attempt as stored in the `payments` table.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: String,
    pub user_id: i64,
    pub amount: Decimal,
    pub crypto_currency: Option<String>,
    pub payment_method: String,
    pub status: PaymentStatus,
    #[serde(rename = "type")]
    pub payment_type: PaymentType,
    pub transaction_id: Option<String>,
    pub gateway_data: Option<serde_json::Value>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub id: String,
    pub user_id: i64,
    pub amount: Decimal,
    pub crypto_currency: Option<String>,
    pub payment_method: String,
    pub payment_type: PaymentType,
    pub description: Option<String>,
}

/// Opaque 32-hex payment token; doubles as the gateway order number.
pub fn new_payment_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub user_id: i64,
    pub amount: Decimal,
    #[serde(default = "default_deposit_currency")]
    pub currency: String,
    pub email: Option<String>,
}

fn default_deposit_currency() -> String {
    "BTC".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositResponse {
    pub payment_id: String,
    pub redirect_url: String,
    pub external_id: String,
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub user_id: i64,
    pub amount: Decimal,
    pub currency: String,
    pub address: String,
    pub method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewWithdrawal {
    pub payment: NewPayment,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalResponse {
    pub payment_id: String,
    pub withdrawal_id: i64,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserBalance {
    pub user_id: i64,
    pub balance: Decimal,
    pub total_deposited: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorPayload,
}

#[derive(Debug, Serialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorPayload {
                code: code.to_string(),
                message: message.into(),
                details: None,
            },
        }
    }
}
