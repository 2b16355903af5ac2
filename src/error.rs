use crate::domain::payment::ErrorEnvelope;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Failures surfaced by a gateway client after its own retry budget is spent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Gateway(String),
    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    InsufficientBalance(String),
    #[error("processing failed: {0}")]
    Processing(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Gateway(_) => "GATEWAY_ERROR",
            LedgerError::InsufficientBalance(_) => "INSUFFICIENT_BALANCE",
            LedgerError::Processing(_) => "PROCESSING_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::Validation(_) | LedgerError::InsufficientBalance(_) => StatusCode::BAD_REQUEST,
            LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::Gateway(GatewayError::Validation(_)) => StatusCode::BAD_REQUEST,
            LedgerError::Gateway(_) => StatusCode::BAD_GATEWAY,
            LedgerError::Processing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<anyhow::Error> for LedgerError {
    fn from(e: anyhow::Error) -> Self {
        LedgerError::Processing(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Currency {0} not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorEnvelope::new(self.code(), self.to_string()))).into_response()
    }
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::NotFound(_) => "NOT_FOUND",
            RegistryError::Validation(_) => "VALIDATION_ERROR",
            RegistryError::Storage(_) => "PROCESSING_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::Validation(_) => StatusCode::BAD_REQUEST,
            RegistryError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorEnvelope::new(self.code(), self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_error_statuses() {
        assert_eq!(LedgerError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(LedgerError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            LedgerError::from(GatewayError::Network("down".into())).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            LedgerError::from(GatewayError::Network("down".into())).to_string(),
            "Network error: down"
        );
        assert_eq!(LedgerError::from(anyhow::anyhow!("db")).code(), "PROCESSING_ERROR");
        assert_eq!(RegistryError::NotFound("DOGE".into()).to_string(), "Currency DOGE not found");
    }
}
