use crate::domain::payment::{
    new_payment_id, DepositRequest, DepositResponse, NewPayment, NewWithdrawal, Payment, PaymentStatus, PaymentType,
    WithdrawalRequest, WithdrawalResponse,
};
use crate::domain::webhook::{field_str, GatewayKind, WebhookOutcome, WebhookPayload};
use crate::error::LedgerError;
use crate::gateways::{InvoiceRequest, PaymentGateway};
use crate::repo::payments_repo::{PaymentStore, StatusTransition, TransitionResult, WithdrawalInsert};
use crate::service::currency_registry::CurrencyRegistry;
use crate::service::notifier::{Notification, Notifier};
use crate::settings::{self, SettingsProvider};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const NO_CHANGE: &str = "No status change required";

/// Owns every payment status change and the balance credit that goes with it.
#[derive(Clone)]
pub struct PaymentLedger {
    pub store: Arc<dyn PaymentStore>,
    pub registry: CurrencyRegistry,
    pub settings: Arc<dyn SettingsProvider>,
    pub notifier: Arc<dyn Notifier>,
}

fn insufficient_balance(available: Decimal) -> LedgerError {
    LedgerError::InsufficientBalance(format!(
        "Insufficient balance. Available: ${:.2}",
        available.round_dp(2)
    ))
}

fn unchanged(payment: &Payment) -> WebhookOutcome {
    WebhookOutcome {
        payment_id: payment.id.clone(),
        status: payment.status,
        changed: false,
        message: Some(NO_CHANGE.to_string()),
    }
}

impl PaymentLedger {
    /// Reconciles one gateway notification against the local payment.
    ///
    /// Redelivery of the same status is a no-op, and a completed deposit is
    /// credited exactly once, inside the same transaction as the status flip.
    #[instrument(skip(self, gateway, payload), fields(gateway = gateway.as_str()))]
    pub async fn process_webhook(
        &self,
        gateway: GatewayKind,
        payload: &WebhookPayload,
    ) -> Result<WebhookOutcome, LedgerError> {
        for field in gateway.required_fields() {
            if field_str(payload, field).is_none() {
                return Err(LedgerError::Validation(format!("Missing required field: {field}")));
            }
        }

        let order_ref = field_str(payload, gateway.order_ref_field()).unwrap_or_default();
        let provider_status = field_str(payload, "status").unwrap_or_default();
        let txn_id = gateway
            .txn_id_fields()
            .iter()
            .find_map(|f| field_str(payload, f));

        let payment = self
            .store
            .find_by_reference(&order_ref, txn_id.as_deref())
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Payment not found for order: {order_ref}")))?;

        if !gateway.is_known_status(&provider_status) {
            warn!(payment_id = %payment.id, status = %provider_status, "unrecognised provider status, treating as pending");
        }
        let new_status = gateway.map_status(&provider_status);

        if new_status == payment.status {
            info!(payment_id = %payment.id, status = new_status.as_str(), "webhook redelivery, nothing to do");
            return Ok(unchanged(&payment));
        }

        let transition = StatusTransition {
            payment_id: payment.id.clone(),
            new_status,
            transaction_id: txn_id,
            gateway_data: serde_json::Value::Object(payload.clone()),
        };

        let result = self.store.apply_transition(&transition).await.map_err(|e| {
            warn!(payment_id = %payment.id, error = %e, "status transition rolled back");
            LedgerError::Processing(e.to_string())
        })?;

        match result {
            TransitionResult::NotFound => Err(LedgerError::NotFound(format!(
                "Payment not found for order: {order_ref}"
            ))),
            TransitionResult::Unchanged(current) => Ok(unchanged(&current)),
            TransitionResult::Refused(current) => {
                warn!(
                    payment_id = %current.id,
                    current = current.status.as_str(),
                    requested = new_status.as_str(),
                    "ignoring transition out of a terminal status"
                );
                Ok(WebhookOutcome {
                    payment_id: current.id.clone(),
                    status: current.status,
                    changed: false,
                    message: Some(format!("Payment already {}", current.status.as_str())),
                })
            }
            TransitionResult::Applied { payment, credited } => {
                info!(
                    payment_id = %payment.id,
                    status = payment.status.as_str(),
                    credited = credited.map(|c| c.to_string()).unwrap_or_default(),
                    "payment status updated"
                );
                if let Some(amount) = credited {
                    self.spawn_deposit_notification(payment.user_id, amount);
                }
                Ok(WebhookOutcome {
                    payment_id: payment.id,
                    status: payment.status,
                    changed: true,
                    message: None,
                })
            }
        }
    }

    fn spawn_deposit_notification(&self, user_id: i64, amount: Decimal) {
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let n = Notification::deposit_completed(user_id, amount);
            if let Err(e) = notifier.notify(&n).await {
                warn!(user_id, error = %e, "deposit notification failed");
            }
        });
    }

    /// Opens a pending deposit and a hosted invoice for it.
    #[instrument(skip(self, req, gateway), fields(user_id = req.user_id, gateway = gateway.name()))]
    pub async fn create_deposit(
        &self,
        req: DepositRequest,
        gateway: &dyn PaymentGateway,
    ) -> Result<DepositResponse, LedgerError> {
        let settings = self.settings.as_ref();
        let min = settings::decimal_or(settings, settings::MIN_DEPOSIT, Decimal::from(100)).await;
        let max = settings::decimal_or(settings, settings::MAX_DEPOSIT, Decimal::from(50000)).await;
        if req.amount < min {
            return Err(LedgerError::Validation(format!(
                "Minimum deposit amount is ${:.2}",
                min.round_dp(2)
            )));
        }
        if req.amount > max {
            return Err(LedgerError::Validation(format!(
                "Maximum deposit amount is ${:.2}",
                max.round_dp(2)
            )));
        }

        let code = req.currency.trim().to_ascii_uppercase();
        let active = self
            .registry
            .get(&code)
            .await
            .map_err(|e| LedgerError::Processing(e.to_string()))?;
        if active.is_none() {
            return Err(LedgerError::Validation(format!("Unsupported currency: {code}")));
        }

        let site_name = settings::setting_or(settings, settings::SITE_NAME, "Star Router Rent").await;
        let site_url = settings::setting_or(settings, settings::SITE_URL, "http://localhost:3000").await;
        let site_url = site_url.trim_end_matches('/');

        let new = NewPayment {
            id: new_payment_id(),
            user_id: req.user_id,
            amount: req.amount,
            crypto_currency: Some(code.clone()),
            payment_method: gateway.name().to_string(),
            payment_type: PaymentType::Deposit,
            description: Some(format!("Deposit via {}", gateway.name())),
        };
        let payment = self.store.insert_pending(&new).await?;

        let invoice_req = InvoiceRequest {
            order_id: payment.id.clone(),
            amount: payment.amount,
            currency: code,
            description: format!("{site_name} Deposit"),
            email: req.email.clone(),
            callback_url: Some(format!("{site_url}/api/webhook/{}", gateway.name())),
            success_url: Some(format!("{site_url}/user/deposit-success?id={}", payment.id)),
            cancel_url: Some(format!("{site_url}/user/deposit-failed?id={}", payment.id)),
        };

        let invoice = match gateway.create_invoice(&invoice_req).await {
            Ok(inv) => inv,
            Err(e) => {
                warn!(payment_id = %payment.id, error = %e, "invoice creation failed, discarding pending deposit");
                if let Err(db) = self.store.discard_pending(&payment.id).await {
                    warn!(payment_id = %payment.id, error = %db, "could not discard pending deposit");
                }
                return Err(LedgerError::Gateway(e));
            }
        };

        self.store
            .attach_invoice(&payment.id, &invoice.external_id, &invoice.raw)
            .await?;
        info!(payment_id = %payment.id, external_id = %invoice.external_id, "deposit invoice created");

        Ok(DepositResponse {
            payment_id: payment.id,
            redirect_url: invoice.redirect_url,
            external_id: invoice.external_id,
            amount: invoice.amount,
            currency: invoice.currency,
        })
    }

    /// Debits the balance and queues a withdrawal for manual payout.
    #[instrument(skip(self, req), fields(user_id = req.user_id))]
    pub async fn request_withdrawal(&self, req: WithdrawalRequest) -> Result<WithdrawalResponse, LedgerError> {
        let address = req.address.trim().to_string();
        if address.is_empty() {
            return Err(LedgerError::Validation("Withdrawal address is required.".to_string()));
        }

        let code = req.currency.trim().to_ascii_uppercase();
        let active = self
            .registry
            .get(&code)
            .await
            .map_err(|e| LedgerError::Processing(e.to_string()))?;
        if active.is_none() {
            return Err(LedgerError::Validation(format!("Unsupported currency: {code}")));
        }
        if !self.registry.validate_address(&address, &code) {
            return Err(LedgerError::Validation(format!("Invalid {code} address")));
        }

        let settings = self.settings.as_ref();
        let min = settings::decimal_or(settings, settings::MIN_WITHDRAWAL, Decimal::from(20)).await;
        if req.amount <= Decimal::ZERO || req.amount < min {
            return Err(LedgerError::Validation(format!(
                "Minimum withdrawal amount is ${:.2}",
                min.round_dp(2)
            )));
        }

        // Cheap refusal before any fee arithmetic; the store re-checks under its lock.
        match self.store.balance(req.user_id).await? {
            None => return Err(LedgerError::NotFound(format!("User {} not found", req.user_id))),
            Some(b) if req.amount > b.balance => {
                return Err(insufficient_balance(b.balance));
            }
            Some(_) => {}
        }

        let default_fee = Decimal::new(25, 1);
        let mut fee_pct = settings::decimal_or(settings, settings::WITHDRAWAL_FEE, default_fee).await;
        if fee_pct < Decimal::ZERO || fee_pct > Decimal::ONE_HUNDRED {
            warn!(fee_pct = %fee_pct, "withdrawal_fee setting out of range, using default");
            fee_pct = default_fee;
        }
        let fee_amount = req
            .amount
            .checked_mul(fee_pct)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(|| LedgerError::Validation("Amount is too large".to_string()))?
            .round_dp(8);
        let net_amount = req.amount - fee_amount;

        let method = match req.method.as_deref() {
            Some(m @ ("binance" | "plisio")) => m.to_string(),
            _ => "crypto".to_string(),
        };
        let preview: String = address.chars().take(10).collect();

        let withdrawal = NewWithdrawal {
            payment: NewPayment {
                id: new_payment_id(),
                user_id: req.user_id,
                amount: req.amount,
                crypto_currency: Some(code),
                payment_method: method,
                payment_type: PaymentType::Withdrawal,
                description: Some(format!("Withdrawal request to {preview}...")),
            },
            fee_amount,
            net_amount,
            address,
        };

        match self.store.create_withdrawal(&withdrawal).await? {
            WithdrawalInsert::Created { withdrawal_id, payment } => {
                info!(payment_id = %payment.id, withdrawal_id, "withdrawal requested");
                Ok(WithdrawalResponse {
                    payment_id: payment.id,
                    withdrawal_id,
                    amount: payment.amount,
                    fee_amount,
                    net_amount,
                    status: PaymentStatus::Pending,
                })
            }
            WithdrawalInsert::InsufficientBalance { available } => Err(insufficient_balance(available)),
            WithdrawalInsert::UserNotFound => {
                Err(LedgerError::NotFound(format!("User {} not found", req.user_id)))
            }
        }
    }

    pub async fn payment(&self, id: &str) -> Result<Payment, LedgerError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Payment {id} not found")))
    }
}
