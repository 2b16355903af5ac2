//! In-memory stores for tests and local runs without Postgres. Each store keeps
//! its state behind one mutex, so every trait call is atomic.

use crate::domain::currency::Currency;
use crate::domain::payment::{NewPayment, NewWithdrawal, Payment, PaymentStatus, PaymentType, UserBalance};
use crate::repo::currencies_repo::CurrencyStore;
use crate::repo::payments_repo::{
    deposit_activity, withdrawal_activity, ActivityEntry, PaymentStore, StatusTransition, TransitionResult,
    WithdrawalInsert,
};
use anyhow::bail;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct StoredWithdrawal {
    pub id: i64,
    pub user_id: i64,
    pub amount: Decimal,
    pub fee_amount: Decimal,
    pub net_amount: Decimal,
    pub method: String,
    pub address: String,
}

#[derive(Default)]
struct PaymentState {
    payments: HashMap<String, Payment>,
    users: HashMap<i64, UserBalance>,
    activity: Vec<ActivityEntry>,
    withdrawals: Vec<StoredWithdrawal>,
}

#[derive(Clone, Default)]
pub struct MemoryPaymentStore {
    inner: Arc<Mutex<PaymentState>>,
    fail_credits: Arc<AtomicBool>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: i64, balance: Decimal) {
        self.inner.lock().await.users.insert(
            user_id,
            UserBalance {
                user_id,
                balance,
                total_deposited: Decimal::ZERO,
            },
        );
    }

    /// Makes balance credits fail so rollback paths can be exercised.
    pub fn set_fail_credits(&self, fail: bool) {
        self.fail_credits.store(fail, Ordering::SeqCst);
    }

    pub async fn activity(&self) -> Vec<ActivityEntry> {
        self.inner.lock().await.activity.clone()
    }

    pub async fn withdrawals(&self) -> Vec<StoredWithdrawal> {
        self.inner.lock().await.withdrawals.clone()
    }

    pub async fn payment_count(&self) -> usize {
        self.inner.lock().await.payments.len()
    }
}

fn new_row(new: &NewPayment) -> Payment {
    let now = Utc::now();
    Payment {
        id: new.id.clone(),
        user_id: new.user_id,
        amount: new.amount,
        crypto_currency: new.crypto_currency.clone(),
        payment_method: new.payment_method.clone(),
        status: PaymentStatus::Pending,
        payment_type: new.payment_type,
        transaction_id: None,
        gateway_data: None,
        description: new.description.clone(),
        created_at: now,
        updated_at: now,
    }
}

#[async_trait::async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn get(&self, id: &str) -> anyhow::Result<Option<Payment>> {
        Ok(self.inner.lock().await.payments.get(id).cloned())
    }

    async fn find_by_reference(&self, order_ref: &str, txn_id: Option<&str>) -> anyhow::Result<Option<Payment>> {
        let state = self.inner.lock().await;
        if let Some(p) = state.payments.get(order_ref) {
            return Ok(Some(p.clone()));
        }
        let Some(txn_id) = txn_id else {
            return Ok(None);
        };
        Ok(state
            .payments
            .values()
            .find(|p| p.transaction_id.as_deref() == Some(txn_id))
            .cloned())
    }

    async fn insert_pending(&self, new: &NewPayment) -> anyhow::Result<Payment> {
        let mut state = self.inner.lock().await;
        if !state.users.contains_key(&new.user_id) {
            bail!("user {} does not exist", new.user_id);
        }
        if state.payments.contains_key(&new.id) {
            bail!("duplicate payment id {}", new.id);
        }
        let row = new_row(new);
        state.payments.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    async fn attach_invoice(&self, id: &str, external_id: &str, gateway_data: &serde_json::Value) -> anyhow::Result<()> {
        let mut state = self.inner.lock().await;
        if let Some(p) = state.payments.get_mut(id) {
            p.transaction_id = Some(external_id.to_string());
            p.gateway_data = Some(gateway_data.clone());
            p.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn discard_pending(&self, id: &str) -> anyhow::Result<()> {
        let mut state = self.inner.lock().await;
        if state.payments.get(id).map(|p| p.status) == Some(PaymentStatus::Pending) {
            state.payments.remove(id);
        }
        Ok(())
    }

    async fn apply_transition(&self, t: &StatusTransition) -> anyhow::Result<TransitionResult> {
        let mut state = self.inner.lock().await;
        let Some(current) = state.payments.get(&t.payment_id).cloned() else {
            return Ok(TransitionResult::NotFound);
        };
        if current.status == t.new_status {
            return Ok(TransitionResult::Unchanged(current));
        }
        if current.status.is_terminal() {
            return Ok(TransitionResult::Refused(current));
        }

        let credit = t.new_status == PaymentStatus::Completed && current.payment_type == PaymentType::Deposit;
        if credit {
            if self.fail_credits.load(Ordering::SeqCst) {
                bail!("simulated credit failure");
            }
            if !state.users.contains_key(&current.user_id) {
                bail!("user {} not found for payment {}", current.user_id, current.id);
            }
        }

        let mut updated = current;
        updated.status = t.new_status;
        if let Some(txn) = &t.transaction_id {
            updated.transaction_id = Some(txn.clone());
        }
        updated.gateway_data = Some(t.gateway_data.clone());
        updated.updated_at = Utc::now();
        state.payments.insert(updated.id.clone(), updated.clone());

        let mut credited = None;
        if credit {
            if let Some(user) = state.users.get_mut(&updated.user_id) {
                user.balance += updated.amount;
                user.total_deposited += updated.amount;
            }
            state.activity.push(deposit_activity(updated.user_id, updated.amount));
            credited = Some(updated.amount);
        }
        Ok(TransitionResult::Applied {
            payment: updated,
            credited,
        })
    }

    async fn create_withdrawal(&self, w: &NewWithdrawal) -> anyhow::Result<WithdrawalInsert> {
        let mut state = self.inner.lock().await;
        let user_id = w.payment.user_id;
        let Some(available) = state.users.get(&user_id).map(|u| u.balance) else {
            return Ok(WithdrawalInsert::UserNotFound);
        };
        if available < w.payment.amount {
            return Ok(WithdrawalInsert::InsufficientBalance { available });
        }
        if let Some(user) = state.users.get_mut(&user_id) {
            user.balance -= w.payment.amount;
        }
        let withdrawal_id = state.withdrawals.len() as i64 + 1;
        state.withdrawals.push(StoredWithdrawal {
            id: withdrawal_id,
            user_id,
            amount: w.payment.amount,
            fee_amount: w.fee_amount,
            net_amount: w.net_amount,
            method: w.payment.payment_method.clone(),
            address: w.address.clone(),
        });
        let payment = new_row(&w.payment);
        state.payments.insert(payment.id.clone(), payment.clone());
        state
            .activity
            .push(withdrawal_activity(user_id, w.payment.amount, w.net_amount));
        Ok(WithdrawalInsert::Created { withdrawal_id, payment })
    }

    async fn balance(&self, user_id: i64) -> anyhow::Result<Option<UserBalance>> {
        Ok(self.inner.lock().await.users.get(&user_id).cloned())
    }
}

#[derive(Clone, Default)]
pub struct MemoryCurrencyStore {
    inner: Arc<Mutex<BTreeMap<String, Currency>>>,
}

impl MemoryCurrencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_active(&self, code: &str, active: bool) {
        if let Some(c) = self.inner.lock().await.get_mut(code) {
            c.is_active = active;
        }
    }

    pub async fn stored_rate(&self, code: &str) -> Option<Decimal> {
        self.inner.lock().await.get(code).map(|c| c.exchange_rate)
    }
}

#[async_trait::async_trait]
impl CurrencyStore for MemoryCurrencyStore {
    async fn upsert(&self, currency: &Currency) -> anyhow::Result<()> {
        let mut map = self.inner.lock().await;
        match map.get_mut(&currency.code) {
            Some(existing) => {
                existing.name = currency.name.clone();
                existing.symbol = currency.symbol.clone();
                existing.decimals = currency.decimals;
                existing.min_amount = currency.min_amount;
                existing.network = currency.network.clone();
                existing.icon = currency.icon.clone();
            }
            None => {
                map.insert(currency.code.clone(), currency.clone());
            }
        }
        Ok(())
    }

    async fn list_active(&self) -> anyhow::Result<Vec<Currency>> {
        Ok(self
            .inner
            .lock()
            .await
            .values()
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn get_active(&self, code: &str) -> anyhow::Result<Option<Currency>> {
        Ok(self.inner.lock().await.get(code).filter(|c| c.is_active).cloned())
    }

    async fn update_rate(&self, code: &str, rate: Decimal) -> anyhow::Result<()> {
        if let Some(c) = self.inner.lock().await.get_mut(code) {
            c.exchange_rate = rate.round_dp(8);
            c.last_updated = Some(Utc::now());
        }
        Ok(())
    }
}
