use crate::domain::payment::{NewPayment, NewWithdrawal, Payment, PaymentStatus, PaymentType, UserBalance};
use anyhow::{anyhow, bail};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Status change requested by a webhook.
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub payment_id: String,
    pub new_status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub gateway_data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub enum TransitionResult {
    NotFound,
    /// Row already holds the requested status.
    Unchanged(Payment),
    /// Row is terminal and the request would move it elsewhere.
    Refused(Payment),
    Applied {
        payment: Payment,
        credited: Option<Decimal>,
    },
}

#[derive(Debug, Clone)]
pub enum WithdrawalInsert {
    Created { withdrawal_id: i64, payment: Payment },
    InsufficientBalance { available: Decimal },
    UserNotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEntry {
    pub user_id: i64,
    pub action: String,
    pub description: String,
}

/// Persistence behind the payment ledger. `apply_transition` and
/// `create_withdrawal` are each one atomic unit.
#[async_trait::async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get(&self, id: &str) -> anyhow::Result<Option<Payment>>;

    /// Matches `id = order_ref` or `transaction_id = txn_id`.
    async fn find_by_reference(&self, order_ref: &str, txn_id: Option<&str>) -> anyhow::Result<Option<Payment>>;

    async fn insert_pending(&self, new: &NewPayment) -> anyhow::Result<Payment>;

    async fn attach_invoice(&self, id: &str, external_id: &str, gateway_data: &serde_json::Value) -> anyhow::Result<()>;

    /// Deletes a payment that never reached the gateway. Non-pending rows are left alone.
    async fn discard_pending(&self, id: &str) -> anyhow::Result<()>;

    async fn apply_transition(&self, transition: &StatusTransition) -> anyhow::Result<TransitionResult>;

    async fn create_withdrawal(&self, withdrawal: &NewWithdrawal) -> anyhow::Result<WithdrawalInsert>;

    async fn balance(&self, user_id: i64) -> anyhow::Result<Option<UserBalance>>;
}

pub fn deposit_activity(user_id: i64, amount: Decimal) -> ActivityEntry {
    ActivityEntry {
        user_id,
        action: "deposit_completed".to_string(),
        description: format!("Deposit of ${:.2} completed", amount.round_dp(2)),
    }
}

pub fn withdrawal_activity(user_id: i64, amount: Decimal, net_amount: Decimal) -> ActivityEntry {
    ActivityEntry {
        user_id,
        action: "withdrawal_requested".to_string(),
        description: format!(
            "Withdrawal request for ${:.2} (net: ${:.2})",
            amount.round_dp(2),
            net_amount.round_dp(2)
        ),
    }
}

const PAYMENT_COLUMNS: &str = "id, user_id, amount, crypto_currency, payment_method, status, type, \
     transaction_id, gateway_data, description, created_at, updated_at";

#[derive(Clone)]
pub struct PaymentsRepo {
    pub pool: PgPool,
}

fn payment_from_row(r: &PgRow) -> anyhow::Result<Payment> {
    let status: String = r.get("status");
    let kind: String = r.get("type");
    Ok(Payment {
        id: r.get("id"),
        user_id: r.get("user_id"),
        amount: r.get("amount"),
        crypto_currency: r.get("crypto_currency"),
        payment_method: r.get("payment_method"),
        status: PaymentStatus::parse(&status).ok_or_else(|| anyhow!("unknown payment status {status}"))?,
        payment_type: PaymentType::parse(&kind).ok_or_else(|| anyhow!("unknown payment type {kind}"))?,
        transaction_id: r.get("transaction_id"),
        gateway_data: r.get("gateway_data"),
        description: r.get("description"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

impl PaymentsRepo {
    async fn insert_payment_tx(tx: &mut Transaction<'_, Postgres>, new: &NewPayment) -> anyhow::Result<Payment> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO payments (id, user_id, amount, crypto_currency, payment_method, status, type, description)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(&new.id)
        .bind(new.user_id)
        .bind(new.amount)
        .bind(&new.crypto_currency)
        .bind(&new.payment_method)
        .bind(new.payment_type.as_str())
        .bind(&new.description)
        .fetch_one(tx.as_mut())
        .await?;
        payment_from_row(&row)
    }

    async fn log_activity_tx(tx: &mut Transaction<'_, Postgres>, entry: &ActivityEntry) -> anyhow::Result<()> {
        sqlx::query("INSERT INTO activity_logs (user_id, action, description) VALUES ($1, $2, $3)")
            .bind(entry.user_id)
            .bind(&entry.action)
            .bind(&entry.description)
            .execute(tx.as_mut())
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PaymentStore for PaymentsRepo {
    async fn get(&self, id: &str) -> anyhow::Result<Option<Payment>> {
        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn find_by_reference(&self, order_ref: &str, txn_id: Option<&str>) -> anyhow::Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE id = $1 OR ($2::TEXT IS NOT NULL AND transaction_id = $2)
            ORDER BY (id = $1) DESC
            LIMIT 1
            "#
        ))
        .bind(order_ref)
        .bind(txn_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn insert_pending(&self, new: &NewPayment) -> anyhow::Result<Payment> {
        let mut tx = self.pool.begin().await?;
        let payment = Self::insert_payment_tx(&mut tx, new).await?;
        tx.commit().await?;
        Ok(payment)
    }

    async fn attach_invoice(&self, id: &str, external_id: &str, gateway_data: &serde_json::Value) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE payments
            SET transaction_id = $2, gateway_data = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(external_id)
        .bind(gateway_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn discard_pending(&self, id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM payments WHERE id = $1 AND status = 'pending'")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn apply_transition(&self, t: &StatusTransition) -> anyhow::Result<TransitionResult> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"))
            .bind(&t.payment_id)
            .fetch_optional(tx.as_mut())
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(TransitionResult::NotFound);
        };
        let current = payment_from_row(&row)?;

        // Re-checked under the row lock; a concurrent delivery may have won.
        if current.status == t.new_status {
            tx.rollback().await?;
            return Ok(TransitionResult::Unchanged(current));
        }
        if current.status.is_terminal() {
            tx.rollback().await?;
            return Ok(TransitionResult::Refused(current));
        }

        let row = sqlx::query(&format!(
            r#"
            UPDATE payments
            SET status = $2,
                transaction_id = COALESCE($3, transaction_id),
                gateway_data = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(&t.payment_id)
        .bind(t.new_status.as_str())
        .bind(&t.transaction_id)
        .bind(&t.gateway_data)
        .fetch_one(tx.as_mut())
        .await?;
        let payment = payment_from_row(&row)?;

        let mut credited = None;
        if payment.status == PaymentStatus::Completed && payment.payment_type == PaymentType::Deposit {
            let updated = sqlx::query(
                r#"
                UPDATE users
                SET balance = balance + $1, total_deposited = total_deposited + $1
                WHERE id = $2
                "#,
            )
            .bind(payment.amount)
            .bind(payment.user_id)
            .execute(tx.as_mut())
            .await?;
            if updated.rows_affected() == 0 {
                bail!("user {} not found for payment {}", payment.user_id, payment.id);
            }
            Self::log_activity_tx(&mut tx, &deposit_activity(payment.user_id, payment.amount)).await?;
            credited = Some(payment.amount);
        }

        tx.commit().await?;
        Ok(TransitionResult::Applied { payment, credited })
    }

    async fn create_withdrawal(&self, w: &NewWithdrawal) -> anyhow::Result<WithdrawalInsert> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(w.payment.user_id)
            .fetch_optional(tx.as_mut())
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(WithdrawalInsert::UserNotFound);
        };
        let available: Decimal = row.get("balance");
        if available < w.payment.amount {
            tx.rollback().await?;
            return Ok(WithdrawalInsert::InsufficientBalance { available });
        }

        sqlx::query("UPDATE users SET balance = balance - $1 WHERE id = $2")
            .bind(w.payment.amount)
            .bind(w.payment.user_id)
            .execute(tx.as_mut())
            .await?;

        let withdrawal_id: i64 = sqlx::query(
            r#"
            INSERT INTO withdrawal_requests
                (user_id, amount, fee_amount, net_amount, withdrawal_method, withdrawal_address, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING id
            "#,
        )
        .bind(w.payment.user_id)
        .bind(w.payment.amount)
        .bind(w.fee_amount)
        .bind(w.net_amount)
        .bind(&w.payment.payment_method)
        .bind(&w.address)
        .fetch_one(tx.as_mut())
        .await?
        .get("id");

        let payment = Self::insert_payment_tx(&mut tx, &w.payment).await?;
        Self::log_activity_tx(
            &mut tx,
            &withdrawal_activity(w.payment.user_id, w.payment.amount, w.net_amount),
        )
        .await?;

        tx.commit().await?;
        Ok(WithdrawalInsert::Created { withdrawal_id, payment })
    }

    async fn balance(&self, user_id: i64) -> anyhow::Result<Option<UserBalance>> {
        let row = sqlx::query("SELECT id, balance, total_deposited FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserBalance {
            user_id: r.get("id"),
            balance: r.get("balance"),
            total_deposited: r.get("total_deposited"),
        }))
    }
}
