mod common;

use common::*;
use rust_decimal::Decimal;
use star_rent_payments::config::AppConfig;
use star_rent_payments::domain::payment::{DepositRequest, PaymentStatus, PaymentType, WithdrawalRequest};
use star_rent_payments::domain::webhook::GatewayKind;
use star_rent_payments::error::LedgerError;
use star_rent_payments::gateways::mock::MockGateway;
use star_rent_payments::repo::payments_repo::PaymentStore;
use star_rent_payments::settings;

const BTC_ADDRESS: &str = "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa";

fn deposit(amount: i64, currency: &str) -> DepositRequest {
    DepositRequest {
        user_id: USER_ID,
        amount: Decimal::from(amount),
        currency: currency.to_string(),
        email: Some("renter@example.com".to_string()),
    }
}

fn withdrawal(amount: i64, address: &str) -> WithdrawalRequest {
    WithdrawalRequest {
        user_id: USER_ID,
        amount: Decimal::from(amount),
        currency: "BTC".to_string(),
        address: address.to_string(),
        method: Some("plisio".to_string()),
    }
}

#[tokio::test]
async fn deposit_opens_pending_payment_with_invoice() {
    let h = harness(default_settings(), AppConfig::default()).await;
    let gateway = MockGateway::new("plisio", "ALWAYS_SUCCESS");

    let resp = h.state.ledger.create_deposit(deposit(150, "btc"), &gateway).await.unwrap();
    assert!(resp.external_id.starts_with("mock_txn_"));
    assert_eq!(resp.currency, "BTC");
    assert_eq!(resp.payment_id.len(), 32);

    let payment = h.store.get(&resp.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.payment_type, PaymentType::Deposit);
    assert_eq!(payment.payment_method, "plisio");
    assert_eq!(payment.transaction_id.as_deref(), Some(resp.external_id.as_str()));

    let sent = gateway.recorded();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].order_id, resp.payment_id);
    assert_eq!(
        sent[0].callback_url.as_deref(),
        Some("https://rent.example/api/webhook/plisio")
    );
    assert_eq!(
        sent[0].success_url.as_deref(),
        Some(format!("https://rent.example/user/deposit-success?id={}", resp.payment_id).as_str())
    );
}

#[tokio::test]
async fn deposit_limits_come_from_settings() {
    let h = harness(default_settings(), AppConfig::default()).await;
    let gateway = MockGateway::new("plisio", "ALWAYS_SUCCESS");

    let err = h.state.ledger.create_deposit(deposit(99, "BTC"), &gateway).await.unwrap_err();
    assert_eq!(err.to_string(), "Minimum deposit amount is $100.00");
    let err = h.state.ledger.create_deposit(deposit(50001, "BTC"), &gateway).await.unwrap_err();
    assert_eq!(err.to_string(), "Maximum deposit amount is $50000.00");

    let custom = harness(
        default_settings().with(settings::MIN_DEPOSIT, "10"),
        AppConfig::default(),
    )
    .await;
    assert!(custom.state.ledger.create_deposit(deposit(10, "ETH"), &gateway).await.is_ok());
    assert_eq!(gateway.recorded().len(), 1);
}

#[tokio::test]
async fn deposit_rejects_inactive_currency() {
    let h = harness(default_settings(), AppConfig::default()).await;
    h.currencies.set_active("XMR", false).await;
    let gateway = MockGateway::new("plisio", "ALWAYS_SUCCESS");

    let err = h.state.ledger.create_deposit(deposit(200, "XMR"), &gateway).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(err.to_string(), "Unsupported currency: XMR");
    assert_eq!(h.store.payment_count().await, 0);
}

#[tokio::test]
async fn gateway_failure_discards_pending_deposit() {
    let h = harness(default_settings(), AppConfig::default()).await;

    for behavior in ["ALWAYS_FAILURE", "ALWAYS_TIMEOUT"] {
        let gateway = MockGateway::new("plisio", behavior);
        let err = h.state.ledger.create_deposit(deposit(200, "BTC"), &gateway).await.unwrap_err();
        assert!(matches!(err, LedgerError::Gateway(_)));
    }
    assert_eq!(h.store.payment_count().await, 0);
}

#[tokio::test]
async fn withdrawal_debits_balance_and_records_fee() {
    let h = harness(default_settings(), AppConfig::default()).await;
    h.store.add_user(USER_ID, Decimal::from(500)).await;

    let resp = h.state.ledger.request_withdrawal(withdrawal(100, BTC_ADDRESS)).await.unwrap();
    assert_eq!(resp.status, PaymentStatus::Pending);
    assert_eq!(resp.fee_amount, Decimal::new(25, 1));
    assert_eq!(resp.net_amount, Decimal::new(975, 1));

    assert_eq!(balance(&h.store).await.0, Decimal::from(400));
    let stored = h.store.withdrawals().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].method, "plisio");
    assert_eq!(stored[0].address, BTC_ADDRESS);

    let payment = h.store.get(&resp.payment_id).await.unwrap().unwrap();
    assert_eq!(payment.payment_type, PaymentType::Withdrawal);
    assert_eq!(payment.description.as_deref(), Some("Withdrawal request to 1A1zP1eP5Q..."));

    let activity = h.store.activity().await;
    assert_eq!(activity[0].description, "Withdrawal request for $100.00 (net: $97.50)");
}

#[tokio::test]
async fn withdrawal_validation() {
    let h = harness(default_settings(), AppConfig::default()).await;
    h.store.add_user(USER_ID, Decimal::from(50)).await;
    let ledger = &h.state.ledger;

    let err = ledger.request_withdrawal(withdrawal(30, "  ")).await.unwrap_err();
    assert_eq!(err.to_string(), "Withdrawal address is required.");

    let err = ledger.request_withdrawal(withdrawal(30, "not-an-address")).await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid BTC address");

    let err = ledger.request_withdrawal(withdrawal(10, BTC_ADDRESS)).await.unwrap_err();
    assert_eq!(err.to_string(), "Minimum withdrawal amount is $20.00");

    let err = ledger.request_withdrawal(withdrawal(80, BTC_ADDRESS)).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance(_)));
    assert_eq!(err.to_string(), "Insufficient balance. Available: $50.00");
    assert_eq!(balance(&h.store).await.0, Decimal::from(50));

    let mut stranger = withdrawal(30, BTC_ADDRESS);
    stranger.user_id = 404;
    let err = ledger.request_withdrawal(stranger).await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[tokio::test]
async fn oversized_withdrawal_is_refused_without_overflow() {
    let h = harness(default_settings(), AppConfig::default()).await;
    h.store.add_user(USER_ID, Decimal::from(50)).await;

    let mut huge = withdrawal(0, BTC_ADDRESS);
    huge.amount = Decimal::MAX;
    let err = h.state.ledger.request_withdrawal(huge.clone()).await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance(_)));
    assert_eq!(err.to_string(), "Insufficient balance. Available: $50.00");

    // A balance large enough to pass the check still cannot overflow the fee.
    h.store.add_user(USER_ID, Decimal::MAX).await;
    let err = h.state.ledger.request_withdrawal(huge).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
    assert_eq!(err.to_string(), "Amount is too large");
    assert_eq!(balance(&h.store).await.0, Decimal::MAX);
    assert!(h.store.withdrawals().await.is_empty());
}

#[tokio::test]
async fn out_of_range_fee_setting_uses_default() {
    for fee in ["150", "-5"] {
        let h = harness(
            default_settings().with(settings::WITHDRAWAL_FEE, fee),
            AppConfig::default(),
        )
        .await;
        h.store.add_user(USER_ID, Decimal::from(500)).await;

        let resp = h.state.ledger.request_withdrawal(withdrawal(100, BTC_ADDRESS)).await.unwrap();
        assert_eq!(resp.fee_amount, Decimal::new(25, 1), "fee setting {fee}");
        assert_eq!(resp.net_amount, Decimal::new(975, 1), "fee setting {fee}");
    }

    let h = harness(
        default_settings().with(settings::WITHDRAWAL_FEE, "100"),
        AppConfig::default(),
    )
    .await;
    h.store.add_user(USER_ID, Decimal::from(500)).await;
    let resp = h.state.ledger.request_withdrawal(withdrawal(100, BTC_ADDRESS)).await.unwrap();
    assert_eq!(resp.net_amount, Decimal::ZERO);
}

#[tokio::test]
async fn withdrawal_is_never_credited_by_webhook() {
    let h = harness(default_settings(), AppConfig::default()).await;
    h.store.add_user(USER_ID, Decimal::from(100)).await;
    let resp = h.state.ledger.request_withdrawal(withdrawal(40, BTC_ADDRESS)).await.unwrap();

    let payload = plisio_payload(&resp.payment_id, "payout-1", "completed");
    let outcome = h.state.ledger.process_webhook(GatewayKind::Plisio, &payload).await.unwrap();
    assert!(outcome.changed);
    assert_eq!(outcome.status, PaymentStatus::Completed);
    assert_eq!(balance(&h.store).await.0, Decimal::from(60));
}

#[tokio::test]
async fn webhook_can_match_on_transaction_id() {
    let h = harness(default_settings(), AppConfig::default()).await;
    let gateway = MockGateway::new("plisio", "ALWAYS_SUCCESS");
    let resp = h.state.ledger.create_deposit(deposit(120, "BTC"), &gateway).await.unwrap();

    let payload = plisio_payload("unrelated-order", &resp.external_id, "completed");
    let outcome = h.state.ledger.process_webhook(GatewayKind::Plisio, &payload).await.unwrap();
    assert_eq!(outcome.payment_id, resp.payment_id);
    assert_eq!(balance(&h.store).await.0, Decimal::from(120));
}

#[tokio::test]
async fn unknown_status_keeps_payment_pending() {
    let h = harness(default_settings(), AppConfig::default()).await;
    insert_deposit(&h.store, "ord-u", Decimal::from(100)).await;

    let payload = plisio_payload("ord-u", "tx-u", "mismatch");
    let outcome = h.state.ledger.process_webhook(GatewayKind::Plisio, &payload).await.unwrap();
    assert!(!outcome.changed);
    assert_eq!(outcome.status, PaymentStatus::Pending);
    assert_eq!(outcome.message.as_deref(), Some("No status change required"));
}

#[tokio::test]
async fn payment_lookup_reports_missing_ids() {
    let h = harness(default_settings(), AppConfig::default()).await;
    let err = h.state.ledger.payment("nope").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
    assert_eq!(err.to_string(), "Payment nope not found");
}
