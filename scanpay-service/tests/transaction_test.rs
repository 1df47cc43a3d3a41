mod common;

use chrono::Duration;
use common::{dec, GatewayMode, TestEngine};
use scanpay_service::error::PaymentError;
use scanpay_service::models::TransactionStatus;
use uuid::Uuid;

fn looks_like_reference(reference: &str) -> bool {
    let mut parts = reference.splitn(3, '_');
    parts.next() == Some("TXN")
        && parts
            .next()
            .map_or(false, |ms| !ms.is_empty() && ms.chars().all(|c| c.is_ascii_digit()))
        && parts
            .next()
            .map_or(false, |s| s.len() == 8 && s.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[tokio::test]
async fn create_settle_refund_scenario() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let merchant = engine.merchant.id;

    let created = txns
        .create(merchant, dec("50.00"), None, "Flat white")
        .await
        .unwrap();
    assert_eq!(created.status, TransactionStatus::Pending);
    assert!(looks_like_reference(&created.reference), "{}", created.reference);
    assert_eq!(created.currency, "USD");
    assert_eq!(
        created.qr_data.as_deref(),
        Some(format!("https://scanpay.com/pay?txn={}", created.reference).as_str())
    );
    assert_eq!(engine.state.wallet.balance(merchant), dec("0"));

    let settled = txns
        .authorize_and_settle(&created.reference, engine.customer.id, "card")
        .await
        .unwrap();
    assert_eq!(settled.status, TransactionStatus::Success);
    assert_eq!(settled.customer_id, Some(engine.customer.id));
    assert_eq!(settled.payment_method.as_deref(), Some("card"));
    assert!(settled.gateway_reference.is_some());
    assert!(settled.completed_at.is_some());
    assert_eq!(engine.state.wallet.balance(merchant), dec("50.00"));

    let refunded = txns.refund(created.id, dec("20.00")).await.unwrap();
    assert_eq!(refunded.status, TransactionStatus::Refunded);
    assert_eq!(refunded.refunded_amount, dec("20.00"));
    assert!(refunded.refunded);
    assert_eq!(engine.state.wallet.balance(merchant), dec("30.00"));

    assert_eq!(
        engine.notifier.subjects(),
        vec!["Payment Successful".to_string(), "Refund Processed".to_string()]
    );
}

#[tokio::test]
async fn second_settlement_is_refused_and_credits_once() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("50.00"), None, "")
        .await
        .unwrap();

    txns.authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();
    let again = txns
        .authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await;

    assert!(matches!(again, Err(PaymentError::InvalidState(_))));
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("50.00"));
    assert_eq!(engine.state.wallet.entries(engine.merchant.id).len(), 1);
    assert_eq!(engine.gateway.authorizations(), 1);
}

#[tokio::test]
async fn concurrent_settlements_credit_exactly_once() {
    let engine = TestEngine::new(GatewayMode::SlowApprove(std::time::Duration::from_millis(200)));
    let txn = engine
        .state
        .transactions
        .create(engine.merchant.id, dec("50.00"), None, "")
        .await
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let txns = engine.state.transactions.clone();
            let reference = txn.reference.clone();
            let customer = engine.customer.id;
            tokio::spawn(async move { txns.authorize_and_settle(&reference, customer, "card").await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(t) => {
                assert_eq!(t.status, TransactionStatus::Success);
                succeeded += 1;
            }
            Err(e) => assert!(matches!(e, PaymentError::InvalidState(_)), "{:?}", e),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(engine.gateway.authorizations(), 1);
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("50.00"));
}

#[tokio::test]
async fn declined_authorization_settles_as_failed() {
    let engine = TestEngine::new(GatewayMode::Decline);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("12.00"), None, "")
        .await
        .unwrap();

    let failed = txns
        .authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();

    assert_eq!(failed.status, TransactionStatus::Failed);
    assert!(failed.completed_at.is_some());
    assert!(failed.gateway_reference.is_none());
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("0"));
    assert_eq!(engine.notifier.subjects(), vec!["Payment Failed".to_string()]);

    let retry = txns
        .authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await;
    assert!(matches!(retry, Err(PaymentError::InvalidState(_))));
}

#[tokio::test]
async fn gateway_timeout_settles_as_failed() {
    let engine = TestEngine::new(GatewayMode::Hang);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("12.00"), None, "")
        .await
        .unwrap();

    let outcome = txns
        .authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();

    assert_eq!(outcome.status, TransactionStatus::Failed);
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("0"));
}

#[tokio::test]
async fn gateway_outage_leaves_transaction_pending_and_retryable() {
    let engine = TestEngine::new(GatewayMode::Fail);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("12.00"), None, "")
        .await
        .unwrap();

    let err = txns
        .authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::GatewayUnavailable(_)));
    assert_eq!(txns.find(txn.id).unwrap().status, TransactionStatus::Pending);

    engine.gateway.set_mode(GatewayMode::Approve);
    let settled = txns
        .authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();
    assert_eq!(settled.status, TransactionStatus::Success);
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("12.00"));
}

#[tokio::test]
async fn unknown_reference_and_customer_are_not_found() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;

    let err = txns
        .authorize_and_settle("TXN_0_missing0", engine.customer.id, "card")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));

    let txn = txns
        .create(engine.merchant.id, dec("5.00"), None, "")
        .await
        .unwrap();
    let err = txns
        .authorize_and_settle(&txn.reference, Uuid::new_v4(), "card")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
    assert_eq!(engine.gateway.authorizations(), 0);
    assert_eq!(txns.find(txn.id).unwrap().status, TransactionStatus::Pending);
}

#[tokio::test]
async fn refund_above_original_is_rejected_without_ledger_mutation() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("50.00"), None, "")
        .await
        .unwrap();
    txns.authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();

    let err = txns.refund(txn.id, dec("50.01")).await.unwrap_err();
    assert!(matches!(err, PaymentError::AmountExceedsOriginal { .. }));
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("50.00"));
    assert_eq!(engine.gateway.refunds(), 0);

    let stored = txns.find(txn.id).unwrap();
    assert_eq!(stored.status, TransactionStatus::Success);
    assert_eq!(stored.refunded_amount, dec("0"));
    assert!(!stored.refunded);
}

#[tokio::test]
async fn refund_requires_a_settled_transaction() {
    let engine = TestEngine::new(GatewayMode::Decline);
    let txns = &engine.state.transactions;
    let pending = txns
        .create(engine.merchant.id, dec("10.00"), None, "")
        .await
        .unwrap();
    assert!(matches!(
        txns.refund(pending.id, dec("1.00")).await,
        Err(PaymentError::InvalidState(_))
    ));

    txns.authorize_and_settle(&pending.reference, engine.customer.id, "card")
        .await
        .unwrap();
    assert!(matches!(
        txns.refund(pending.id, dec("1.00")).await,
        Err(PaymentError::InvalidState(_))
    ));

    assert!(matches!(
        txns.refund(Uuid::new_v4(), dec("1.00")).await,
        Err(PaymentError::NotFound(_))
    ));
}

#[tokio::test]
async fn refunded_transaction_cannot_be_refunded_again() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("40.00"), None, "")
        .await
        .unwrap();
    txns.authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();
    txns.refund(txn.id, dec("10.00")).await.unwrap();

    assert!(matches!(
        txns.refund(txn.id, dec("10.00")).await,
        Err(PaymentError::InvalidState(_))
    ));
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("30.00"));
}

#[tokio::test]
async fn refund_that_would_overdraw_wallet_changes_nothing() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let merchant = engine.merchant.id;
    let txn = txns.create(merchant, dec("50.00"), None, "").await.unwrap();
    txns.authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();
    engine.state.wallet.debit(merchant, dec("40.00"), "payout").unwrap();

    let err = txns.refund(txn.id, dec("20.00")).await.unwrap_err();
    assert!(matches!(err, PaymentError::InsufficientBalance { .. }));
    assert_eq!(engine.state.wallet.balance(merchant), dec("10.00"));

    let stored = txns.find(txn.id).unwrap();
    assert_eq!(stored.status, TransactionStatus::Success);
    assert!(!stored.refunded);
}

#[tokio::test]
async fn refund_gateway_failures_are_distinct() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("50.00"), None, "")
        .await
        .unwrap();
    txns.authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();

    engine.gateway.set_refund_mode(GatewayMode::Fail);
    assert!(matches!(
        txns.refund(txn.id, dec("5.00")).await,
        Err(PaymentError::GatewayUnavailable(_))
    ));

    engine.gateway.set_refund_mode(GatewayMode::Decline);
    assert!(matches!(
        txns.refund(txn.id, dec("5.00")).await,
        Err(PaymentError::GatewayDeclined(_))
    ));

    assert_eq!(txns.find(txn.id).unwrap().status, TransactionStatus::Success);
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("50.00"));
}

#[tokio::test]
async fn hanging_refund_times_out_and_releases_the_transaction() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("40.00"), None, "")
        .await
        .unwrap();
    txns.authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap();

    engine.gateway.set_refund_mode(GatewayMode::Hang);
    let outcome = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        txns.refund(txn.id, dec("10.00")),
    )
    .await
    .expect("refund must give up after the gateway timeout");
    assert!(matches!(outcome, Err(PaymentError::GatewayUnavailable(_))));
    assert_eq!(txns.find(txn.id).unwrap().status, TransactionStatus::Success);
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("40.00"));

    engine.gateway.set_refund_mode(GatewayMode::Approve);
    let refunded = txns.refund(txn.id, dec("10.00")).await.unwrap();
    assert_eq!(refunded.status, TransactionStatus::Refunded);
    assert_eq!(engine.state.wallet.balance(engine.merchant.id), dec("30.00"));
}

#[tokio::test]
async fn scan_for_offboarded_merchant_leaves_code_unconsumed() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let code = engine
        .state
        .qr_codes
        .issue(engine.merchant.id, Some(dec("9.00")), "PAYMENT", "")
        .await
        .unwrap();
    engine.directory.remove_merchant(engine.merchant.id);

    let err = engine
        .state
        .transactions
        .create_from_scan(&code.qr_data, engine.customer.id, None)
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::NotFound(_)));
    let stored = engine.state.qr_codes.find(code.id).unwrap();
    assert!(stored.scanned_at.is_none());
    assert!(stored.transaction_id.is_none());
    assert!(engine.state.qr_codes.validate(&code.qr_data));
}

#[tokio::test]
async fn sweep_expires_only_stale_pending_transactions() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let settled = txns
        .create(engine.merchant.id, dec("10.00"), None, "")
        .await
        .unwrap();
    txns.authorize_and_settle(&settled.reference, engine.customer.id, "card")
        .await
        .unwrap();
    let stale = txns
        .create(engine.merchant.id, dec("10.00"), None, "")
        .await
        .unwrap();

    engine.clock.advance(Duration::minutes(10));
    let fresh = txns
        .create(engine.merchant.id, dec("10.00"), None, "")
        .await
        .unwrap();

    engine.clock.advance(Duration::minutes(6));
    let report = engine.state.sweeper.run_once();
    assert_eq!(report.transactions_expired, 1);

    assert_eq!(txns.find(stale.id).unwrap().status, TransactionStatus::Expired);
    assert_eq!(txns.find(fresh.id).unwrap().status, TransactionStatus::Pending);
    assert_eq!(txns.find(settled.id).unwrap().status, TransactionStatus::Success);
    assert_eq!(txns.list_by_status(TransactionStatus::Expired).len(), 1);

    let err = txns
        .authorize_and_settle(&stale.reference, engine.customer.id, "card")
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidState(_)));
}

#[tokio::test]
async fn overdue_transaction_expires_on_payment_attempt() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let txn = txns
        .create(engine.merchant.id, dec("10.00"), None, "")
        .await
        .unwrap();

    engine.clock.advance(Duration::minutes(16));
    let err = txns
        .authorize_and_settle(&txn.reference, engine.customer.id, "card")
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::InvalidState(_)));
    assert_eq!(txns.find(txn.id).unwrap().status, TransactionStatus::Expired);
    assert_eq!(engine.gateway.authorizations(), 0);
}

#[tokio::test]
async fn create_validates_merchant_amount_and_currency() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let merchant = engine.merchant.id;

    assert!(matches!(
        txns.create(Uuid::new_v4(), dec("10.00"), None, "").await,
        Err(PaymentError::NotFound(_))
    ));
    for bad in ["0", "0.001", "10000.01", "-5"] {
        assert!(
            matches!(
                txns.create(merchant, dec(bad), None, "").await,
                Err(PaymentError::Validation(_))
            ),
            "amount {} should be rejected",
            bad
        );
    }
    assert!(matches!(
        txns.create(merchant, dec("10.00"), Some("JPY"), "").await,
        Err(PaymentError::Validation(_))
    ));

    let eur = txns
        .create(merchant, dec("10000.00"), Some("eur"), "")
        .await
        .unwrap();
    assert_eq!(eur.currency, "EUR");
}

#[tokio::test]
async fn listing_by_merchant_and_customer() {
    let engine = TestEngine::new(GatewayMode::Approve);
    let txns = &engine.state.transactions;
    let first = txns
        .create(engine.merchant.id, dec("1.00"), None, "")
        .await
        .unwrap();
    txns.create(engine.merchant.id, dec("2.00"), None, "")
        .await
        .unwrap();
    txns.authorize_and_settle(&first.reference, engine.customer.id, "card")
        .await
        .unwrap();

    assert_eq!(txns.list_for_merchant(engine.merchant.id).len(), 2);
    assert_eq!(txns.list_for_merchant(Uuid::new_v4()).len(), 0);

    let customer_txns = txns.list_for_customer(engine.customer.id);
    assert_eq!(customer_txns.len(), 1);
    assert_eq!(customer_txns[0].id, first.id);
    assert_eq!(
        txns.find_by_reference(&first.reference).unwrap().id,
        first.id
    );
}
