mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::json;
use uuid::Uuid;

use common::*;
use flowpay_core::domain::{PaymentStatus, TransactionStatus};
use flowpay_core::ports::LedgerStore;

async fn pending_payment(app: &TestApp, owner: Uuid) -> (Uuid, Uuid) {
    let wallet = app.funded_wallet(owner, "USD", "500").await;
    let response = app
        .send(post_json("/payments", Some(owner), &payment_body(json!(100), "USD", "EUR"), None))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let tx_id = Uuid::parse_str(response.json()["transactionId"].as_str().unwrap()).unwrap();
    (wallet.id, tx_id)
}

#[tokio::test]
async fn test_success_completes_payment_without_touching_balance() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let (wallet_id, tx_id) = pending_payment(&app, owner).await;

    let response = app
        .send(signed_webhook(&processor_event("payment_intent.succeeded", "pi_1", Some(tx_id))))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({ "received": true }));

    let tx = app.store.get_transaction(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(app.balance(wallet_id).await, dec("395"));

    let payment = app
        .store
        .find_payment_by_external_ref("pi_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_duplicate_delivery_is_a_no_op() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let (wallet_id, tx_id) = pending_payment(&app, owner).await;

    let failed = processor_event("payment_intent.payment_failed", "pi_1", Some(tx_id));
    for _ in 0..2 {
        let response = app.send(signed_webhook(&failed)).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    // Released exactly once.
    assert_eq!(app.balance(wallet_id).await, dec("500"));

    // A late success for an already failed transaction changes nothing.
    app.send(signed_webhook(&processor_event("payment_intent.succeeded", "pi_1", Some(tx_id))))
        .await;
    let tx = app.store.get_transaction(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(app.balance(wallet_id).await, dec("500"));
}

#[tokio::test]
async fn test_lookup_falls_back_to_external_ref() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let (_, tx_id) = pending_payment(&app, owner).await;

    app.send(signed_webhook(&processor_event("payment_intent.canceled", "pi_1", None)))
        .await;

    let tx = app.store.get_transaction(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
}

#[tokio::test]
async fn test_invalid_signature_is_rejected_before_state_changes() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let (wallet_id, tx_id) = pending_payment(&app, owner).await;

    let payload = processor_event("payment_intent.payment_failed", "pi_1", Some(tx_id)).to_string();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/processor")
        .header("stripe-signature", format!("t={},v1={}", chrono::Utc::now().timestamp(), "ab".repeat(32)))
        .body(Body::from(payload))
        .unwrap();
    let response = app.send(request).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let unsigned = Request::builder()
        .method("POST")
        .uri("/webhooks/processor")
        .body(Body::from("{}"))
        .unwrap();
    assert_eq!(app.send(unsigned).await.status, StatusCode::BAD_REQUEST);

    let tx = app.store.get_transaction(tx_id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(app.balance(wallet_id).await, dec("395"));
}

#[tokio::test]
async fn test_unknown_and_malformed_events_are_acknowledged() {
    let app = TestApp::new();

    let unknown = app
        .send(signed_webhook(&processor_event("charge.refunded", "ch_1", None)))
        .await;
    assert_eq!(unknown.status, StatusCode::OK);

    let orphan = app
        .send(signed_webhook(&processor_event("payment_intent.succeeded", "pi_404", None)))
        .await;
    assert_eq!(orphan.status, StatusCode::OK);

    let malformed = app.send(signed_webhook(&json!({ "unexpected": true }))).await;
    assert_eq!(malformed.status, StatusCode::OK);
    assert_eq!(malformed.json()["received"], true);
}

#[tokio::test]
async fn test_fund_is_credited_once_on_confirmation() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let wallet = app.funded_wallet(owner, "USD", "10").await;

    let response = app
        .send(post_json(
            "/wallets/fund",
            Some(owner),
            &json!({ "walletId": wallet.id, "amount": "40" }),
            None,
        ))
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let body = response.json();
    assert_eq!(body["clientSecret"], "pi_1_secret");
    assert_eq!(body["transaction"]["status"], "Pending");
    assert_eq!(app.balance(wallet.id).await, dec("10"));

    let confirmed = processor_event("payment_intent.succeeded", "pi_1", None);
    app.send(signed_webhook(&confirmed)).await;
    app.send(signed_webhook(&confirmed)).await;

    assert_eq!(app.balance(wallet.id).await, dec("50"));
}

#[tokio::test]
async fn test_withdrawal_settles_on_payout_events() {
    let app = TestApp::new();
    let owner = Uuid::new_v4();
    let wallet = app.funded_wallet(owner, "USD", "100").await;

    let paid = app
        .send(post_json(
            "/wallets/withdraw",
            Some(owner),
            &json!({ "walletId": wallet.id, "amount": 30, "recipient": "ba_123" }),
            None,
        ))
        .await;
    assert_eq!(paid.status, StatusCode::CREATED);
    assert_eq!(paid.json()["wallet"]["balance"], "70");

    let failed = app
        .send(post_json(
            "/wallets/withdraw",
            Some(owner),
            &json!({ "walletId": wallet.id, "amount": 20 }),
            None,
        ))
        .await;
    assert_eq!(failed.status, StatusCode::CREATED);
    assert_eq!(app.balance(wallet.id).await, dec("50"));

    app.send(signed_webhook(&processor_event("payout.paid", "po_1", None))).await;
    app.send(signed_webhook(&processor_event("payout.failed", "po_2", None))).await;

    assert_eq!(app.balance(wallet.id).await, dec("70"));
    let settled = app
        .store
        .find_transaction_by_external_ref("po_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settled.status, TransactionStatus::Completed);
}
