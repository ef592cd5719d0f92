mod common;

use common::*;
use partshub_api::entities::SafeTransactionType;
use partshub_api::errors::ServiceError;
use partshub_api::services::suppliers::{CreateSupplierRequest, SupplierMovementRequest};
use rust_decimal_macros::dec;

#[tokio::test]
async fn purchases_grow_and_payments_shrink_the_payable() {
    let state = test_state().await;
    let user = clerk();
    let safe = seed_safe(&state, "MAIN").await;
    // Give the safe something to pay out of
    state
        .services
        .safes
        .post(partshub_api::services::safes::PostTransactionRequest {
            safe_id: safe,
            tx_type: SafeTransactionType::Deposit,
            amount_usd: dec!(0),
            amount_lyd: dec!(1000),
            exchange_rate: None,
            description: "Opening float".to_string(),
            reference_type: None,
            reference_id: None,
            created_by: user.id,
        })
        .await
        .expect("seed safe balance");

    let supplier = state
        .services
        .suppliers
        .create(CreateSupplierRequest {
            name: "Tripoli Parts Co".to_string(),
            code: "TPC".to_string(),
            currency: "LYD".to_string(),
        })
        .await
        .expect("create supplier");
    assert_eq!(supplier.balance_owed, dec!(0));

    let after_purchase = state
        .services
        .suppliers
        .record_purchase(
            user.id,
            supplier.id,
            SupplierMovementRequest {
                amount: dec!(600),
                description: Some("Brake pad shipment".to_string()),
                safe_id: None,
            },
        )
        .await
        .expect("record purchase");
    assert_eq!(after_purchase.balance_owed, dec!(600));

    let after_payment = state
        .services
        .suppliers
        .record_payment(
            user.id,
            supplier.id,
            SupplierMovementRequest {
                amount: dec!(250),
                description: None,
                safe_id: Some(safe),
            },
        )
        .await
        .expect("record payment");
    assert_eq!(after_payment.balance_owed, dec!(350));

    // The payment was drawn from the safe via the outbox
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(750));

    let debts = state
        .services
        .suppliers
        .list_debts()
        .await
        .expect("list debts");
    assert_eq!(debts.len(), 1);
    assert_eq!(debts[0].balance_owed, dec!(350));
}

#[tokio::test]
async fn paying_more_than_owed_is_rejected() {
    let state = test_state().await;
    let user = clerk();

    let supplier = state
        .services
        .suppliers
        .create(CreateSupplierRequest {
            name: "Benghazi Motors".to_string(),
            code: "BM".to_string(),
            currency: "LYD".to_string(),
        })
        .await
        .expect("create supplier");

    let err = state
        .services
        .suppliers
        .record_payment(
            user.id,
            supplier.id,
            SupplierMovementRequest {
                amount: dec!(10),
                description: None,
                safe_id: None,
            },
        )
        .await
        .expect_err("overpayment must fail");
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}
