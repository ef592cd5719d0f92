mod common;

use common::*;
use partshub_api::entities::{Branch, PaymentStatus};
use partshub_api::errors::ServiceError;
use partshub_api::services::credit::RecordPaymentRequest;
use partshub_api::services::invoices::{
    CreateInvoiceRequest, InvoiceItemInput, PaymentType,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn credit_invoice(
    state: &partshub_api::AppState,
    user: &partshub_api::auth::AuthUser,
    product: Uuid,
    safe_id: Option<Uuid>,
) -> partshub_api::services::invoices::InvoiceWithItems {
    state
        .services
        .invoices
        .create(
            user,
            CreateInvoiceRequest {
                customer_name: "Garage Sahara".to_string(),
                branch: Branch::BranchA,
                items: vec![InvoiceItemInput {
                    product_id: product,
                    product_name: "Alternator".to_string(),
                    quantity: 1,
                    unit_price: dec!(200),
                }],
                discount_type: None,
                discount_value: None,
                service_amount: None,
                safe_id,
                payment_type: Some(PaymentType::Credit),
            },
        )
        .await
        .expect("create credit invoice")
}

#[tokio::test]
async fn credit_sale_starts_unpaid_and_posts_no_deposit() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 5).await;
    let safe = seed_safe(&state, "MAIN").await;

    let created = credit_invoice(&state, &user, product, Some(safe)).await;
    assert_eq!(created.invoice.payment_status, PaymentStatus::Unpaid);
    assert_eq!(created.invoice.paid_amount, dec!(0));
    assert_eq!(created.invoice.remaining_amount, dec!(200));

    // Credit sales never deposit the sale amount up front
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(0));
}

#[tokio::test]
async fn payments_walk_the_invoice_to_paid() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 5).await;
    let safe = seed_safe(&state, "MAIN").await;
    let created = credit_invoice(&state, &user, product, None).await;

    let first = state
        .services
        .credit
        .record_payment(
            user.id,
            RecordPaymentRequest {
                invoice_id: created.invoice.id,
                amount: dec!(80),
                payment_method: "cash".to_string(),
                safe_id: Some(safe),
                description: None,
            },
        )
        .await
        .expect("first payment");
    assert_eq!(first.invoice.remaining_amount, dec!(120));
    assert_eq!(first.invoice.payment_status, PaymentStatus::PartiallyPaid);

    let second = state
        .services
        .credit
        .record_payment(
            user.id,
            RecordPaymentRequest {
                invoice_id: created.invoice.id,
                amount: dec!(120),
                payment_method: "cash".to_string(),
                safe_id: Some(safe),
                description: None,
            },
        )
        .await
        .expect("second payment");
    assert_eq!(second.invoice.remaining_amount, dec!(0));
    assert_eq!(second.invoice.payment_status, PaymentStatus::Paid);

    // Both payments were deposited into the safe
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(200));

    let payments = state
        .services
        .credit
        .list_payments(created.invoice.id)
        .await
        .expect("list payments");
    assert_eq!(payments.len(), 2);
}

#[tokio::test]
async fn overpayment_and_non_positive_amounts_are_rejected() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 5).await;
    let created = credit_invoice(&state, &user, product, None).await;

    let err = state
        .services
        .credit
        .record_payment(
            user.id,
            RecordPaymentRequest {
                invoice_id: created.invoice.id,
                amount: dec!(250),
                payment_method: "cash".to_string(),
                safe_id: None,
                description: None,
            },
        )
        .await
        .expect_err("overpayment must fail");
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    let err = state
        .services
        .credit
        .record_payment(
            user.id,
            RecordPaymentRequest {
                invoice_id: created.invoice.id,
                amount: dec!(0),
                payment_method: "cash".to_string(),
                safe_id: None,
                description: None,
            },
        )
        .await
        .expect_err("zero payment must fail");
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    // Remaining balance is untouched
    let unchanged = state
        .services
        .invoices
        .get(created.invoice.id)
        .await
        .expect("invoice");
    assert_eq!(unchanged.invoice.remaining_amount, dec!(200));
}

#[tokio::test]
async fn paying_a_settled_invoice_fails() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 5).await;
    let created = credit_invoice(&state, &user, product, None).await;

    state
        .services
        .credit
        .record_payment(
            user.id,
            RecordPaymentRequest {
                invoice_id: created.invoice.id,
                amount: dec!(200),
                payment_method: "cash".to_string(),
                safe_id: None,
                description: None,
            },
        )
        .await
        .expect("settle invoice");

    let err = state
        .services
        .credit
        .record_payment(
            user.id,
            RecordPaymentRequest {
                invoice_id: created.invoice.id,
                amount: dec!(1),
                payment_method: "cash".to_string(),
                safe_id: None,
                description: None,
            },
        )
        .await
        .expect_err("paying a paid invoice must fail");
    assert!(matches!(err, ServiceError::InvalidOperation(_)));
}

#[tokio::test]
async fn summary_tracks_outstanding_debt() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;

    let first = credit_invoice(&state, &user, product, None).await;
    let _second = credit_invoice(&state, &user, product, None).await;

    let summary = state.services.credit.summary().await.expect("summary");
    assert_eq!(summary.open_invoices, 2);
    assert_eq!(summary.outstanding_total, dec!(400));

    state
        .services
        .credit
        .record_payment(
            user.id,
            RecordPaymentRequest {
                invoice_id: first.invoice.id,
                amount: dec!(150),
                payment_method: "cash".to_string(),
                safe_id: None,
                description: None,
            },
        )
        .await
        .expect("payment");

    let summary = state.services.credit.summary().await.expect("summary");
    assert_eq!(summary.open_invoices, 2);
    assert_eq!(summary.outstanding_total, dec!(250));

    let (open, total) = state
        .services
        .credit
        .list_credit_invoices(1, 20)
        .await
        .expect("list credit invoices");
    assert_eq!(total, 2);
    assert!(open
        .iter()
        .all(|i| i.payment_status != PaymentStatus::Paid));
}
