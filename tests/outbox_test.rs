mod common;

use common::*;
use partshub_api::entities::outbox_event::{self, OutboxStatus};
use partshub_api::entities::Branch;
use partshub_api::services::invoices::{CreateInvoiceRequest, InvoiceItemInput};
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use uuid::Uuid;

#[tokio::test]
async fn a_broken_safe_posting_never_touches_the_sale() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;
    // Safe id that does not exist: the posting can never succeed
    let ghost_safe = Uuid::new_v4();

    let created = state
        .services
        .invoices
        .create(
            &user,
            CreateInvoiceRequest {
                customer_name: "Omar".to_string(),
                branch: Branch::BranchA,
                items: vec![InvoiceItemInput {
                    product_id: product,
                    product_name: "Brake Pad".to_string(),
                    quantity: 2,
                    unit_price: dec!(50),
                }],
                discount_type: None,
                discount_value: None,
                service_amount: None,
                safe_id: Some(ghost_safe),
                payment_type: None,
            },
        )
        .await
        .expect("sale succeeds regardless of the doomed posting");

    drain_outbox(&state).await;

    // The sale stands untouched
    let invoice = state
        .services
        .invoices
        .get(created.invoice.id)
        .await
        .expect("invoice still present");
    assert_eq!(invoice.invoice.total_amount, dec!(100));
    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 8);

    // The posting row was attempted and rescheduled, not silently dropped
    let rows = outbox_event::Entity::find()
        .all(&*state.db)
        .await
        .expect("read outbox");
    let posting = rows
        .iter()
        .find(|r| r.event_type == "safe.post_transaction")
        .expect("posting row exists");
    assert!(posting.attempts >= 1);
    assert_eq!(posting.status, OutboxStatus::Pending);
    assert!(posting.last_error.is_some());
}

#[tokio::test]
async fn delivered_effects_are_marked_and_not_rerun() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;
    let safe = seed_safe(&state, "MAIN").await;

    state
        .services
        .invoices
        .create(
            &user,
            CreateInvoiceRequest {
                customer_name: "Omar".to_string(),
                branch: Branch::BranchA,
                items: vec![InvoiceItemInput {
                    product_id: product,
                    product_name: "Brake Pad".to_string(),
                    quantity: 1,
                    unit_price: dec!(50),
                }],
                discount_type: None,
                discount_value: None,
                service_amount: None,
                safe_id: Some(safe),
                payment_type: None,
            },
        )
        .await
        .expect("create invoice");

    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(50));

    // A second drain finds nothing to do; the deposit is not doubled
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(50));

    let rows = outbox_event::Entity::find()
        .all(&*state.db)
        .await
        .expect("read outbox");
    assert!(rows
        .iter()
        .all(|r| r.status == OutboxStatus::Delivered && r.processed_at.is_some()));
}

#[tokio::test]
async fn audit_records_land_through_the_outbox() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;

    state
        .services
        .invoices
        .create(
            &user,
            CreateInvoiceRequest {
                customer_name: "Omar".to_string(),
                branch: Branch::BranchA,
                items: vec![InvoiceItemInput {
                    product_id: product,
                    product_name: "Brake Pad".to_string(),
                    quantity: 1,
                    unit_price: dec!(50),
                }],
                discount_type: None,
                discount_value: None,
                service_amount: None,
                safe_id: None,
                payment_type: None,
            },
        )
        .await
        .expect("create invoice");

    drain_outbox(&state).await;

    let entries = state
        .services
        .audit
        .recent(10)
        .await
        .expect("read audit log");
    // One entry for the invoice, one per line item
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().any(|e| e.action == "invoice_created"));
    assert!(entries.iter().any(|e| e.action == "invoice_item_sold"));
    assert!(entries.iter().all(|e| e.user_id == user.id));
}
