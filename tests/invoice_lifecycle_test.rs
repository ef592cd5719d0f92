mod common;

use common::*;
use partshub_api::entities::{Branch, DiscountType, PaymentStatus, SafeTransactionType};
use partshub_api::errors::ServiceError;
use partshub_api::services::invoices::{
    CreateInvoiceRequest, InvoiceItemInput, ReturnItemInput, ReturnOutcome, ReturnRequest,
    UpdateInvoiceRequest,
};
use rust_decimal_macros::dec;
use uuid::Uuid;

fn item(product_id: Uuid, name: &str, qty: i32, price: rust_decimal::Decimal) -> InvoiceItemInput {
    InvoiceItemInput {
        product_id,
        product_name: name.to_string(),
        quantity: qty,
        unit_price: price,
    }
}

fn basic_request(
    product_id: Uuid,
    safe_id: Option<Uuid>,
    payment_type: Option<partshub_api::services::invoices::PaymentType>,
) -> CreateInvoiceRequest {
    CreateInvoiceRequest {
        customer_name: "Omar".to_string(),
        branch: Branch::BranchA,
        items: vec![item(product_id, "Brake Pad", 2, dec!(50))],
        discount_type: Some(DiscountType::Amount),
        discount_value: Some(dec!(10)),
        service_amount: None,
        safe_id,
        payment_type,
    }
}

#[tokio::test]
async fn create_computes_totals_and_decrements_stock() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;

    let created = state
        .services
        .invoices
        .create(&user, basic_request(product, None, None))
        .await
        .expect("create invoice");

    assert_eq!(created.invoice.subtotal, dec!(100));
    assert_eq!(created.invoice.discount_amount, dec!(10));
    assert_eq!(created.invoice.total_amount, dec!(90));
    assert_eq!(created.invoice.payment_status, PaymentStatus::Paid);
    assert_eq!(created.invoice.paid_amount, dec!(90));
    assert_eq!(created.invoice.remaining_amount, dec!(0));
    assert_eq!(created.invoice.invoice_number, "INV-000001");
    assert_eq!(created.items.len(), 1);
    assert_eq!(created.items[0].line_total, dec!(100));

    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 8);
}

#[tokio::test]
async fn invoice_numbers_increase_monotonically() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;

    let first = state
        .services
        .invoices
        .create(&user, basic_request(product, None, None))
        .await
        .expect("first invoice");
    let second = state
        .services
        .invoices
        .create(&user, basic_request(product, None, None))
        .await
        .expect("second invoice");

    assert_eq!(first.invoice.invoice_number, "INV-000001");
    assert_eq!(second.invoice.invoice_number, "INV-000002");
    assert!(second.invoice.invoice_seq > first.invoice.invoice_seq);
}

#[tokio::test]
async fn insufficient_stock_fails_without_any_mutation() {
    let state = test_state().await;
    let user = clerk();
    let plentiful = seed_stock(&state, Branch::BranchA, 100).await;
    let scarce = seed_stock(&state, Branch::BranchA, 1).await;

    let request = CreateInvoiceRequest {
        customer_name: "Omar".to_string(),
        branch: Branch::BranchA,
        items: vec![
            item(plentiful, "Oil Filter", 3, dec!(20)),
            item(scarce, "Head Gasket", 2, dec!(75)),
        ],
        discount_type: None,
        discount_value: None,
        service_amount: None,
        safe_id: None,
        payment_type: None,
    };

    let err = state
        .services
        .invoices
        .create(&user, request)
        .await
        .expect_err("create must fail");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // The whole create rolled back, including the first line's decrement
    assert_eq!(stock_level(&state, plentiful, Branch::BranchA).await, 100);
    assert_eq!(stock_level(&state, scarce, Branch::BranchA).await, 1);

    let (invoices, total) = state
        .services
        .invoices
        .list(1, 20)
        .await
        .expect("list invoices");
    assert_eq!(total, 0);
    assert!(invoices.is_empty());
}

#[tokio::test]
async fn cash_sale_with_safe_posts_a_deposit_through_the_outbox() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;
    let safe = seed_safe(&state, "MAIN").await;

    state
        .services
        .invoices
        .create(&user, basic_request(product, Some(safe), None))
        .await
        .expect("create invoice");

    // Nothing posted until the outbox drains
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(0));
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(90));

    let (txs, _) = state
        .services
        .safes
        .list_transactions(safe, 1, 20)
        .await
        .expect("list transactions");
    assert_eq!(txs.len(), 1);
    assert_eq!(txs[0].tx_type, SafeTransactionType::Deposit);
    assert_eq!(txs[0].amount_lyd, dec!(90));
    assert_eq!(txs[0].reference_type.as_deref(), Some("invoice"));
}

#[tokio::test]
async fn full_return_deletes_the_invoice_and_restores_everything() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;
    let safe = seed_safe(&state, "MAIN").await;

    let created = state
        .services
        .invoices
        .create(&user, basic_request(product, Some(safe), None))
        .await
        .expect("create invoice");
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(90));
    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 8);

    let outcome = state
        .services
        .invoices
        .return_items(
            &user,
            created.invoice.id,
            ReturnRequest {
                return_items: vec![ReturnItemInput {
                    item_id: created.items[0].id,
                    quantity: 2,
                }],
            },
        )
        .await
        .expect("full return");

    match outcome {
        ReturnOutcome::Deleted { refund, .. } => assert_eq!(refund, dec!(90)),
        other => panic!("expected deletion, got {:?}", other),
    }

    // Round trip: stock and safe end where they started
    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 10);
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(0));

    let err = state
        .services
        .invoices
        .get(created.invoice.id)
        .await
        .expect_err("invoice must be gone");
    assert!(matches!(err, ServiceError::NotFound(_)));
}

#[tokio::test]
async fn partial_return_reduces_totals_and_restocks() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;

    let created = state
        .services
        .invoices
        .create(&user, basic_request(product, None, None))
        .await
        .expect("create invoice");

    let outcome = state
        .services
        .invoices
        .return_items(
            &user,
            created.invoice.id,
            ReturnRequest {
                return_items: vec![ReturnItemInput {
                    item_id: created.items[0].id,
                    quantity: 1,
                }],
            },
        )
        .await
        .expect("partial return");

    match outcome {
        ReturnOutcome::Updated { invoice, refund } => {
            // 1 x 50 remains; the 10 amount discount still applies in full
            assert_eq!(invoice.invoice.subtotal, dec!(50));
            assert_eq!(invoice.invoice.total_amount, dec!(40));
            assert_eq!(refund, dec!(50));
            assert_eq!(invoice.items.len(), 1);
            assert_eq!(invoice.items[0].quantity, 1);
        }
        other => panic!("expected update, got {:?}", other),
    }

    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 9);
}

#[tokio::test]
async fn over_return_is_rejected_without_mutation() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;

    let created = state
        .services
        .invoices
        .create(&user, basic_request(product, None, None))
        .await
        .expect("create invoice");

    let err = state
        .services
        .invoices
        .return_items(
            &user,
            created.invoice.id,
            ReturnRequest {
                return_items: vec![ReturnItemInput {
                    item_id: created.items[0].id,
                    quantity: 3,
                }],
            },
        )
        .await
        .expect_err("over-return must fail");
    assert!(matches!(err, ServiceError::InvalidOperation(_)));

    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 8);
    let unchanged = state
        .services
        .invoices
        .get(created.invoice.id)
        .await
        .expect("invoice still there");
    assert_eq!(unchanged.invoice.total_amount, dec!(90));
    assert_eq!(unchanged.items[0].quantity, 2);
}

#[tokio::test]
async fn edit_rejects_quantity_growth_beyond_stock() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 3).await;

    let created = state
        .services
        .invoices
        .create(
            &user,
            CreateInvoiceRequest {
                customer_name: "Omar".to_string(),
                branch: Branch::BranchA,
                items: vec![item(product, "Brake Pad", 2, dec!(50))],
                discount_type: None,
                discount_value: None,
                service_amount: None,
                safe_id: None,
                payment_type: None,
            },
        )
        .await
        .expect("create invoice");
    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 1);

    // 2 sold + 1 on the shelf: asking for 4 must fail and change nothing
    let err = state
        .services
        .invoices
        .update(
            &user,
            created.invoice.id,
            UpdateInvoiceRequest {
                customer_name: None,
                branch: None,
                items: Some(vec![item(product, "Brake Pad", 4, dec!(50))]),
            },
        )
        .await
        .expect_err("edit must fail");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 1);

    // Growing to 3 consumes the remaining shelf stock
    let updated = state
        .services
        .invoices
        .update(
            &user,
            created.invoice.id,
            UpdateInvoiceRequest {
                customer_name: None,
                branch: None,
                items: Some(vec![item(product, "Brake Pad", 3, dec!(50))]),
            },
        )
        .await
        .expect("edit succeeds");
    assert_eq!(updated.invoice.total_amount, dec!(150));
    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 0);
}

#[tokio::test]
async fn edit_posts_a_signed_adjustment_when_the_total_moves() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;
    let safe = seed_safe(&state, "MAIN").await;

    let created = state
        .services
        .invoices
        .create(&user, basic_request(product, Some(safe), None))
        .await
        .expect("create invoice");
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(90));

    // Drop to one unit: total falls 90 -> 40, so 50 is withdrawn
    state
        .services
        .invoices
        .update(
            &user,
            created.invoice.id,
            UpdateInvoiceRequest {
                customer_name: None,
                branch: None,
                items: Some(vec![item(product, "Brake Pad", 1, dec!(50))]),
            },
        )
        .await
        .expect("edit invoice");
    drain_outbox(&state).await;

    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(40));
    let (txs, _) = state
        .services
        .safes
        .list_transactions(safe, 1, 20)
        .await
        .expect("list transactions");
    assert!(txs
        .iter()
        .any(|t| t.tx_type == SafeTransactionType::Withdrawal
            && t.amount_lyd == dec!(50)
            && t.reference_type.as_deref() == Some("invoice_adjustment")));
}

#[tokio::test]
async fn edit_moves_stock_to_the_target_branch() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;
    // Same product stocked at the other branch
    state
        .services
        .inventory
        .upsert(partshub_api::services::inventory::UpsertInventoryRequest {
            product_id: product,
            branch: Branch::BranchB,
            quantity: 5,
            low_stock_threshold: 0,
        })
        .await
        .expect("seed branch b");

    let created = state
        .services
        .invoices
        .create(&user, basic_request(product, None, None))
        .await
        .expect("create invoice");
    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 8);

    let updated = state
        .services
        .invoices
        .update(
            &user,
            created.invoice.id,
            UpdateInvoiceRequest {
                customer_name: None,
                branch: Some(Branch::BranchB),
                items: None,
            },
        )
        .await
        .expect("move branch");
    assert_eq!(updated.invoice.branch, Branch::BranchB);

    // BranchA gets its units back; BranchB now carries the sale
    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 10);
    assert_eq!(stock_level(&state, product, Branch::BranchB).await, 3);
}

#[tokio::test]
async fn only_the_author_or_an_owner_may_edit_or_delete() {
    let state = test_state().await;
    let author = clerk();
    let other_clerk = clerk();
    let boss = owner();
    let product = seed_stock(&state, Branch::BranchA, 10).await;

    let created = state
        .services
        .invoices
        .create(&author, basic_request(product, None, None))
        .await
        .expect("create invoice");

    let err = state
        .services
        .invoices
        .update(
            &other_clerk,
            created.invoice.id,
            UpdateInvoiceRequest {
                customer_name: Some("Hacked".to_string()),
                branch: None,
                items: None,
            },
        )
        .await
        .expect_err("stranger edit must fail");
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let err = state
        .services
        .invoices
        .delete(&other_clerk, created.invoice.id)
        .await
        .expect_err("stranger delete must fail");
    assert!(matches!(err, ServiceError::Forbidden(_)));

    state
        .services
        .invoices
        .delete(&boss, created.invoice.id)
        .await
        .expect("owner delete succeeds");
}

#[tokio::test]
async fn delete_reverses_stock_and_the_safe_deposit() {
    let state = test_state().await;
    let user = clerk();
    let product = seed_stock(&state, Branch::BranchA, 10).await;
    let safe = seed_safe(&state, "MAIN").await;

    let created = state
        .services
        .invoices
        .create(&user, basic_request(product, Some(safe), None))
        .await
        .expect("create invoice");
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(90));

    state
        .services
        .invoices
        .delete(&user, created.invoice.id)
        .await
        .expect("delete invoice");

    assert_eq!(stock_level(&state, product, Branch::BranchA).await, 10);
    drain_outbox(&state).await;
    assert_eq!(safe_balance_lyd(&state, safe).await, dec!(0));
}
