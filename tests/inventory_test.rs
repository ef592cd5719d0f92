mod common;

use common::*;
use partshub_api::entities::Branch;
use partshub_api::errors::ServiceError;
use partshub_api::services::inventory::UpsertInventoryRequest;
use uuid::Uuid;

#[tokio::test]
async fn upsert_replaces_the_existing_row() {
    let state = test_state().await;
    let product = seed_stock(&state, Branch::BranchA, 5).await;

    let row = state
        .services
        .inventory
        .upsert(UpsertInventoryRequest {
            product_id: product,
            branch: Branch::BranchA,
            quantity: 12,
            low_stock_threshold: 3,
        })
        .await
        .expect("upsert");
    assert_eq!(row.quantity, 12);
    assert_eq!(row.low_stock_threshold, 3);

    // Same pair again: still one row per (product, branch)
    let listing = state
        .services
        .inventory
        .list(1, 50)
        .await
        .expect("list inventory");
    assert_eq!(
        listing
            .rows
            .iter()
            .filter(|r| r.product_id == product)
            .count(),
        1
    );

    // The other branch is independent
    let other = state
        .services
        .inventory
        .get(product, Branch::BranchB)
        .await
        .expect("get");
    assert!(other.is_none());
}

#[tokio::test]
async fn negative_quantities_are_rejected() {
    let state = test_state().await;

    let err = state
        .services
        .inventory
        .upsert(UpsertInventoryRequest {
            product_id: Uuid::new_v4(),
            branch: Branch::BranchA,
            quantity: -1,
            low_stock_threshold: 0,
        })
        .await
        .expect_err("negative quantity must fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn low_stock_listing_catches_rows_at_or_below_threshold() {
    let state = test_state().await;
    let low = seed_stock_with_threshold(&state, Branch::BranchA, 2, 5).await;
    let exact = seed_stock_with_threshold(&state, Branch::BranchA, 5, 5).await;
    let healthy = seed_stock_with_threshold(&state, Branch::BranchB, 50, 5).await;

    let rows = state
        .services
        .inventory
        .list_low_stock()
        .await
        .expect("low stock");
    let ids: Vec<_> = rows.iter().map(|r| r.product_id).collect();
    assert!(ids.contains(&low));
    assert!(ids.contains(&exact));
    assert!(!ids.contains(&healthy));
}
