#![allow(dead_code)]

use std::sync::Arc;

use partshub_api::auth::{issue_token, AuthUser, Role};
use partshub_api::config::AppConfig;
use partshub_api::entities::Branch;
use partshub_api::services::inventory::UpsertInventoryRequest;
use partshub_api::AppState;
use rust_decimal::Decimal;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration_test_secret_key_with_plenty_of_length";

/// Fresh application state over an in-memory sqlite database with all
/// migrations applied.
pub async fn test_state() -> Arc<AppState> {
    let cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        TEST_JWT_SECRET.to_string(),
        "test".to_string(),
    );
    AppState::bootstrap(cfg).await.expect("bootstrap test state")
}

pub fn clerk() -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        name: Some("Test Clerk".to_string()),
        role: Role::Clerk,
    }
}

pub fn owner() -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        name: Some("Test Owner".to_string()),
        role: Role::Owner,
    }
}

pub fn bearer_for(user: &AuthUser) -> String {
    let token = issue_token(TEST_JWT_SECRET, user.id, user.name.clone(), user.role, 3600)
        .expect("issue test token");
    format!("Bearer {}", token)
}

/// Seeds a stock row and returns its product id
pub async fn seed_stock(state: &AppState, branch: Branch, quantity: i32) -> Uuid {
    seed_stock_with_threshold(state, branch, quantity, 0).await
}

pub async fn seed_stock_with_threshold(
    state: &AppState,
    branch: Branch,
    quantity: i32,
    threshold: i32,
) -> Uuid {
    let product_id = Uuid::new_v4();
    state
        .services
        .inventory
        .upsert(UpsertInventoryRequest {
            product_id,
            branch,
            quantity,
            low_stock_threshold: threshold,
        })
        .await
        .expect("seed stock");
    product_id
}

pub async fn stock_level(state: &AppState, product_id: Uuid, branch: Branch) -> i32 {
    state
        .services
        .inventory
        .get(product_id, branch)
        .await
        .expect("read stock")
        .map(|row| row.quantity)
        .unwrap_or(0)
}

/// Creates a safe and returns its id
pub async fn seed_safe(state: &AppState, code: &str) -> Uuid {
    state
        .services
        .safes
        .create(partshub_api::services::safes::CreateSafeRequest {
            name: format!("Safe {}", code),
            code: code.to_string(),
            parent_safe_id: None,
        })
        .await
        .expect("seed safe")
        .id
}

pub async fn safe_balance_lyd(state: &AppState, safe_id: Uuid) -> Decimal {
    state
        .services
        .safes
        .get(safe_id)
        .await
        .expect("read safe")
        .balance_lyd
}

/// Runs the outbox to completion so deferred safe postings and audit
/// records land before assertions.
pub async fn drain_outbox(state: &AppState) {
    let executor = state.outbox_executor();
    loop {
        let processed = partshub_api::events::outbox::drain_once(&state.db, &executor, 50)
            .await
            .expect("drain outbox");
        if processed == 0 {
            break;
        }
    }
}
