use std::sync::Arc;

use axum::Router;

use crate::{handlers, AppState};

/// Versioned API surface, nested under `/api/v1`
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/products", handlers::products::routes())
        .nest("/inventory", handlers::inventory::routes())
        .nest("/invoices", handlers::invoices::routes())
        .nest("/credit", handlers::credit::routes())
        .nest("/safes", handlers::safes::routes())
        .nest("/suppliers", handlers::suppliers::routes())
}
