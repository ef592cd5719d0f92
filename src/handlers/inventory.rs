use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::Branch,
    errors::ApiError,
    handlers::common::{map_service_error, success_response, validate_input, PaginationParams},
    services::inventory::UpsertInventoryRequest,
    AppState,
};

async fn upsert_inventory(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<UpsertInventoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let row = state
        .services
        .inventory
        .upsert(payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(row))
}

async fn list_inventory(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = params.clamped();
    let rows = state
        .services
        .inventory
        .list(page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(rows))
}

async fn list_low_stock(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let rows = state
        .services
        .inventory
        .list_low_stock()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(rows))
}

async fn get_level(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((product_id, branch)): Path<(Uuid, Branch)>,
) -> Result<impl IntoResponse, ApiError> {
    let row = state
        .services
        .inventory
        .get(product_id, branch)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No stock row for {} at {:?}", product_id, branch))
        })?;
    Ok(success_response(row))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(upsert_inventory).get(list_inventory))
        .route("/low-stock", get(list_low_stock))
        .route("/:product_id/:branch", get(get_level))
}
