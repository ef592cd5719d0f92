use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, success_response, validate_input, PaginatedResponse,
        PaginationParams,
    },
    services::safes::{CreateSafeRequest, TransferRequest},
    AppState,
};

async fn create_safe(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<CreateSafeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let safe = state
        .services
        .safes
        .create(payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(safe))
}

async fn list_safes(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let safes = state
        .services
        .safes
        .list()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(safes))
}

async fn get_safe(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let safe = state
        .services
        .safes
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(safe))
}

async fn list_safe_transactions(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = params.clamped();
    let (rows, total) = state
        .services
        .safes
        .list_transactions(id, page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::new(
        rows, page, per_page, total,
    )))
}

async fn transfer(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let reference_id = state
        .services
        .safes
        .transfer(user.id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({"reference_id": reference_id})))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_safe).get(list_safes))
        .route("/transfer", post(transfer))
        .route("/:id", get(get_safe))
        .route("/:id/transactions", get(list_safe_transactions))
}
