use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::common::{created_response, map_service_error, success_response, validate_input},
    services::suppliers::{CreateSupplierRequest, SupplierMovementRequest},
    AppState,
};

async fn create_supplier(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(payload): Json<CreateSupplierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .create(payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(supplier))
}

async fn list_suppliers(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let suppliers = state
        .services
        .suppliers
        .list()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(suppliers))
}

async fn get_supplier(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let supplier = state
        .services
        .suppliers
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(supplier))
}

async fn record_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SupplierMovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .record_payment(user.id, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(supplier))
}

async fn record_purchase(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<SupplierMovementRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .record_purchase(user.id, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(supplier))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_supplier).get(list_suppliers))
        .route("/:id", get(get_supplier))
        .route("/:id/payments", post(record_payment))
        .route("/:id/purchases", post(record_purchase))
}
