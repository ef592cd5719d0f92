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
    errors::ApiError,
    handlers::common::{
        map_service_error, success_response, validate_input, PaginatedResponse, PaginationParams,
    },
    services::credit::RecordPaymentRequest,
    AppState,
};

async fn record_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let response = state
        .services
        .credit
        .record_payment(user.id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(response))
}

async fn summary(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .services
        .credit
        .summary()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(summary))
}

async fn list_credit_invoices(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = params.clamped();
    let (invoices, total) = state
        .services
        .credit
        .list_credit_invoices(page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::new(
        invoices, page, per_page, total,
    )))
}

async fn list_invoice_payments(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payments = state
        .services
        .credit
        .list_payments(invoice_id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(payments))
}

async fn supplier_debts(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let debts = state
        .services
        .suppliers
        .list_debts()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(debts))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/payments", post(record_payment))
        .route("/summary", get(summary))
        .route("/invoices", get(list_credit_invoices))
        .route("/invoices/:id/payments", get(list_invoice_payments))
        .route("/supplier-debts", get(supplier_debts))
}
