use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::common::{
        created_response, map_service_error, success_response, validate_input, PaginatedResponse,
        PaginationParams,
    },
    services::invoices::{
        CreateInvoiceRequest, InvoiceWithItems, ReturnOutcome, ReturnRequest, UpdateInvoiceRequest,
    },
    AppState,
};

#[derive(Debug, Serialize, ToSchema)]
struct ReturnResponse {
    deleted: bool,
    refund: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    invoice: Option<InvoiceWithItems>,
}

async fn create_invoice(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;
    let invoice = state
        .services
        .invoices
        .create(&user, payload)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(invoice))
}

async fn get_invoice(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice = state
        .services
        .invoices
        .get(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(invoice))
}

async fn list_invoices(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ApiError> {
    let (page, per_page) = params.clamped();
    let (invoices, total) = state
        .services
        .invoices
        .list(page, per_page)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(PaginatedResponse::new(
        invoices, page, per_page, total,
    )))
}

async fn update_invoice(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let invoice = state
        .services
        .invoices
        .update(&user, id, payload)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(invoice))
}

async fn delete_invoice(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .invoices
        .delete(&user, id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({"deleted": true, "id": id})))
}

async fn return_invoice(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReturnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .services
        .invoices
        .return_items(&user, id, payload)
        .await
        .map_err(map_service_error)?;

    let body = match outcome {
        ReturnOutcome::Deleted { refund, .. } => ReturnResponse {
            deleted: true,
            refund,
            invoice: None,
        },
        ReturnOutcome::Updated { invoice, refund } => ReturnResponse {
            deleted: false,
            refund,
            invoice: Some(*invoice),
        },
    };
    Ok(success_response(body))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_invoice).get(list_invoices))
        .route(
            "/:id",
            get(get_invoice).put(update_invoice).delete(delete_invoice),
        )
        .route("/:id/return", post(return_invoice))
}
