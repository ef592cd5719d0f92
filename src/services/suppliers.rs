use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::supplier::{self, Entity as SupplierEntity};
use crate::entities::SafeTransactionType;
use crate::errors::ServiceError;
use crate::events::outbox;
use crate::services::audit::AuditRecord;
use crate::services::safes::PostTransactionRequest;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSupplierRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "LYD".to_string()
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SupplierMovementRequest {
    pub amount: Decimal,
    pub description: Option<String>,
    /// Safe the payment is drawn from; purchases ignore this
    pub safe_id: Option<Uuid>,
}

/// Suppliers and their running payable. Purchases on credit grow
/// balance_owed; payments shrink it and may draw from a safe.
#[derive(Clone)]
pub struct SupplierService {
    db: Arc<DbPool>,
}

impl SupplierService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(
        &self,
        request: CreateSupplierRequest,
    ) -> Result<supplier::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let now = Utc::now();
        let active = supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            code: Set(request.code),
            balance_owed: Set(Decimal::ZERO),
            currency: Set(request.currency),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = active.insert(&*self.db).await?;
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<supplier::Model, ServiceError> {
        SupplierEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<supplier::Model>, ServiceError> {
        let suppliers = SupplierEntity::find()
            .order_by_asc(supplier::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(suppliers)
    }

    /// Suppliers we still owe money to, largest debt first
    #[instrument(skip(self))]
    pub async fn list_debts(&self) -> Result<Vec<supplier::Model>, ServiceError> {
        let suppliers = SupplierEntity::find()
            .filter(supplier::Column::BalanceOwed.gt(Decimal::ZERO))
            .order_by_desc(supplier::Column::BalanceOwed)
            .all(&*self.db)
            .await?;
        Ok(suppliers)
    }

    /// Credit purchase: grows the payable
    #[instrument(skip(self, request), fields(supplier_id = %id))]
    pub async fn record_purchase(
        &self,
        created_by: Uuid,
        id: Uuid,
        request: SupplierMovementRequest,
    ) -> Result<supplier::Model, ServiceError> {
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Purchase amount must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let existing = SupplierEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", id)))?;

        let new_balance = existing.balance_owed + request.amount;
        let mut active: supplier::ActiveModel = existing.into();
        active.balance_owed = Set(new_balance);
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;

        outbox::enqueue_audit(
            &txn,
            "supplier",
            Some(id),
            &AuditRecord {
                user_id: created_by,
                action: "supplier_purchase".to_string(),
                entity_type: "supplier".to_string(),
                entity_id: Some(id),
                details: Some(serde_json::json!({
                    "amount": request.amount,
                    "description": request.description,
                })),
            },
        )
        .await?;

        txn.commit().await?;
        info!(supplier_id = %id, amount = %request.amount, "supplier purchase recorded");
        Ok(model)
    }

    /// Payment to the supplier: shrinks the payable, optionally drawing
    /// the cash from a safe (posted via the outbox)
    #[instrument(skip(self, request), fields(supplier_id = %id))]
    pub async fn record_payment(
        &self,
        created_by: Uuid,
        id: Uuid,
        request: SupplierMovementRequest,
    ) -> Result<supplier::Model, ServiceError> {
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Payment amount must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let existing = SupplierEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Supplier {} not found", id)))?;

        if request.amount > existing.balance_owed {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment of {} exceeds balance owed {}",
                request.amount, existing.balance_owed
            )));
        }

        let new_balance = existing.balance_owed - request.amount;
        let supplier_name = existing.name.clone();
        let mut active: supplier::ActiveModel = existing.into();
        active.balance_owed = Set(new_balance);
        active.updated_at = Set(Utc::now());
        let model = active.update(&txn).await?;

        if let Some(safe_id) = request.safe_id {
            outbox::enqueue_safe_posting(
                &txn,
                "supplier",
                id,
                &PostTransactionRequest {
                    safe_id,
                    tx_type: SafeTransactionType::Withdrawal,
                    amount_usd: Decimal::ZERO,
                    amount_lyd: request.amount,
                    exchange_rate: None,
                    description: format!("Payment to supplier {}", supplier_name),
                    reference_type: Some("supplier_payment".to_string()),
                    reference_id: Some(id),
                    created_by,
                },
            )
            .await?;
        }

        outbox::enqueue_audit(
            &txn,
            "supplier",
            Some(id),
            &AuditRecord {
                user_id: created_by,
                action: "supplier_payment".to_string(),
                entity_type: "supplier".to_string(),
                entity_id: Some(id),
                details: Some(serde_json::json!({
                    "amount": request.amount,
                    "description": request.description,
                })),
            },
        )
        .await?;

        txn.commit().await?;
        info!(supplier_id = %id, amount = %request.amount, "supplier payment recorded");
        Ok(model)
    }
}
