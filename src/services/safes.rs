use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::safe::{self, Entity as SafeEntity};
use crate::entities::safe_transaction::{self, Entity as SafeTransactionEntity, SafeTransactionType};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateSafeRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Code is required"))]
    pub code: String,
    pub parent_safe_id: Option<Uuid>,
}

/// One signed movement to append. Also the outbox payload for postings
/// deferred from the invoice/credit flows.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostTransactionRequest {
    pub safe_id: Uuid,
    pub tx_type: SafeTransactionType,
    pub amount_usd: Decimal,
    pub amount_lyd: Decimal,
    pub exchange_rate: Option<Decimal>,
    pub description: String,
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_by: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    pub from_safe_id: Uuid,
    pub to_safe_id: Uuid,
    #[serde(default)]
    pub amount_usd: Decimal,
    #[serde(default)]
    pub amount_lyd: Decimal,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
}

/// Cash registers and their append-only transaction ledger. The
/// denormalized balances on the safe row are adjusted in the same
/// transaction as every append; the ledger remains the source of truth.
#[derive(Clone)]
pub struct SafeService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl SafeService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: CreateSafeRequest) -> Result<safe::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let now = Utc::now();
        let active = safe::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            code: Set(request.code),
            parent_safe_id: Set(request.parent_safe_id),
            balance_usd: Set(Decimal::ZERO),
            balance_lyd: Set(Decimal::ZERO),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = active.insert(&*self.db).await?;
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<safe::Model, ServiceError> {
        SafeEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Safe {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<safe::Model>, ServiceError> {
        let safes = SafeEntity::find()
            .order_by_asc(safe::Column::Code)
            .all(&*self.db)
            .await?;
        Ok(safes)
    }

    /// Transaction history for one safe, newest first
    #[instrument(skip(self))]
    pub async fn list_transactions(
        &self,
        safe_id: Uuid,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<safe_transaction::Model>, u64), ServiceError> {
        let paginator = SafeTransactionEntity::find()
            .filter(safe_transaction::Column::SafeId.eq(safe_id))
            .order_by_desc(safe_transaction::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows, total))
    }

    /// Appends one movement and adjusts the cached balance atomically
    #[instrument(skip(self, request), fields(safe_id = %request.safe_id, tx_type = ?request.tx_type))]
    pub async fn post(
        &self,
        request: PostTransactionRequest,
    ) -> Result<safe_transaction::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let model = Self::post_with_conn(&txn, request).await?;
        txn.commit().await?;

        if let Err(e) = self
            .event_sender
            .send(Event::SafeTransactionPosted {
                safe_id: model.safe_id,
                transaction_id: model.id,
                tx_type: model.tx_type,
            })
            .await
        {
            warn!(error = %e, "failed to send safe transaction event");
        }

        Ok(model)
    }

    /// Posting primitive usable inside a caller-owned transaction
    pub async fn post_with_conn<C: ConnectionTrait>(
        conn: &C,
        request: PostTransactionRequest,
    ) -> Result<safe_transaction::Model, ServiceError> {
        if request.amount_usd < Decimal::ZERO || request.amount_lyd < Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Transaction amounts must not be negative".to_string(),
            ));
        }
        if request.amount_usd.is_zero() && request.amount_lyd.is_zero() {
            return Err(ServiceError::InvalidInput(
                "Transaction must move a non-zero amount".to_string(),
            ));
        }

        let safe = SafeEntity::find_by_id(request.safe_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Safe {} not found", request.safe_id))
            })?;
        if !safe.is_active {
            return Err(ServiceError::InvalidOperation(format!(
                "Safe {} is inactive",
                safe.code
            )));
        }

        let now = Utc::now();
        let row = safe_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            safe_id: Set(request.safe_id),
            tx_type: Set(request.tx_type),
            amount_usd: Set(request.amount_usd),
            amount_lyd: Set(request.amount_lyd),
            exchange_rate: Set(request.exchange_rate),
            description: Set(request.description),
            reference_type: Set(request.reference_type),
            reference_id: Set(request.reference_id),
            created_by: Set(request.created_by),
            created_at: Set(now),
        };
        let model = row.insert(conn).await?;

        let sign = model.tx_type.sign();
        SafeEntity::update_many()
            .col_expr(
                safe::Column::BalanceUsd,
                Expr::col(safe::Column::BalanceUsd).add(sign * model.amount_usd),
            )
            .col_expr(
                safe::Column::BalanceLyd,
                Expr::col(safe::Column::BalanceLyd).add(sign * model.amount_lyd),
            )
            .col_expr(safe::Column::UpdatedAt, Expr::value(now))
            .filter(safe::Column::Id.eq(request.safe_id))
            .exec(conn)
            .await?;

        Ok(model)
    }

    /// Moves money between two safes as a withdrawal/deposit pair sharing
    /// one reference id
    #[instrument(skip(self, request), fields(from = %request.from_safe_id, to = %request.to_safe_id))]
    pub async fn transfer(
        &self,
        created_by: Uuid,
        request: TransferRequest,
    ) -> Result<Uuid, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.from_safe_id == request.to_safe_id {
            return Err(ServiceError::InvalidOperation(
                "Cannot transfer a safe into itself".to_string(),
            ));
        }

        let reference_id = Uuid::new_v4();
        let txn = self.db.begin().await?;

        Self::post_with_conn(
            &txn,
            PostTransactionRequest {
                safe_id: request.from_safe_id,
                tx_type: SafeTransactionType::Withdrawal,
                amount_usd: request.amount_usd,
                amount_lyd: request.amount_lyd,
                exchange_rate: None,
                description: request.description.clone(),
                reference_type: Some("safe_transfer".to_string()),
                reference_id: Some(reference_id),
                created_by,
            },
        )
        .await?;

        Self::post_with_conn(
            &txn,
            PostTransactionRequest {
                safe_id: request.to_safe_id,
                tx_type: SafeTransactionType::Deposit,
                amount_usd: request.amount_usd,
                amount_lyd: request.amount_lyd,
                exchange_rate: None,
                description: request.description,
                reference_type: Some("safe_transfer".to_string()),
                reference_id: Some(reference_id),
                created_by,
            },
        )
        .await?;

        txn.commit().await?;
        Ok(reference_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn withdrawal_sign_is_negative() {
        assert_eq!(SafeTransactionType::Withdrawal.sign(), dec!(-1));
        assert_eq!(SafeTransactionType::Deposit.sign(), dec!(1));
        assert_eq!(SafeTransactionType::Transfer.sign(), dec!(1));
    }
}
