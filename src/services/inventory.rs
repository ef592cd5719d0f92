use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::branch_inventory::{self, Branch, Entity as InventoryEntity};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpsertInventoryRequest {
    pub product_id: Uuid,
    pub branch: Branch,
    #[validate(range(min = 0, message = "Quantity must not be negative"))]
    pub quantity: i32,
    #[validate(range(min = 0, message = "Threshold must not be negative"))]
    pub low_stock_threshold: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryListResponse {
    pub rows: Vec<branch_inventory::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Per-(product, branch) stock counters. The selling path never goes
/// through `upsert`; it uses the conditional `try_decrement` so the counter
/// cannot be driven negative under concurrent sales.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Creates or replaces the (product, branch) row. Manual stock edits
    /// and receiving go through here.
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        request: UpsertInventoryRequest,
    ) -> Result<branch_inventory::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let db = &*self.db;
        let now = Utc::now();

        let existing = InventoryEntity::find()
            .filter(branch_inventory::Column::ProductId.eq(request.product_id))
            .filter(branch_inventory::Column::Branch.eq(request.branch))
            .one(db)
            .await?;

        let model = match existing {
            Some(row) => {
                let mut active: branch_inventory::ActiveModel = row.into();
                active.quantity = Set(request.quantity);
                active.low_stock_threshold = Set(request.low_stock_threshold);
                active.updated_at = Set(now);
                active.update(db).await?
            }
            None => {
                let active = branch_inventory::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    product_id: Set(request.product_id),
                    branch: Set(request.branch),
                    quantity: Set(request.quantity),
                    low_stock_threshold: Set(request.low_stock_threshold),
                    updated_at: Set(now),
                };
                active.insert(db).await?
            }
        };

        if let Err(e) = self
            .event_sender
            .send(Event::InventoryUpserted {
                product_id: model.product_id,
                branch: model.branch,
                quantity: model.quantity,
            })
            .await
        {
            warn!(error = %e, "failed to send inventory upserted event");
        }

        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get(
        &self,
        product_id: Uuid,
        branch: Branch,
    ) -> Result<Option<branch_inventory::Model>, ServiceError> {
        Self::level(&*self.db, product_id, branch).await
    }

    /// Lists stock rows with pagination
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<InventoryListResponse, ServiceError> {
        let paginator = InventoryEntity::find().paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(InventoryListResponse {
            rows,
            total,
            page,
            per_page,
        })
    }

    /// Rows sitting at or below their alert threshold
    #[instrument(skip(self))]
    pub async fn list_low_stock(&self) -> Result<Vec<branch_inventory::Model>, ServiceError> {
        let rows = InventoryEntity::find()
            .filter(
                Expr::col(branch_inventory::Column::Quantity)
                    .lte(Expr::col(branch_inventory::Column::LowStockThreshold)),
            )
            .all(&*self.db)
            .await?;
        Ok(rows)
    }

    /// Current stock row inside an arbitrary connection/transaction
    pub async fn level<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        branch: Branch,
    ) -> Result<Option<branch_inventory::Model>, ServiceError> {
        let row = InventoryEntity::find()
            .filter(branch_inventory::Column::ProductId.eq(product_id))
            .filter(branch_inventory::Column::Branch.eq(branch))
            .one(conn)
            .await?;
        Ok(row)
    }

    /// Atomic conditional decrement: `quantity = quantity - n` only where
    /// `quantity >= n`. Zero rows affected means the sale must not proceed;
    /// the caller aborts its transaction before anything becomes visible.
    pub async fn try_decrement<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        branch: Branch,
        quantity: i32,
        product_name: &str,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "Quantity for {} must be positive",
                product_name
            )));
        }

        let result = InventoryEntity::update_many()
            .col_expr(
                branch_inventory::Column::Quantity,
                Expr::col(branch_inventory::Column::Quantity).sub(quantity),
            )
            .col_expr(
                branch_inventory::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(branch_inventory::Column::ProductId.eq(product_id))
            .filter(branch_inventory::Column::Branch.eq(branch))
            .filter(branch_inventory::Column::Quantity.gte(quantity))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::InsufficientStock(format!(
                "Not enough stock of {} at {:?} to sell {}",
                product_name, branch, quantity
            )));
        }
        Ok(())
    }

    /// Adds quantity back to a branch, creating the row if it vanished.
    /// Reversal primitive for edits, deletions and returns.
    pub async fn restock<C: ConnectionTrait>(
        conn: &C,
        product_id: Uuid,
        branch: Branch,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Ok(());
        }

        let result = InventoryEntity::update_many()
            .col_expr(
                branch_inventory::Column::Quantity,
                Expr::col(branch_inventory::Column::Quantity).add(quantity),
            )
            .col_expr(
                branch_inventory::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(branch_inventory::Column::ProductId.eq(product_id))
            .filter(branch_inventory::Column::Branch.eq(branch))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            let active = branch_inventory::ActiveModel {
                id: Set(Uuid::new_v4()),
                product_id: Set(product_id),
                branch: Set(branch),
                quantity: Set(quantity),
                low_stock_threshold: Set(0),
                updated_at: Set(Utc::now()),
            };
            active.insert(conn).await?;
        }
        Ok(())
    }
}
