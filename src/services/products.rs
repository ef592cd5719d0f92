use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::invoice_item::{self, Entity as InvoiceItemEntity};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::errors::ServiceError;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub sell_price: Decimal,
    pub cost_price: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub sell_price: Option<Decimal>,
    pub cost_price: Option<Decimal>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<product::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DbPool>,
}

impl ProductService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create(&self, request: CreateProductRequest) -> Result<product::Model, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        check_prices(Some(request.sell_price), request.cost_price)?;

        let now = Utc::now();
        let active = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            sku: Set(request.sku),
            category: Set(request.category),
            description: Set(request.description),
            sell_price: Set(request.sell_price),
            cost_price: Set(request.cost_price),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = active.insert(&*self.db).await?;
        info!(product_id = %model.id, "product created");
        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<product::Model, ServiceError> {
        ProductEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        search: Option<String>,
    ) -> Result<ProductListResponse, ServiceError> {
        let mut query = ProductEntity::find().order_by_asc(product::Column::Name);
        if let Some(term) = search.filter(|s| !s.trim().is_empty()) {
            query = query.filter(product::Column::Name.contains(term.trim()));
        }

        let paginator = query.paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok(ProductListResponse {
            products,
            total,
            page,
            per_page,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        check_prices(request.sell_price, request.cost_price)?;
        if let Some(name) = &request.name {
            if name.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "Name must not be empty".to_string(),
                ));
            }
        }

        let existing = self.get(id).await?;
        let mut active: product::ActiveModel = existing.into();
        if let Some(name) = request.name {
            active.name = Set(name);
        }
        if let Some(sku) = request.sku {
            active.sku = Set(Some(sku));
        }
        if let Some(category) = request.category {
            active.category = Set(Some(category));
        }
        if let Some(description) = request.description {
            active.description = Set(Some(description));
        }
        if let Some(sell_price) = request.sell_price {
            active.sell_price = Set(sell_price);
        }
        if let Some(cost_price) = request.cost_price {
            active.cost_price = Set(Some(cost_price));
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.updated_at = Set(Utc::now());

        let model = active.update(&*self.db).await?;
        Ok(model)
    }

    /// Removes a product. Anything referenced by invoice history is
    /// deactivated instead so old invoices keep resolving.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<bool, ServiceError> {
        let existing = self.get(id).await?;

        let referenced = InvoiceItemEntity::find()
            .filter(invoice_item::Column::ProductId.eq(id))
            .count(&*self.db)
            .await?;

        if referenced > 0 {
            let mut active: product::ActiveModel = existing.into();
            active.is_active = Set(false);
            active.updated_at = Set(Utc::now());
            active.update(&*self.db).await?;
            info!(product_id = %id, "product deactivated (referenced by invoices)");
            return Ok(false);
        }

        ProductEntity::delete_by_id(id).exec(&*self.db).await?;
        info!(product_id = %id, "product deleted");
        Ok(true)
    }
}

fn check_prices(sell: Option<Decimal>, cost: Option<Decimal>) -> Result<(), ServiceError> {
    if let Some(price) = sell {
        if price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Sell price must not be negative".to_string(),
            ));
        }
    }
    if let Some(price) = cost {
        if price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Cost price must not be negative".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn negative_cost_price_is_rejected() {
        assert!(check_prices(Some(dec!(10)), Some(dec!(-1))).is_err());
        assert!(check_prices(Some(dec!(10)), None).is_ok());
        assert!(check_prices(None, Some(dec!(0))).is_ok());
    }
}
