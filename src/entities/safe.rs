use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Named cash register. Balances are a derived cache over the
/// safe_transactions ledger, adjusted in the same transaction as every
/// append; the ledger stays the source of truth.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "safes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(unique)]
    pub code: String,
    /// Reporting hierarchy only, not structurally enforced
    pub parent_safe_id: Option<Uuid>,
    pub balance_usd: Decimal,
    pub balance_lyd: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::safe_transaction::Entity")]
    SafeTransactions,
}

impl Related<super::safe_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SafeTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
