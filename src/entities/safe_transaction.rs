use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Kinds of monetary movement a safe records
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
pub enum SafeTransactionType {
    #[sea_orm(string_value = "deposit")]
    Deposit,
    #[sea_orm(string_value = "withdrawal")]
    Withdrawal,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "settlement")]
    Settlement,
    #[sea_orm(string_value = "currency_adjustment")]
    CurrencyAdjustment,
}

impl SafeTransactionType {
    /// Sign applied to the safe balance: deposits add, withdrawals subtract
    pub fn sign(&self) -> Decimal {
        match self {
            SafeTransactionType::Withdrawal => Decimal::NEGATIVE_ONE,
            _ => Decimal::ONE,
        }
    }
}

/// Immutable ledger row. Corrections are offsetting entries, never edits.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "safe_transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub safe_id: Uuid,
    pub tx_type: SafeTransactionType,
    pub amount_usd: Decimal,
    pub amount_lyd: Decimal,
    pub exchange_rate: Option<Decimal>,
    pub description: String,
    /// e.g. "invoice", "invoice_return", "credit_payment"
    pub reference_type: Option<String>,
    pub reference_id: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::safe::Entity",
        from = "Column::SafeId",
        to = "super::safe::Column::Id"
    )]
    Safe,
}

impl Related<super::safe::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Safe.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Signed LYD movement this row applies to its safe
    pub fn signed_lyd(&self) -> Decimal {
        self.tx_type.sign() * self.amount_lyd
    }

    /// Signed USD movement this row applies to its safe
    pub fn signed_usd(&self) -> Decimal {
        self.tx_type.sign() * self.amount_usd
    }
}
