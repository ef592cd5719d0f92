use sea_orm_migration::prelude::*;

use crate::m20250301_000003_create_sales_invoices_table::SalesInvoices;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CreditPayments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CreditPayments::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CreditPayments::InvoiceId).uuid().not_null())
                    .col(
                        ColumnDef::new(CreditPayments::Amount)
                            .decimal_len(12, 2)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditPayments::PaymentMethod)
                            .string()
                            .not_null()
                            .default("cash"),
                    )
                    .col(ColumnDef::new(CreditPayments::SafeId).uuid().null())
                    .col(ColumnDef::new(CreditPayments::Description).text().null())
                    .col(ColumnDef::new(CreditPayments::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(CreditPayments::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_credit_payments_invoice")
                            .from(CreditPayments::Table, CreditPayments::InvoiceId)
                            .to(SalesInvoices::Table, SalesInvoices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CreditPayments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CreditPayments {
    Table,
    Id,
    InvoiceId,
    Amount,
    PaymentMethod,
    SafeId,
    Description,
    CreatedBy,
    CreatedAt,
}
