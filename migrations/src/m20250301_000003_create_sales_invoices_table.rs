use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SalesInvoices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SalesInvoices::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::InvoiceSeq)
                            .big_integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::InvoiceNumber)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(SalesInvoices::CustomerName).string().not_null())
                    .col(ColumnDef::new(SalesInvoices::Branch).string().not_null())
                    .col(
                        ColumnDef::new(SalesInvoices::Subtotal)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::DiscountType)
                            .string()
                            .not_null()
                            .default("amount"),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::DiscountValue)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::DiscountAmount)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::ServiceAmount)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::TotalAmount)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::PaymentStatus)
                            .string()
                            .not_null()
                            .default("paid"),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::PaidAmount)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(SalesInvoices::RemainingAmount)
                            .decimal_len(12, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(SalesInvoices::SafeId).uuid().null())
                    .col(ColumnDef::new(SalesInvoices::CreatedBy).uuid().not_null())
                    .col(ColumnDef::new(SalesInvoices::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(SalesInvoices::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SalesInvoices::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SalesInvoices {
    Table,
    Id,
    InvoiceSeq,
    InvoiceNumber,
    CustomerName,
    Branch,
    Subtotal,
    DiscountType,
    DiscountValue,
    DiscountAmount,
    ServiceAmount,
    TotalAmount,
    PaymentStatus,
    PaidAmount,
    RemainingAmount,
    SafeId,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}
