use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Safes::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Safes::Id).uuid().primary_key().not_null())
                    .col(ColumnDef::new(Safes::Name).string().not_null())
                    .col(ColumnDef::new(Safes::Code).string().not_null().unique_key())
                    .col(ColumnDef::new(Safes::ParentSafeId).uuid().null())
                    .col(
                        ColumnDef::new(Safes::BalanceUsd)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Safes::BalanceLyd)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Safes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Safes::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Safes::UpdatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SafeTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SafeTransactions::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SafeTransactions::SafeId).uuid().not_null())
                    .col(ColumnDef::new(SafeTransactions::TxType).string().not_null())
                    .col(
                        ColumnDef::new(SafeTransactions::AmountUsd)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(SafeTransactions::AmountLyd)
                            .decimal_len(14, 2)
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(SafeTransactions::ExchangeRate)
                            .decimal_len(12, 6)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SafeTransactions::Description)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SafeTransactions::ReferenceType)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(SafeTransactions::ReferenceId).uuid().null())
                    .col(ColumnDef::new(SafeTransactions::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(SafeTransactions::CreatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_safe_transactions_safe")
                            .from(SafeTransactions::Table, SafeTransactions::SafeId)
                            .to(Safes::Table, Safes::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SafeTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Safes::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Safes {
    Table,
    Id,
    Name,
    Code,
    ParentSafeId,
    BalanceUsd,
    BalanceLyd,
    IsActive,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
pub enum SafeTransactions {
    Table,
    Id,
    SafeId,
    TxType,
    AmountUsd,
    AmountLyd,
    ExchangeRate,
    Description,
    ReferenceType,
    ReferenceId,
    CreatedBy,
    CreatedAt,
}
