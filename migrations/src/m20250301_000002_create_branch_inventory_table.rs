use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BranchInventory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BranchInventory::Id)
                            .uuid()
                            .primary_key()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BranchInventory::ProductId).uuid().not_null())
                    .col(ColumnDef::new(BranchInventory::Branch).string().not_null())
                    .col(
                        ColumnDef::new(BranchInventory::Quantity)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BranchInventory::LowStockThreshold)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(BranchInventory::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per (product, branch); stock mutations key on this pair
        manager
            .create_index(
                Index::create()
                    .name("ux_branch_inventory_product_branch")
                    .table(BranchInventory::Table)
                    .col(BranchInventory::ProductId)
                    .col(BranchInventory::Branch)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BranchInventory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum BranchInventory {
    Table,
    Id,
    ProductId,
    Branch,
    Quantity,
    LowStockThreshold,
    UpdatedAt,
}
