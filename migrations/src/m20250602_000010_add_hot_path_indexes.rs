use sea_orm_migration::prelude::*;

use crate::m20250301_000004_create_invoice_items_table::InvoiceItems;
use crate::m20250301_000005_create_credit_payments_table::CreditPayments;
use crate::m20250301_000006_create_safes_tables::SafeTransactions;
use crate::m20250301_000008_create_outbox_table::OutboxEvents;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("ix_invoice_items_invoice_id")
                    .table(InvoiceItems::Table)
                    .col(InvoiceItems::InvoiceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_credit_payments_invoice_id")
                    .table(CreditPayments::Table)
                    .col(CreditPayments::InvoiceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ix_safe_transactions_safe_id")
                    .table(SafeTransactions::Table)
                    .col(SafeTransactions::SafeId)
                    .to_owned(),
            )
            .await?;

        // Worker polls by (status, available_at)
        manager
            .create_index(
                Index::create()
                    .name("ix_outbox_events_status_available_at")
                    .table(OutboxEvents::Table)
                    .col(OutboxEvents::Status)
                    .col(OutboxEvents::AvailableAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("ix_outbox_events_status_available_at")
                    .table(OutboxEvents::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("ix_safe_transactions_safe_id")
                    .table(SafeTransactions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("ix_credit_payments_invoice_id")
                    .table(CreditPayments::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("ix_invoice_items_invoice_id")
                    .table(InvoiceItems::Table)
                    .to_owned(),
            )
            .await
    }
}
