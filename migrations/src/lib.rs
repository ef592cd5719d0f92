pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_products_table;
mod m20250301_000002_create_branch_inventory_table;
mod m20250301_000003_create_sales_invoices_table;
mod m20250301_000004_create_invoice_items_table;
mod m20250301_000005_create_credit_payments_table;
mod m20250301_000006_create_safes_tables;
mod m20250301_000007_create_suppliers_table;
mod m20250301_000008_create_outbox_table;
mod m20250301_000009_create_audit_logs_table;
mod m20250602_000010_add_hot_path_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_products_table::Migration),
            Box::new(m20250301_000002_create_branch_inventory_table::Migration),
            Box::new(m20250301_000003_create_sales_invoices_table::Migration),
            Box::new(m20250301_000004_create_invoice_items_table::Migration),
            Box::new(m20250301_000005_create_credit_payments_table::Migration),
            Box::new(m20250301_000006_create_safes_tables::Migration),
            Box::new(m20250301_000007_create_suppliers_table::Migration),
            Box::new(m20250301_000008_create_outbox_table::Migration),
            Box::new(m20250301_000009_create_audit_logs_table::Migration),
            Box::new(m20250602_000010_add_hot_path_indexes::Migration),
        ]
    }
}
