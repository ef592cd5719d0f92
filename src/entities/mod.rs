pub mod audit_log;
pub mod branch_inventory;
pub mod credit_payment;
pub mod invoice_item;
pub mod outbox_event;
pub mod product;
pub mod safe;
pub mod safe_transaction;
pub mod sales_invoice;
pub mod supplier;

pub use branch_inventory::Branch;
pub use safe_transaction::SafeTransactionType;
pub use sales_invoice::{DiscountType, PaymentStatus};
