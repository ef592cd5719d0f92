pub mod common;
pub mod credit;
pub mod health;
pub mod inventory;
pub mod invoices;
pub mod products;
pub mod safes;
pub mod suppliers;

use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub products: Arc<crate::services::products::ProductService>,
    pub inventory: Arc<crate::services::inventory::InventoryService>,
    pub invoices: Arc<crate::services::invoices::InvoiceService>,
    pub credit: Arc<crate::services::credit::CreditService>,
    pub safes: Arc<crate::services::safes::SafeService>,
    pub suppliers: Arc<crate::services::suppliers::SupplierService>,
    pub audit: Arc<crate::services::audit::AuditService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        let products = Arc::new(crate::services::products::ProductService::new(db.clone()));
        let inventory = Arc::new(crate::services::inventory::InventoryService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let invoices = Arc::new(crate::services::invoices::InvoiceService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let credit = Arc::new(crate::services::credit::CreditService::new(
            db.clone(),
            event_sender.clone(),
        ));
        let safes = Arc::new(crate::services::safes::SafeService::new(
            db.clone(),
            event_sender,
        ));
        let suppliers = Arc::new(crate::services::suppliers::SupplierService::new(db.clone()));
        let audit = Arc::new(crate::services::audit::AuditService::new(db));

        Self {
            products,
            inventory,
            invoices,
            credit,
            safes,
            suppliers,
            audit,
        }
    }
}
