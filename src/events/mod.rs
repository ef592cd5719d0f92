use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{Branch, SafeTransactionType};

pub mod outbox;

/// Domain events emitted after a primary write commits. Delivery is
/// best-effort; consumers must not be load-bearing for correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    InvoiceCreated {
        invoice_id: Uuid,
        invoice_number: String,
    },
    InvoiceUpdated(Uuid),
    InvoiceDeleted(Uuid),
    InvoiceReturned {
        invoice_id: Uuid,
        refund: Decimal,
        fully_returned: bool,
    },
    CreditPaymentRecorded {
        invoice_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
    },
    InventoryUpserted {
        product_id: Uuid,
        branch: Branch,
        quantity: i32,
    },
    LowStockDetected {
        product_id: Uuid,
        branch: Branch,
        quantity: i32,
        threshold: i32,
    },
    SafeTransactionPosted {
        safe_id: Uuid,
        transaction_id: Uuid,
        tx_type: SafeTransactionType,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Runs for the lifetime of
/// the process.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::LowStockDetected {
                product_id,
                branch,
                quantity,
                threshold,
            } => {
                warn!(
                    product_id = %product_id,
                    branch = ?branch,
                    quantity,
                    threshold,
                    "low stock"
                );
            }
            other => info!(event = ?other, "domain event"),
        }
    }
}
