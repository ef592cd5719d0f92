use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::credit_payment::{self, Entity as CreditPaymentEntity};
use crate::entities::sales_invoice::{self, Entity as InvoiceEntity, PaymentStatus};
use crate::entities::SafeTransactionType;
use crate::errors::ServiceError;
use crate::events::{outbox, Event, EventSender};
use crate::services::audit::AuditRecord;
use crate::services::safes::PostTransactionRequest;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordPaymentRequest {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    #[validate(length(min = 1, message = "Payment method is required"))]
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
    pub safe_id: Option<Uuid>,
    pub description: Option<String>,
}

fn default_payment_method() -> String {
    "cash".to_string()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentResponse {
    pub payment: credit_payment::Model,
    pub invoice: sales_invoice::Model,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreditSummary {
    pub outstanding_total: Decimal,
    pub open_invoices: u64,
}

/// Derives the payment status from amounts; callers never set it directly
pub(crate) fn derive_payment_status(paid: Decimal, total: Decimal) -> PaymentStatus {
    if total - paid <= Decimal::ZERO {
        PaymentStatus::Paid
    } else if paid > Decimal::ZERO {
        PaymentStatus::PartiallyPaid
    } else {
        PaymentStatus::Unpaid
    }
}

/// Credit sales bookkeeping: append-only payments against unpaid
/// invoices, plus read-side aggregates for the debt screens.
#[derive(Clone)]
pub struct CreditService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CreditService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Records a payment against a credit invoice and re-derives its
    /// payment status. The sum of payments can never exceed the total.
    #[instrument(skip(self, request), fields(invoice_id = %request.invoice_id, amount = %request.amount))]
    pub async fn record_payment(
        &self,
        created_by: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<PaymentResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Payment amount must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let invoice = InvoiceEntity::find_by_id(request.invoice_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Invoice {} not found", request.invoice_id))
            })?;

        if invoice.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(format!(
                "Invoice {} is already fully paid",
                invoice.invoice_number
            )));
        }
        if request.amount > invoice.remaining_amount {
            return Err(ServiceError::InvalidOperation(format!(
                "Payment of {} exceeds remaining balance {}",
                request.amount, invoice.remaining_amount
            )));
        }

        let now = Utc::now();
        let payment = credit_payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice.id),
            amount: Set(request.amount),
            payment_method: Set(request.payment_method.clone()),
            safe_id: Set(request.safe_id),
            description: Set(request.description.clone()),
            created_by: Set(created_by),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let new_paid = invoice.paid_amount + request.amount;
        let new_remaining = invoice.total_amount - new_paid;
        let new_status = derive_payment_status(new_paid, invoice.total_amount);

        let invoice_id = invoice.id;
        let invoice_number = invoice.invoice_number.clone();
        let mut active: sales_invoice::ActiveModel = invoice.into();
        active.paid_amount = Set(new_paid);
        active.remaining_amount = Set(new_remaining);
        active.payment_status = Set(new_status);
        active.updated_at = Set(now);
        let updated_invoice = active.update(&txn).await?;

        if let Some(safe_id) = request.safe_id {
            outbox::enqueue_safe_posting(
                &txn,
                "credit_payment",
                payment.id,
                &PostTransactionRequest {
                    safe_id,
                    tx_type: SafeTransactionType::Deposit,
                    amount_usd: Decimal::ZERO,
                    amount_lyd: request.amount,
                    exchange_rate: None,
                    description: format!("Credit payment for invoice {}", invoice_number),
                    reference_type: Some("credit_payment".to_string()),
                    reference_id: Some(payment.id),
                    created_by,
                },
            )
            .await?;
        }

        outbox::enqueue_audit(
            &txn,
            "credit_payment",
            Some(payment.id),
            &AuditRecord {
                user_id: created_by,
                action: "credit_payment_recorded".to_string(),
                entity_type: "sales_invoice".to_string(),
                entity_id: Some(invoice_id),
                details: Some(serde_json::json!({
                    "amount": request.amount,
                    "payment_method": request.payment_method,
                })),
            },
        )
        .await?;

        txn.commit().await?;
        info!(invoice_id = %invoice_id, payment_id = %payment.id, "credit payment recorded");

        if let Err(e) = self
            .event_sender
            .send(Event::CreditPaymentRecorded {
                invoice_id,
                payment_id: payment.id,
                amount: payment.amount,
            })
            .await
        {
            warn!(error = %e, "failed to send credit payment event");
        }

        Ok(PaymentResponse {
            payment,
            invoice: updated_invoice,
        })
    }

    /// Outstanding debt across all open credit invoices
    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<CreditSummary, ServiceError> {
        let open = InvoiceEntity::find()
            .filter(sales_invoice::Column::PaymentStatus.ne(PaymentStatus::Paid))
            .all(&*self.db)
            .await?;

        let outstanding_total = open
            .iter()
            .fold(Decimal::ZERO, |acc, inv| acc + inv.remaining_amount);

        Ok(CreditSummary {
            outstanding_total,
            open_invoices: open.len() as u64,
        })
    }

    /// Open credit invoices, newest first
    #[instrument(skip(self))]
    pub async fn list_credit_invoices(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<sales_invoice::Model>, u64), ServiceError> {
        let paginator = InvoiceEntity::find()
            .filter(sales_invoice::Column::PaymentStatus.ne(PaymentStatus::Paid))
            .order_by_desc(sales_invoice::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let invoices = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((invoices, total))
    }

    /// Payments recorded against one invoice, oldest first
    #[instrument(skip(self))]
    pub async fn list_payments(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<credit_payment::Model>, ServiceError> {
        let payments = CreditPaymentEntity::find()
            .filter(credit_payment::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(credit_payment::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(payments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn status_derivation_covers_all_bands() {
        assert_eq!(
            derive_payment_status(dec!(0), dec!(200)),
            PaymentStatus::Unpaid
        );
        assert_eq!(
            derive_payment_status(dec!(80), dec!(200)),
            PaymentStatus::PartiallyPaid
        );
        assert_eq!(
            derive_payment_status(dec!(200), dec!(200)),
            PaymentStatus::Paid
        );
        // A zero-total invoice has nothing left to collect
        assert_eq!(derive_payment_status(dec!(0), dec!(0)), PaymentStatus::Paid);
    }
}
