use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::db::DbPool;
use crate::entities::branch_inventory::Branch;
use crate::entities::credit_payment::{self, Entity as CreditPaymentEntity};
use crate::entities::invoice_item::{self, Entity as InvoiceItemEntity};
use crate::entities::sales_invoice::{self, DiscountType, Entity as InvoiceEntity, PaymentStatus};
use crate::entities::SafeTransactionType;
use crate::errors::ServiceError;
use crate::events::{outbox, Event, EventSender};
use crate::services::audit::AuditRecord;
use crate::services::credit::derive_payment_status;
use crate::services::inventory::InventoryService;
use crate::services::safes::PostTransactionRequest;

/// Differences under a cent are not worth a correcting ledger entry
const CURRENCY_EPSILON: Decimal = dec!(0.01);

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct InvoiceItemInput {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Cash,
    Credit,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, message = "Customer name is required"))]
    pub customer_name: String,
    pub branch: Branch,
    pub items: Vec<InvoiceItemInput>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub service_amount: Option<Decimal>,
    pub safe_id: Option<Uuid>,
    pub payment_type: Option<PaymentType>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateInvoiceRequest {
    pub customer_name: Option<String>,
    pub branch: Option<Branch>,
    pub items: Option<Vec<InvoiceItemInput>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnItemInput {
    pub item_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReturnRequest {
    pub return_items: Vec<ReturnItemInput>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: sales_invoice::Model,
    pub items: Vec<invoice_item::Model>,
}

#[derive(Debug)]
pub enum ReturnOutcome {
    /// Every line reached zero; the invoice is gone
    Deleted { invoice_id: Uuid, refund: Decimal },
    /// Some quantity survives; totals were reduced
    Updated {
        invoice: Box<InvoiceWithItems>,
        refund: Decimal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

/// Invoice arithmetic. Discount clamps to the subtotal and the grand total
/// never goes below zero.
pub fn compute_totals(
    lines: &[(i32, Decimal)],
    discount_type: DiscountType,
    discount_value: Decimal,
    service_amount: Decimal,
) -> Totals {
    let subtotal = lines
        .iter()
        .fold(Decimal::ZERO, |acc, (qty, price)| {
            acc + Decimal::from(*qty) * *price
        })
        .round_dp(2);

    let value = discount_value.max(Decimal::ZERO);
    let discount_amount = match discount_type {
        DiscountType::Amount => value.min(subtotal),
        DiscountType::Percentage => (subtotal * value / Decimal::ONE_HUNDRED).min(subtotal),
    }
    .round_dp(2);

    let total = (subtotal - discount_amount + service_amount)
        .max(Decimal::ZERO)
        .round_dp(2);

    Totals {
        subtotal,
        discount_amount,
        total,
    }
}

fn validate_items(items: &[InvoiceItemInput]) -> Result<(), ServiceError> {
    if items.is_empty() {
        return Err(ServiceError::ValidationError(
            "Invoice must contain at least one item".to_string(),
        ));
    }
    for item in items {
        if item.product_name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Each item needs a product name".to_string(),
            ));
        }
        if item.quantity <= 0 {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for {} must be a positive integer",
                item.product_name
            )));
        }
        if item.unit_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Unit price for {} must not be negative",
                item.product_name
            )));
        }
    }
    Ok(())
}

fn is_unique_violation(err: &ServiceError) -> bool {
    match err {
        ServiceError::DatabaseError(db_err) => {
            matches!(db_err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
        }
        _ => false,
    }
}

/// Sales invoice lifecycle: create, edit, delete, partial return. The
/// primary write (header + items + stock decrement) is one transaction;
/// safe postings and audit records ride the outbox and never fail a sale.
#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl InvoiceService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(customer = %request.customer_name, branch = ?request.branch))]
    pub async fn create(
        &self,
        user: &AuthUser,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceWithItems, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;
        validate_items(&request.items)?;

        if let Some(value) = request.discount_value {
            if value < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Discount value must not be negative".to_string(),
                ));
            }
        }
        if let Some(service) = request.service_amount {
            if service < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Service amount must not be negative".to_string(),
                ));
            }
        }

        // The sequence read races concurrent creates; the unique index wins
        // the tie and we retry once with a fresh number.
        let mut attempt = 0;
        let created = loop {
            match self.create_attempt(user, &request).await {
                Ok(created) => break created,
                Err(e) if is_unique_violation(&e) && attempt == 0 => {
                    warn!("invoice number collision, retrying once");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        info!(invoice_id = %created.invoice.id, number = %created.invoice.invoice_number, "invoice created");

        if let Err(e) = self
            .event_sender
            .send(Event::InvoiceCreated {
                invoice_id: created.invoice.id,
                invoice_number: created.invoice.invoice_number.clone(),
            })
            .await
        {
            warn!(error = %e, "failed to send invoice created event");
        }
        self.emit_low_stock(&created.items, created.invoice.branch)
            .await;

        Ok(created)
    }

    async fn create_attempt(
        &self,
        user: &AuthUser,
        request: &CreateInvoiceRequest,
    ) -> Result<InvoiceWithItems, ServiceError> {
        let is_credit = request.payment_type == Some(PaymentType::Credit);
        let discount_type = request.discount_type.unwrap_or(DiscountType::Amount);
        let discount_value = request.discount_value.unwrap_or(Decimal::ZERO);
        let service_amount = request.service_amount.unwrap_or(Decimal::ZERO);

        let lines: Vec<(i32, Decimal)> = request
            .items
            .iter()
            .map(|i| (i.quantity, i.unit_price))
            .collect();
        let totals = compute_totals(&lines, discount_type, discount_value, service_amount);

        let txn = self.db.begin().await?;

        // Stock first: an out-of-stock line aborts before anything visible
        for item in &request.items {
            InventoryService::try_decrement(
                &txn,
                item.product_id,
                request.branch,
                item.quantity,
                &item.product_name,
            )
            .await?;
        }

        let seq = next_invoice_seq(&txn).await?;
        let now = Utc::now();
        let invoice_id = Uuid::new_v4();

        let (paid_amount, remaining_amount, payment_status) = if is_credit {
            (Decimal::ZERO, totals.total, PaymentStatus::Unpaid)
        } else {
            (totals.total, Decimal::ZERO, PaymentStatus::Paid)
        };

        let invoice = sales_invoice::ActiveModel {
            id: Set(invoice_id),
            invoice_seq: Set(seq),
            invoice_number: Set(format!("INV-{:06}", seq)),
            customer_name: Set(request.customer_name.clone()),
            branch: Set(request.branch),
            subtotal: Set(totals.subtotal),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            discount_amount: Set(totals.discount_amount),
            service_amount: Set(service_amount),
            total_amount: Set(totals.total),
            payment_status: Set(payment_status),
            paid_amount: Set(paid_amount),
            remaining_amount: Set(remaining_amount),
            safe_id: Set(request.safe_id),
            created_by: Set(user.id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(request.items.len());
        for input in &request.items {
            let line_total = (Decimal::from(input.quantity) * input.unit_price).round_dp(2);
            let item = invoice_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(invoice_id),
                product_id: Set(input.product_id),
                product_name: Set(input.product_name.clone()),
                quantity: Set(input.quantity),
                unit_price: Set(input.unit_price),
                line_total: Set(line_total),
            }
            .insert(&txn)
            .await?;

            outbox::enqueue_audit(
                &txn,
                "sales_invoice",
                Some(invoice_id),
                &AuditRecord {
                    user_id: user.id,
                    action: "invoice_item_sold".to_string(),
                    entity_type: "invoice_item".to_string(),
                    entity_id: Some(item.id),
                    details: Some(serde_json::json!({
                        "product_id": input.product_id,
                        "product_name": input.product_name,
                        "quantity": input.quantity,
                        "unit_price": input.unit_price,
                    })),
                },
            )
            .await?;
            items.push(item);
        }

        if let Some(safe_id) = request.safe_id {
            if !is_credit && totals.total > Decimal::ZERO {
                outbox::enqueue_safe_posting(
                    &txn,
                    "sales_invoice",
                    invoice_id,
                    &PostTransactionRequest {
                        safe_id,
                        tx_type: SafeTransactionType::Deposit,
                        amount_usd: Decimal::ZERO,
                        amount_lyd: totals.total,
                        exchange_rate: None,
                        description: format!("Sale {}", invoice.invoice_number),
                        reference_type: Some("invoice".to_string()),
                        reference_id: Some(invoice_id),
                        created_by: user.id,
                    },
                )
                .await?;
            }
        }

        outbox::enqueue_audit(
            &txn,
            "sales_invoice",
            Some(invoice_id),
            &AuditRecord {
                user_id: user.id,
                action: "invoice_created".to_string(),
                entity_type: "sales_invoice".to_string(),
                entity_id: Some(invoice_id),
                details: Some(serde_json::json!({
                    "invoice_number": invoice.invoice_number,
                    "total_amount": totals.total,
                    "payment_type": if is_credit { "credit" } else { "cash" },
                })),
            },
        )
        .await?;

        txn.commit().await?;
        Ok(InvoiceWithItems { invoice, items })
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> Result<InvoiceWithItems, ServiceError> {
        let invoice = InvoiceEntity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))?;
        let items = fetch_items(&*self.db, id).await?;
        Ok(InvoiceWithItems { invoice, items })
    }

    /// Invoice headers, newest first
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<sales_invoice::Model>, u64), ServiceError> {
        let paginator = InvoiceEntity::find()
            .order_by_desc(sales_invoice::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let invoices = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((invoices, total))
    }

    /// Edits customer/branch/items. Quantity deltas are reconciled against
    /// the target branch; an insufficient line rejects the whole edit.
    #[instrument(skip(self, request), fields(invoice_id = %id))]
    pub async fn update(
        &self,
        user: &AuthUser,
        id: Uuid,
        request: UpdateInvoiceRequest,
    ) -> Result<InvoiceWithItems, ServiceError> {
        if let Some(items) = &request.items {
            validate_items(items)?;
        }
        if let Some(name) = &request.customer_name {
            if name.trim().is_empty() {
                return Err(ServiceError::ValidationError(
                    "Customer name must not be empty".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await?;

        let invoice = InvoiceEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))?;
        if !user.may_modify(invoice.created_by) {
            return Err(ServiceError::Forbidden(
                "Only the invoice author or an owner may edit it".to_string(),
            ));
        }

        let existing_items = fetch_items(&txn, id).await?;
        let old_branch = invoice.branch;
        let old_total = invoice.total_amount;
        let target_branch = request.branch.unwrap_or(old_branch);
        let items_changed = request.items.is_some();
        let branch_changed = target_branch != old_branch;
        let is_cash_sale = self.is_cash_sale(&txn, &invoice).await?;

        let final_inputs: Vec<InvoiceItemInput> = match &request.items {
            Some(items) => items.clone(),
            None => existing_items
                .iter()
                .map(|i| InvoiceItemInput {
                    product_id: i.product_id,
                    product_name: i.product_name.clone(),
                    quantity: i.quantity,
                    unit_price: i.unit_price,
                })
                .collect(),
        };

        if items_changed || branch_changed {
            // Release what the invoice holds, then re-take everything
            // against the target branch; shortfalls abort the transaction.
            for item in &existing_items {
                InventoryService::restock(&txn, item.product_id, old_branch, item.quantity).await?;
            }
            for input in &final_inputs {
                InventoryService::try_decrement(
                    &txn,
                    input.product_id,
                    target_branch,
                    input.quantity,
                    &input.product_name,
                )
                .await?;
            }
        }

        let mut new_items = existing_items.clone();
        if items_changed {
            InvoiceItemEntity::delete_many()
                .filter(invoice_item::Column::InvoiceId.eq(id))
                .exec(&txn)
                .await?;
            new_items = Vec::with_capacity(final_inputs.len());
            for input in &final_inputs {
                let line_total = (Decimal::from(input.quantity) * input.unit_price).round_dp(2);
                let item = invoice_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    invoice_id: Set(id),
                    product_id: Set(input.product_id),
                    product_name: Set(input.product_name.clone()),
                    quantity: Set(input.quantity),
                    unit_price: Set(input.unit_price),
                    line_total: Set(line_total),
                }
                .insert(&txn)
                .await?;
                new_items.push(item);
            }
        }

        let lines: Vec<(i32, Decimal)> = final_inputs
            .iter()
            .map(|i| (i.quantity, i.unit_price))
            .collect();
        let totals = compute_totals(
            &lines,
            invoice.discount_type,
            invoice.discount_value,
            invoice.service_amount,
        );

        let paid_amount = invoice.paid_amount;
        let safe_id = invoice.safe_id;
        let invoice_number = invoice.invoice_number.clone();
        let mut active: sales_invoice::ActiveModel = invoice.into();
        if let Some(name) = request.customer_name {
            active.customer_name = Set(name);
        }
        active.branch = Set(target_branch);
        active.subtotal = Set(totals.subtotal);
        active.discount_amount = Set(totals.discount_amount);
        active.total_amount = Set(totals.total);
        if is_cash_sale {
            active.paid_amount = Set(totals.total);
            active.remaining_amount = Set(Decimal::ZERO);
            active.payment_status = Set(PaymentStatus::Paid);
        } else {
            let remaining = (totals.total - paid_amount).max(Decimal::ZERO);
            active.paid_amount = Set(paid_amount);
            active.remaining_amount = Set(remaining);
            active.payment_status = Set(derive_payment_status(paid_amount, totals.total));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        // A changed total corrects the original deposit with a signed entry
        let delta = totals.total - old_total;
        if let Some(safe_id) = safe_id {
            if is_cash_sale && delta.abs() > CURRENCY_EPSILON {
                let (tx_type, amount) = if delta > Decimal::ZERO {
                    (SafeTransactionType::Deposit, delta)
                } else {
                    (SafeTransactionType::Withdrawal, -delta)
                };
                outbox::enqueue_safe_posting(
                    &txn,
                    "sales_invoice",
                    id,
                    &PostTransactionRequest {
                        safe_id,
                        tx_type,
                        amount_usd: Decimal::ZERO,
                        amount_lyd: amount,
                        exchange_rate: None,
                        description: format!("Adjustment for invoice {}", invoice_number),
                        reference_type: Some("invoice_adjustment".to_string()),
                        reference_id: Some(id),
                        created_by: user.id,
                    },
                )
                .await?;
            }
        }

        outbox::enqueue_audit(
            &txn,
            "sales_invoice",
            Some(id),
            &AuditRecord {
                user_id: user.id,
                action: "invoice_updated".to_string(),
                entity_type: "sales_invoice".to_string(),
                entity_id: Some(id),
                details: Some(serde_json::json!({
                    "old_total": old_total,
                    "new_total": totals.total,
                })),
            },
        )
        .await?;

        txn.commit().await?;
        info!(invoice_id = %id, "invoice updated");

        if let Err(e) = self.event_sender.send(Event::InvoiceUpdated(id)).await {
            warn!(error = %e, "failed to send invoice updated event");
        }
        self.emit_low_stock(&new_items, target_branch).await;

        Ok(InvoiceWithItems {
            invoice: updated,
            items: new_items,
        })
    }

    /// Deletes an invoice as a full reversal: stock is restored and the
    /// original deposit, if any, is withdrawn.
    #[instrument(skip(self), fields(invoice_id = %id))]
    pub async fn delete(&self, user: &AuthUser, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let invoice = InvoiceEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))?;
        if !user.may_modify(invoice.created_by) {
            return Err(ServiceError::Forbidden(
                "Only the invoice author or an owner may delete it".to_string(),
            ));
        }

        let items = fetch_items(&txn, id).await?;
        for item in &items {
            InventoryService::restock(&txn, item.product_id, invoice.branch, item.quantity).await?;
        }

        let is_cash_sale = self.is_cash_sale(&txn, &invoice).await?;
        if let Some(safe_id) = invoice.safe_id {
            if is_cash_sale && invoice.total_amount > Decimal::ZERO {
                outbox::enqueue_safe_posting(
                    &txn,
                    "sales_invoice",
                    id,
                    &PostTransactionRequest {
                        safe_id,
                        tx_type: SafeTransactionType::Withdrawal,
                        amount_usd: Decimal::ZERO,
                        amount_lyd: invoice.total_amount,
                        exchange_rate: None,
                        description: format!("Reversal of invoice {}", invoice.invoice_number),
                        reference_type: Some("invoice_deletion".to_string()),
                        reference_id: Some(id),
                        created_by: user.id,
                    },
                )
                .await?;
            }
        }

        outbox::enqueue_audit(
            &txn,
            "sales_invoice",
            Some(id),
            &AuditRecord {
                user_id: user.id,
                action: "invoice_deleted".to_string(),
                entity_type: "sales_invoice".to_string(),
                entity_id: Some(id),
                details: Some(serde_json::json!({
                    "invoice_number": invoice.invoice_number,
                    "total_amount": invoice.total_amount,
                })),
            },
        )
        .await?;

        CreditPaymentEntity::delete_many()
            .filter(credit_payment::Column::InvoiceId.eq(id))
            .exec(&txn)
            .await?;
        InvoiceItemEntity::delete_many()
            .filter(invoice_item::Column::InvoiceId.eq(id))
            .exec(&txn)
            .await?;
        InvoiceEntity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;
        info!(invoice_id = %id, "invoice deleted");

        if let Err(e) = self.event_sender.send(Event::InvoiceDeleted(id)).await {
            warn!(error = %e, "failed to send invoice deleted event");
        }
        Ok(())
    }

    /// Returns part or all of an invoice. Returned stock goes back to the
    /// invoice's branch; a full return deletes the invoice outright.
    #[instrument(skip(self, request), fields(invoice_id = %id))]
    pub async fn return_items(
        &self,
        user: &AuthUser,
        id: Uuid,
        request: ReturnRequest,
    ) -> Result<ReturnOutcome, ServiceError> {
        if request.return_items.is_empty() {
            return Err(ServiceError::ValidationError(
                "Return must name at least one item".to_string(),
            ));
        }

        let mut requested: HashMap<Uuid, i32> = HashMap::new();
        for entry in &request.return_items {
            if entry.quantity <= 0 {
                return Err(ServiceError::ValidationError(
                    "Return quantity must be a positive integer".to_string(),
                ));
            }
            *requested.entry(entry.item_id).or_insert(0) += entry.quantity;
        }

        let txn = self.db.begin().await?;

        let invoice = InvoiceEntity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))?;
        let items = fetch_items(&txn, id).await?;
        let by_id: HashMap<Uuid, &invoice_item::Model> =
            items.iter().map(|i| (i.id, i)).collect();

        for (item_id, qty) in &requested {
            let item = by_id.get(item_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Invoice line {} not found", item_id))
            })?;
            if *qty > item.quantity {
                return Err(ServiceError::InvalidOperation(format!(
                    "Cannot return {} of {}; only {} were sold",
                    qty, item.product_name, item.quantity
                )));
            }
        }

        // Put the goods back on the shelf of the selling branch
        for (item_id, qty) in &requested {
            let item = by_id[item_id];
            InventoryService::restock(&txn, item.product_id, invoice.branch, *qty).await?;
        }

        let fully_returned = items
            .iter()
            .all(|i| requested.get(&i.id).copied().unwrap_or(0) == i.quantity);
        let is_cash_sale = self.is_cash_sale(&txn, &invoice).await?;
        let old_total = invoice.total_amount;

        let outcome = if fully_returned {
            let refund = old_total;

            outbox::enqueue_audit(
                &txn,
                "sales_invoice",
                Some(id),
                &AuditRecord {
                    user_id: user.id,
                    action: "invoice_fully_returned".to_string(),
                    entity_type: "sales_invoice".to_string(),
                    entity_id: Some(id),
                    details: Some(serde_json::json!({
                        "invoice_number": invoice.invoice_number,
                        "refund": refund,
                    })),
                },
            )
            .await?;

            if let Some(safe_id) = invoice.safe_id {
                if is_cash_sale && refund > Decimal::ZERO {
                    outbox::enqueue_safe_posting(
                        &txn,
                        "sales_invoice",
                        id,
                        &PostTransactionRequest {
                            safe_id,
                            tx_type: SafeTransactionType::Withdrawal,
                            amount_usd: Decimal::ZERO,
                            amount_lyd: refund,
                            exchange_rate: None,
                            description: format!("Return of invoice {}", invoice.invoice_number),
                            reference_type: Some("invoice_return".to_string()),
                            reference_id: Some(id),
                            created_by: user.id,
                        },
                    )
                    .await?;
                }
            }

            CreditPaymentEntity::delete_many()
                .filter(credit_payment::Column::InvoiceId.eq(id))
                .exec(&txn)
                .await?;
            InvoiceItemEntity::delete_many()
                .filter(invoice_item::Column::InvoiceId.eq(id))
                .exec(&txn)
                .await?;
            InvoiceEntity::delete_by_id(id).exec(&txn).await?;

            ReturnOutcome::Deleted {
                invoice_id: id,
                refund,
            }
        } else {
            let mut surviving: Vec<invoice_item::Model> = Vec::new();
            for item in &items {
                let returned = requested.get(&item.id).copied().unwrap_or(0);
                let remaining_qty = item.quantity - returned;
                if remaining_qty == 0 {
                    InvoiceItemEntity::delete_by_id(item.id).exec(&txn).await?;
                } else if returned > 0 {
                    let line_total =
                        (Decimal::from(remaining_qty) * item.unit_price).round_dp(2);
                    let mut active: invoice_item::ActiveModel = item.clone().into();
                    active.quantity = Set(remaining_qty);
                    active.line_total = Set(line_total);
                    let updated = active.update(&txn).await?;
                    surviving.push(updated);
                } else {
                    surviving.push(item.clone());
                }
            }

            let lines: Vec<(i32, Decimal)> = surviving
                .iter()
                .map(|i| (i.quantity, i.unit_price))
                .collect();
            let totals = compute_totals(
                &lines,
                invoice.discount_type,
                invoice.discount_value,
                invoice.service_amount,
            );
            let refund = (old_total - totals.total).max(Decimal::ZERO);

            let paid_amount = invoice.paid_amount;
            let safe_id = invoice.safe_id;
            let invoice_number = invoice.invoice_number.clone();
            let mut active: sales_invoice::ActiveModel = invoice.into();
            active.subtotal = Set(totals.subtotal);
            active.discount_amount = Set(totals.discount_amount);
            active.total_amount = Set(totals.total);
            if is_cash_sale {
                active.paid_amount = Set(totals.total);
                active.remaining_amount = Set(Decimal::ZERO);
                active.payment_status = Set(PaymentStatus::Paid);
            } else {
                let capped_paid = paid_amount.min(totals.total);
                active.paid_amount = Set(capped_paid);
                active.remaining_amount = Set(totals.total - capped_paid);
                active.payment_status = Set(derive_payment_status(capped_paid, totals.total));
            }
            active.updated_at = Set(Utc::now());
            let updated = active.update(&txn).await?;

            if let Some(safe_id) = safe_id {
                if is_cash_sale && refund > CURRENCY_EPSILON {
                    outbox::enqueue_safe_posting(
                        &txn,
                        "sales_invoice",
                        id,
                        &PostTransactionRequest {
                            safe_id,
                            tx_type: SafeTransactionType::Withdrawal,
                            amount_usd: Decimal::ZERO,
                            amount_lyd: refund,
                            exchange_rate: None,
                            description: format!(
                                "Partial return of invoice {}",
                                invoice_number
                            ),
                            reference_type: Some("invoice_return".to_string()),
                            reference_id: Some(id),
                            created_by: user.id,
                        },
                    )
                    .await?;
                }
            }

            outbox::enqueue_audit(
                &txn,
                "sales_invoice",
                Some(id),
                &AuditRecord {
                    user_id: user.id,
                    action: "invoice_partially_returned".to_string(),
                    entity_type: "sales_invoice".to_string(),
                    entity_id: Some(id),
                    details: Some(serde_json::json!({
                        "refund": refund,
                        "new_total": totals.total,
                    })),
                },
            )
            .await?;

            ReturnOutcome::Updated {
                invoice: Box::new(InvoiceWithItems {
                    invoice: updated,
                    items: surviving,
                }),
                refund,
            }
        };

        txn.commit().await?;

        let (refund, fully) = match &outcome {
            ReturnOutcome::Deleted { refund, .. } => (*refund, true),
            ReturnOutcome::Updated { refund, .. } => (*refund, false),
        };
        info!(invoice_id = %id, refund = %refund, fully_returned = fully, "invoice return processed");
        if let Err(e) = self
            .event_sender
            .send(Event::InvoiceReturned {
                invoice_id: id,
                refund,
                fully_returned: fully,
            })
            .await
        {
            warn!(error = %e, "failed to send invoice returned event");
        }

        Ok(outcome)
    }

    /// A cash sale collected its full total at the counter; credit sales
    /// settle through credit_payments and never posted a sale deposit.
    async fn is_cash_sale<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice: &sales_invoice::Model,
    ) -> Result<bool, ServiceError> {
        if invoice.payment_status != PaymentStatus::Paid {
            return Ok(false);
        }
        let payments = CreditPaymentEntity::find()
            .filter(credit_payment::Column::InvoiceId.eq(invoice.id))
            .count(conn)
            .await?;
        Ok(payments == 0)
    }

    async fn emit_low_stock(&self, items: &[invoice_item::Model], branch: Branch) {
        for item in items {
            match InventoryService::level(&*self.db, item.product_id, branch).await {
                Ok(Some(row)) if row.is_low() => {
                    if let Err(e) = self
                        .event_sender
                        .send(Event::LowStockDetected {
                            product_id: row.product_id,
                            branch: row.branch,
                            quantity: row.quantity,
                            threshold: row.low_stock_threshold,
                        })
                        .await
                    {
                        warn!(error = %e, "failed to send low stock event");
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to check stock level after sale"),
            }
        }
    }
}

async fn fetch_items<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
) -> Result<Vec<invoice_item::Model>, ServiceError> {
    let items = InvoiceItemEntity::find()
        .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
        .all(conn)
        .await?;
    Ok(items)
}

async fn next_invoice_seq<C: ConnectionTrait>(conn: &C) -> Result<i64, ServiceError> {
    let last = InvoiceEntity::find()
        .order_by_desc(sales_invoice::Column::InvoiceSeq)
        .one(conn)
        .await?;
    Ok(last.map(|m| m.invoice_seq + 1).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_match_the_brake_pad_example() {
        // 2 x 50 with a 10 amount discount
        let totals = compute_totals(&[(2, dec!(50))], DiscountType::Amount, dec!(10), dec!(0));
        assert_eq!(totals.subtotal, dec!(100));
        assert_eq!(totals.discount_amount, dec!(10));
        assert_eq!(totals.total, dec!(90));
    }

    #[test]
    fn percentage_discount_is_taken_from_the_subtotal() {
        let totals = compute_totals(
            &[(3, dec!(20)), (1, dec!(40))],
            DiscountType::Percentage,
            dec!(25),
            dec!(5),
        );
        assert_eq!(totals.subtotal, dec!(100));
        assert_eq!(totals.discount_amount, dec!(25));
        assert_eq!(totals.total, dec!(80));
    }

    #[test]
    fn discount_clamps_to_the_subtotal() {
        let totals = compute_totals(&[(1, dec!(30))], DiscountType::Amount, dec!(100), dec!(0));
        assert_eq!(totals.discount_amount, dec!(30));
        assert_eq!(totals.total, dec!(0));
    }

    #[test]
    fn negative_discount_values_are_ignored() {
        let totals = compute_totals(&[(1, dec!(30))], DiscountType::Amount, dec!(-5), dec!(0));
        assert_eq!(totals.discount_amount, dec!(0));
        assert_eq!(totals.total, dec!(30));
    }

    #[test]
    fn total_never_goes_below_zero() {
        let totals = compute_totals(
            &[(1, dec!(10))],
            DiscountType::Percentage,
            dec!(100),
            dec!(0),
        );
        assert_eq!(totals.total, dec!(0));
    }

    #[test]
    fn service_amount_is_added_after_the_discount() {
        let totals = compute_totals(&[(2, dec!(25))], DiscountType::Amount, dec!(20), dec!(7.50));
        assert_eq!(totals.subtotal, dec!(50));
        assert_eq!(totals.total, dec!(37.50));
    }

    #[test]
    fn rejects_empty_and_malformed_items() {
        assert!(validate_items(&[]).is_err());
        assert!(validate_items(&[InvoiceItemInput {
            product_id: Uuid::new_v4(),
            product_name: "Oil Filter".into(),
            quantity: 0,
            unit_price: dec!(10),
        }])
        .is_err());
        assert!(validate_items(&[InvoiceItemInput {
            product_id: Uuid::new_v4(),
            product_name: "Oil Filter".into(),
            quantity: 1,
            unit_price: dec!(-1),
        }])
        .is_err());
        assert!(validate_items(&[InvoiceItemInput {
            product_id: Uuid::new_v4(),
            product_name: " ".into(),
            quantity: 1,
            unit_price: dec!(0),
        }])
        .is_err());
    }
}
