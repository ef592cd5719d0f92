use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::outbox_event::{self, Entity as OutboxEntity, OutboxStatus};
use crate::errors::ServiceError;
use crate::services::audit::{AuditRecord, AuditService};
use crate::services::safes::{PostTransactionRequest, SafeService};

pub const EVENT_SAFE_POSTING: &str = "safe.post_transaction";
pub const EVENT_AUDIT_RECORD: &str = "audit.record";

const MAX_ATTEMPTS: i32 = 8;
const BASE_BACKOFF_SECS: i64 = 2;

/// Enqueue a secondary effect inside the caller's transaction. The effect
/// becomes visible to the worker only if that transaction commits.
pub async fn enqueue(
    conn: &impl ConnectionTrait,
    aggregate_type: &str,
    aggregate_id: Option<Uuid>,
    event_type: &str,
    payload: Value,
) -> Result<(), ServiceError> {
    let now = Utc::now();
    let row = outbox_event::ActiveModel {
        id: Set(Uuid::new_v4()),
        aggregate_type: Set(aggregate_type.to_string()),
        aggregate_id: Set(aggregate_id),
        event_type: Set(event_type.to_string()),
        payload: Set(payload),
        status: Set(OutboxStatus::Pending),
        attempts: Set(0),
        available_at: Set(now),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        processed_at: Set(None),
    };
    row.insert(conn).await?;
    Ok(())
}

/// Queue a safe posting tied to an invoice/payment aggregate
pub async fn enqueue_safe_posting(
    conn: &impl ConnectionTrait,
    aggregate_type: &str,
    aggregate_id: Uuid,
    posting: &PostTransactionRequest,
) -> Result<(), ServiceError> {
    let payload = serde_json::to_value(posting)?;
    enqueue(
        conn,
        aggregate_type,
        Some(aggregate_id),
        EVENT_SAFE_POSTING,
        payload,
    )
    .await
}

/// Queue an audit record for the entity being mutated
pub async fn enqueue_audit(
    conn: &impl ConnectionTrait,
    aggregate_type: &str,
    aggregate_id: Option<Uuid>,
    record: &AuditRecord,
) -> Result<(), ServiceError> {
    let payload = serde_json::to_value(record)?;
    enqueue(
        conn,
        aggregate_type,
        aggregate_id,
        EVENT_AUDIT_RECORD,
        payload,
    )
    .await
}

/// Executes drained outbox rows against the owning services
#[derive(Clone)]
pub struct OutboxExecutor {
    safes: Arc<SafeService>,
    audit: Arc<AuditService>,
}

impl OutboxExecutor {
    pub fn new(safes: Arc<SafeService>, audit: Arc<AuditService>) -> Self {
        Self { safes, audit }
    }

    async fn execute(&self, event_type: &str, payload: &Value) -> Result<(), ServiceError> {
        match event_type {
            EVENT_SAFE_POSTING => {
                let posting: PostTransactionRequest = serde_json::from_value(payload.clone())?;
                self.safes.post(posting).await?;
                Ok(())
            }
            EVENT_AUDIT_RECORD => {
                let record: AuditRecord = serde_json::from_value(payload.clone())?;
                self.audit.record(record).await?;
                Ok(())
            }
            other => Err(ServiceError::EventError(format!(
                "unknown outbox event type: {}",
                other
            ))),
        }
    }
}

/// Spawns the background worker that drains the outbox for the lifetime of
/// the process.
pub fn start_worker(db: Arc<DbPool>, executor: OutboxExecutor, poll_interval: Duration) {
    tokio::spawn(async move {
        loop {
            match drain_once(&db, &executor, 50).await {
                Ok(0) => {}
                Ok(n) => info!(processed = n, "outbox batch drained"),
                Err(e) => error!("outbox worker error: {}", e),
            }
            tokio::time::sleep(poll_interval).await;
        }
    });
}

/// Claims and executes one batch of due pending rows. Public so tests can
/// drain deterministically instead of racing the worker.
pub async fn drain_once(
    db: &DbPool,
    executor: &OutboxExecutor,
    batch_size: u64,
) -> Result<usize, ServiceError> {
    let now = Utc::now();
    let due = OutboxEntity::find()
        .filter(outbox_event::Column::Status.eq(OutboxStatus::Pending))
        .filter(outbox_event::Column::AvailableAt.lte(now))
        .order_by_asc(outbox_event::Column::CreatedAt)
        .limit(batch_size)
        .all(db)
        .await?;

    let mut processed = 0usize;
    for row in due {
        let id = row.id;
        let event_type = row.event_type.clone();
        let payload = row.payload.clone();
        let attempts = row.attempts + 1;

        let mut claim: outbox_event::ActiveModel = row.into();
        claim.status = Set(OutboxStatus::Processing);
        claim.attempts = Set(attempts);
        claim.updated_at = Set(Utc::now());
        let claimed = claim.update(db).await?;

        match executor.execute(&event_type, &payload).await {
            Ok(()) => {
                let mut done: outbox_event::ActiveModel = claimed.into();
                done.status = Set(OutboxStatus::Delivered);
                done.last_error = Set(None);
                done.processed_at = Set(Some(Utc::now()));
                done.updated_at = Set(Utc::now());
                done.update(db).await?;
                processed += 1;
            }
            Err(e) if attempts < MAX_ATTEMPTS => {
                let backoff = BASE_BACKOFF_SECS.saturating_pow(attempts as u32);
                warn!(
                    outbox_id = %id,
                    attempts,
                    backoff_secs = backoff,
                    error = %e,
                    "outbox effect failed, rescheduling"
                );
                let mut retry: outbox_event::ActiveModel = claimed.into();
                retry.status = Set(OutboxStatus::Pending);
                retry.available_at = Set(Utc::now() + chrono::Duration::seconds(backoff));
                retry.last_error = Set(Some(e.to_string()));
                retry.updated_at = Set(Utc::now());
                retry.update(db).await?;
            }
            Err(e) => {
                error!(outbox_id = %id, error = %e, "outbox effect exhausted retries");
                let mut failed: outbox_event::ActiveModel = claimed.into();
                failed.status = Set(OutboxStatus::Failed);
                failed.last_error = Set(Some(e.to_string()));
                failed.updated_at = Set(Utc::now());
                failed.update(db).await?;
            }
        }
    }

    Ok(processed)
}
