use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::audit_log::{self, Entity as AuditLogEntity};
use crate::errors::ServiceError;

/// One audit entry. Also the outbox payload for records deferred from the
/// mutating flows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub user_id: Uuid,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<Uuid>,
    pub details: Option<serde_json::Value>,
}

/// Best-effort audit trail writer. Invoked from the outbox worker, so an
/// audit failure never rolls back or fails the request that produced it.
#[derive(Clone)]
pub struct AuditService {
    db: Arc<DbPool>,
}

impl AuditService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, record), fields(action = %record.action, entity = %record.entity_type))]
    pub async fn record(&self, record: AuditRecord) -> Result<(), ServiceError> {
        let active = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(record.user_id),
            action: Set(record.action),
            entity_type: Set(record.entity_type),
            entity_id: Set(record.entity_id),
            details: Set(record.details),
            created_at: Set(Utc::now()),
        };
        active.insert(&*self.db).await?;
        Ok(())
    }

    /// Most recent entries, for operator inspection
    pub async fn recent(&self, limit: u64) -> Result<Vec<audit_log::Model>, ServiceError> {
        let rows = AuditLogEntity::find()
            .order_by_desc(audit_log::Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await?;
        Ok(rows)
    }
}
