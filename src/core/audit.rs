//! Audit recording - before/after images of every ledger mutation.
//!
//! Entries are written through the caller's connection, so when the caller passes its
//! transaction the audit row commits or rolls back together with the change it describes.

use crate::{entities::audit_log, errors::Result};
use chrono::Utc;
use sea_orm::{Set, prelude::*};
use serde::Serialize;

/// One change to record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    /// Table of the mutated row
    pub entity: &'static str,
    /// Primary key of the mutated row
    pub entity_id: i64,
    /// What happened
    pub action: &'static str,
    /// Operator who triggered the change
    pub actor: Option<String>,
    /// JSON image before the change; None for inserts
    pub old_values: Option<serde_json::Value>,
    /// JSON image after the change
    pub new_values: serde_json::Value,
}

impl AuditEntry {
    /// Builds an entry from serializable before/after images.
    pub fn change<T: Serialize>(
        entity: &'static str,
        entity_id: i64,
        action: &'static str,
        actor: Option<&str>,
        old: Option<&T>,
        new: &T,
    ) -> Result<Self> {
        Ok(Self {
            entity,
            entity_id,
            action,
            actor: actor.map(ToString::to_string),
            old_values: old.map(serde_json::to_value).transpose().map_err(snapshot_error)?,
            new_values: serde_json::to_value(new).map_err(snapshot_error)?,
        })
    }
}

fn snapshot_error(e: serde_json::Error) -> crate::errors::Error {
    crate::errors::Error::CorruptState {
        message: format!("failed to snapshot row for audit: {e}"),
    }
}

/// Persists an audit entry.
pub async fn record<C>(db: &C, entry: AuditEntry) -> Result<audit_log::Model>
where
    C: ConnectionTrait,
{
    let model = audit_log::ActiveModel {
        entity: Set(entry.entity.to_string()),
        entity_id: Set(entry.entity_id),
        action: Set(entry.action.to_string()),
        actor: Set(entry.actor),
        old_values: Set(entry.old_values.map(|v| v.to_string())),
        new_values: Set(entry.new_values.to_string()),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::debug!(
        entity = %model.entity,
        entity_id = model.entity_id,
        action = %model.action,
        "Audit entry recorded"
    );
    Ok(model)
}

/// All audit entries for one row, oldest first.
pub async fn entries_for<C>(db: &C, entity: &str, entity_id: i64) -> Result<Vec<audit_log::Model>>
where
    C: ConnectionTrait,
{
    use sea_orm::QueryOrder;

    crate::entities::AuditLog::find()
        .filter(audit_log::Column::Entity.eq(entity))
        .filter(audit_log::Column::EntityId.eq(entity_id))
        .order_by_asc(audit_log::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
