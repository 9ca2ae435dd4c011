//! Audit log entity - Before/after images of every mutation the ledger performs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit log database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Table of the mutated row (e.g., `"registration_selections"`)
    pub entity: String,
    /// Primary key of the mutated row
    pub entity_id: i64,
    /// What happened (e.g., `"cancel"`, `"refund_approve"`)
    pub action: String,
    /// Operator who triggered the change, if known
    pub actor: Option<String>,
    /// JSON image before the change; None for inserts
    pub old_values: Option<String>,
    /// JSON image after the change
    pub new_values: String,
    /// When the change was recorded
    pub created_at: DateTimeUtc,
}

/// `AuditLog` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
