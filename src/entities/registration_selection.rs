//! Registration selection entity - One (category, type) line item of a registration.
//!
//! The three status columns are the stored form of `core::selection::SelectionState`; code
//! outside that module never writes them directly.

use super::sea_orm_active_enums::{Currency, PaymentStatus, RefundStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Registration selection database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "registration_selections")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning registration
    pub registration_id: i64,
    /// Category of the selected type
    pub category_id: i64,
    /// Selected type
    pub registration_type_id: i64,
    /// Fee before early-bird and discount
    pub original_fee: f64,
    /// Fee actually charged, VAT excluded
    pub applied_fee: f64,
    /// VAT rate at time of purchase
    pub vat_rate: f64,
    /// VAT on the applied fee
    pub vat_amount: f64,
    /// Applied fee plus VAT
    pub total_amount: f64,
    /// Currency of the amounts above
    pub currency: Currency,
    /// Lira per unit of `currency` at time of purchase
    pub exchange_rate: f64,
    /// Whether a discount rule matched this line
    pub discount_applied: bool,
    /// Payment axis
    pub payment_status: PaymentStatus,
    /// Cancellation axis
    pub is_cancelled: bool,
    /// Refund axis
    pub refund_status: RefundStatus,
    /// When the selection was cancelled
    pub cancelled_at: Option<DateTimeUtc>,
    /// When a refund became owed
    pub refund_requested_at: Option<DateTimeUtc>,
    /// When the refund was approved or rejected
    pub refund_processed_at: Option<DateTimeUtc>,
    /// Operator notes on the refund decision
    pub refund_notes: Option<String>,
    /// When the selection was created
    pub created_at: DateTimeUtc,
    /// When the selection was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `RegistrationSelection` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each selection belongs to one registration
    #[sea_orm(
        belongs_to = "super::registration::Entity",
        from = "Column::RegistrationId",
        to = "super::registration::Column::Id"
    )]
    Registration,
    /// Each selection occupies one registration type
    #[sea_orm(
        belongs_to = "super::registration_type::Entity",
        from = "Column::RegistrationTypeId",
        to = "super::registration_type::Column::Id"
    )]
    RegistrationType,
}

impl Related<super::registration::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Registration.def()
    }
}

impl Related<super::registration_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RegistrationType.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
