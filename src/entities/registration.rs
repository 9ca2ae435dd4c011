//! Registration entity - The parent record of one participant's selections.
//!
//! `total_fee`, `vat_amount` and `grand_total` are denormalized sums over the financially live
//! selections and are only ever written by `core::registration::recompute_totals`.

use super::sea_orm_active_enums::{Currency, PaymentMethod, PaymentStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Registration database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "registrations")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Participant-facing reference (e.g., "REG-20260101-1A2B3C")
    #[sea_orm(unique)]
    pub reference_number: String,
    /// Participant name
    pub full_name: String,
    /// Participant e-mail
    pub email: String,
    /// Currency the participant pays in
    pub currency: Currency,
    /// Card or bank transfer
    pub payment_method: PaymentMethod,
    /// Registration-level payment status
    pub payment_status: PaymentStatus,
    /// Redeemed discount code, upper-case
    pub discount_code: Option<String>,
    /// Ledger order id that paid for this registration
    pub order_id: Option<String>,
    /// Sum of applied fees over live selections
    pub total_fee: f64,
    /// Sum of VAT over live selections
    pub vat_amount: f64,
    /// Sum of totals over live selections
    pub grand_total: f64,
    /// Set when an operator confirms the payment by hand
    pub payment_confirmed_at: Option<DateTimeUtc>,
    /// When the registration was created
    pub created_at: DateTimeUtc,
    /// When the registration was last modified
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between Registration and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One registration owns many selections
    #[sea_orm(has_many = "super::registration_selection::Entity")]
    Selections,
}

impl Related<super::registration_selection::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Selections.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
