//! Payment transaction entity - One ledger row per payment attempt.
//!
//! Rows are keyed by `order_id` and may exist without a registration: failed attempts never
//! produce one, and successful ones are linked after the registration commits.

use super::sea_orm_active_enums::{Currency, TransactionStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment transaction database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_transactions")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Generated order id sent to the bank
    #[sea_orm(unique)]
    pub order_id: String,
    /// Registration paid for by this attempt, once linked
    pub registration_id: Option<i64>,
    /// Public form submission that started the attempt
    pub form_submission_id: Option<String>,
    /// Name of the gateway configuration used
    pub gateway_name: String,
    /// Charged amount, VAT included
    pub amount: f64,
    /// Charged currency
    pub currency: Currency,
    /// Card holder as typed by the participant
    pub card_holder: Option<String>,
    /// First six and last four digits of the PAN
    pub masked_card: Option<String>,
    /// Card brand reported by the bank
    pub card_brand: Option<String>,
    /// Attempt outcome
    pub status: TransactionStatus,
    /// Bank-side transaction id
    pub bank_transaction_id: Option<String>,
    /// Bank authorization code
    pub auth_code: Option<String>,
    /// Bank or local error code on failure
    pub error_code: Option<String>,
    /// Bank or local error message on failure
    pub error_message: Option<String>,
    /// When the attempt started
    pub created_at: DateTimeUtc,
    /// When the row was last modified
    pub updated_at: DateTimeUtc,
}

/// `PaymentTransaction` is linked to registrations by id only
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
