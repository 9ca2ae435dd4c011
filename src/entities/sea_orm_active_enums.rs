//! String-backed enums shared by several entities.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Which id a discount code's rules are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum DiscountScope {
    /// Rules target category ids
    #[sea_orm(string_value = "category")]
    #[serde(rename = "category")]
    Category,
    /// Rules target registration type ids
    #[sea_orm(string_value = "type")]
    #[serde(rename = "type")]
    RegistrationType,
}

/// How a discount rule's value is applied to a fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `value` is a percentage of the fee
    #[sea_orm(string_value = "percent")]
    Percent,
    /// `value` is an amount in lira subtracted from the fee
    #[sea_orm(string_value = "fixed")]
    Fixed,
}

/// Settlement currency of a registration or payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Currency {
    /// Turkish lira, the base currency
    #[sea_orm(string_value = "TRY")]
    #[serde(rename = "TRY")]
    Try,
    /// US dollar
    #[sea_orm(string_value = "USD")]
    #[serde(rename = "USD")]
    Usd,
    /// Euro
    #[sea_orm(string_value = "EUR")]
    #[serde(rename = "EUR")]
    Eur,
}

/// Payment status of a selection or a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// No money collected yet
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Money collected
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Cancelled before money arrived
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

/// Refund workflow status of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RefundStatus {
    /// No refund owed
    #[sea_orm(string_value = "none")]
    None,
    /// Refund owed, awaiting an operator decision
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Refund paid out
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Refund denied, money retained
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

/// How a registration is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment through the active gateway
    #[sea_orm(string_value = "card")]
    Card,
    /// Bank transfer confirmed by an operator
    #[sea_orm(string_value = "bank_transfer")]
    BankTransfer,
}

/// Outcome of a payment attempt in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Redirect issued, no callback yet
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Bank approved and the callback verified
    #[sea_orm(string_value = "success")]
    Success,
    /// Declined, unverifiable, or abandoned
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl TransactionStatus {
    /// `success` and `failed` never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Keyed digest scheme a gateway signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// `Base64(SHA-1(data || secret))`
    #[sea_orm(string_value = "sha1_base64")]
    Sha1Base64,
    /// `Base64(SHA-512(data || secret))`
    #[sea_orm(string_value = "sha512_base64")]
    Sha512Base64,
}
