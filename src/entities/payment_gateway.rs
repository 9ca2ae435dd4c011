//! Payment gateway entity - Configuration of one bank integration.
//!
//! The merchant secret is stored encrypted; see `core::hashing::SecretCipher`.

use super::sea_orm_active_enums::HashAlgorithm;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment gateway database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payment_gateways")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Operator-facing name, copied onto ledger rows
    #[sea_orm(unique)]
    pub name: String,
    /// Bank identifier (e.g., "ziraat")
    pub bank_code: String,
    /// Merchant / client id assigned by the bank
    pub shop_id: String,
    /// Base64 nonce and ciphertext of the store key
    #[serde(skip_serializing)]
    pub encrypted_secret: String,
    /// Digest scheme the bank expects
    pub hash_algorithm: HashAlgorithm,
    /// Post to `test_url` instead of `production_url`
    pub test_mode: bool,
    /// Bank test endpoint
    pub test_url: String,
    /// Bank production endpoint
    pub production_url: String,
    /// Exactly one gateway is active at a time
    pub is_active: bool,
    /// When the configuration was last modified
    pub updated_at: DateTimeUtc,
}

/// `PaymentGateway` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Endpoint the signed form posts to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        if self.test_mode {
            &self.test_url
        } else {
            &self.production_url
        }
    }
}
