//! Registration type entity - A purchasable item inside a category.
//!
//! Carries list prices in three currencies, an optional early-bird price pair, a VAT rate and
//! the capacity counter maintained by `core::capacity`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Registration type database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "registration_types")]
pub struct Model {
    /// Unique identifier for the type
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning category
    pub category_id: i64,
    /// Display name (e.g., "Full Congress - Physician")
    pub name: String,
    /// List price in Turkish lira, VAT excluded
    pub fee_try: f64,
    /// List price in US dollars, VAT excluded
    pub fee_usd: f64,
    /// List price in euros, VAT excluded
    pub fee_eur: f64,
    /// Early-bird price in lira, if the type has one
    pub early_bird_fee_try: Option<f64>,
    /// Early-bird price in dollars, if the type has one
    pub early_bird_fee_usd: Option<f64>,
    /// VAT rate as a fraction (0.20 for 20%)
    pub vat_rate: f64,
    /// Maximum number of live selections; None means unlimited
    pub capacity: Option<i32>,
    /// Number of selections currently holding a seat
    pub current_registrations: i32,
    /// Inactive types accept no new selections
    pub is_active: bool,
}

/// Defines relationships between `RegistrationType` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each type belongs to one category
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
