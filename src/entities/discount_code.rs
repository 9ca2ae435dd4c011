//! Discount code entity - A redeemable code whose rules key off categories or types.

use super::sea_orm_active_enums::DiscountScope;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discount code database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_codes")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// The code itself, stored upper-case so lookups are case-insensitive
    #[sea_orm(unique)]
    pub code: String,
    /// Which id the rules of this code target
    pub scope: DiscountScope,
    /// Code is valid from this instant; None means no lower bound
    pub valid_from: Option<DateTimeUtc>,
    /// Code is valid until this instant; None means no upper bound
    pub valid_until: Option<DateTimeUtc>,
    /// Maximum number of redemptions; None means unlimited
    pub usage_limit: Option<i32>,
    /// Number of committed redemptions
    pub used_count: i32,
    /// Manually disabled codes are rejected like expired ones
    pub is_active: bool,
    /// When the code was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between `DiscountCode` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One code has many rules
    #[sea_orm(has_many = "super::discount_rule::Entity")]
    Rules,
}

impl Related<super::discount_rule::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rules.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
