//! Discount rule entity - One percent or fixed reduction attached to a discount code.
//!
//! Exactly one of `category_id` and `registration_type_id` is set, matching the code's scope.

use super::sea_orm_active_enums::DiscountType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discount rule database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "discount_rules")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning code
    pub discount_code_id: i64,
    /// Target category, for category-scoped codes
    pub category_id: Option<i64>,
    /// Target type, for type-scoped codes
    pub registration_type_id: Option<i64>,
    /// Percent or fixed
    pub discount_type: DiscountType,
    /// Percentage (0-100) or lira amount
    pub discount_value: f64,
}

/// Defines relationships between `DiscountRule` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each rule belongs to one code and is deleted with it
    #[sea_orm(
        belongs_to = "super::discount_code::Entity",
        from = "Column::DiscountCodeId",
        to = "super::discount_code::Column::Id",
        on_delete = "Cascade"
    )]
    DiscountCode,
}

impl Related<super::discount_code::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DiscountCode.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
