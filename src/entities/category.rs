//! Category entity - Groups registration types under one registration window.
//!
//! Early-bird pricing is resolved at category granularity: every type in the category gets its
//! early-bird price while the category's window is open.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Category database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "categories")]
pub struct Model {
    /// Unique identifier for the category
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name (e.g., "Congress", "Workshops")
    pub name: String,
    /// Registration opens at this instant; None means already open
    pub registration_start: Option<DateTimeUtc>,
    /// Registration closes at this instant; None means never closes
    pub registration_end: Option<DateTimeUtc>,
    /// Master switch for early-bird pricing
    pub early_bird_enabled: bool,
    /// Early-bird window start; None means open from the beginning
    pub early_bird_start: Option<DateTimeUtc>,
    /// Early-bird window end; None means no end
    pub early_bird_end: Option<DateTimeUtc>,
    /// Whether type capacities in this category gate new selections
    pub capacity_tracking_enabled: bool,
    /// Inactive categories accept no new selections
    pub is_active: bool,
}

/// Defines relationships between Category and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One category has many registration types
    #[sea_orm(has_many = "super::registration_type::Entity")]
    RegistrationTypes,
}

impl Related<super::registration_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RegistrationTypes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the early-bird window is open at `now`.
    #[must_use]
    pub fn early_bird_active_at(&self, now: DateTimeUtc) -> bool {
        self.early_bird_enabled && within(now, self.early_bird_start, self.early_bird_end)
    }

    /// Whether registration is open at `now`.
    #[must_use]
    pub fn registration_open_at(&self, now: DateTimeUtc) -> bool {
        self.is_active && within(now, self.registration_start, self.registration_end)
    }
}

fn within(now: DateTimeUtc, start: Option<DateTimeUtc>, end: Option<DateTimeUtc>) -> bool {
    start.is_none_or(|s| now >= s) && end.is_none_or(|e| now <= e)
}
