//! Capacity tracking - per-type occupancy counters that gate new selections.
//!
//! `reserve` runs once per selection creation and `release` once per cancellation. Refund
//! decisions never touch the counter. Both are single conditional `UPDATE` statements, in the
//! same style as an atomic balance update: the database evaluates the precondition and the
//! increment together, so concurrent writers cannot both take the last seat.

use crate::{
    entities::{RegistrationType, registration_type},
    errors::{Error, Result},
};
use sea_orm::{Condition, QuerySelect, prelude::*, sea_query::Expr};

/// Whether a type can take one more selection.
#[must_use]
pub fn is_available(reg_type: &registration_type::Model) -> bool {
    reg_type
        .capacity
        .is_none_or(|capacity| reg_type.current_registrations < capacity)
}

/// Seats left on a type; None when the type is unlimited.
#[must_use]
pub fn remaining(reg_type: &registration_type::Model) -> Option<i32> {
    reg_type
        .capacity
        .map(|capacity| (capacity - reg_type.current_registrations).max(0))
}

/// Locks and reads a type row for the rest of the transaction.
///
/// On engines with row locks this is `SELECT ... FOR UPDATE`; elsewhere the conditional
/// updates below carry the guarantee on their own.
pub async fn lock_type<C>(db: &C, type_id: i64) -> Result<registration_type::Model>
where
    C: ConnectionTrait,
{
    RegistrationType::find_by_id(type_id)
        .lock_exclusive()
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Registration type", type_id))
}

/// Takes one seat on a type.
///
/// When `enforce` is false (the owning category does not track capacity) the counter still
/// moves but never refuses.
pub async fn reserve<C>(db: &C, type_id: i64, enforce: bool) -> Result<()>
where
    C: ConnectionTrait,
{
    let reg_type = lock_type(db, type_id).await?;
    if enforce && !is_available(&reg_type) {
        return Err(Error::CapacityExhausted { type_id });
    }

    let mut update = RegistrationType::update_many()
        .col_expr(
            registration_type::Column::CurrentRegistrations,
            Expr::col(registration_type::Column::CurrentRegistrations).add(1),
        )
        .filter(registration_type::Column::Id.eq(type_id));

    if enforce {
        update = update.filter(
            Condition::any()
                .add(registration_type::Column::Capacity.is_null())
                .add(
                    Expr::col(registration_type::Column::CurrentRegistrations)
                        .lt(Expr::col(registration_type::Column::Capacity)),
                ),
        );
    }

    if update.exec(db).await?.rows_affected == 0 {
        return Err(Error::CapacityExhausted { type_id });
    }

    tracing::debug!(type_id, "Capacity reserved");
    Ok(())
}

/// Gives back one seat on a type, never going below zero.
pub async fn release<C>(db: &C, type_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    lock_type(db, type_id).await?;

    RegistrationType::update_many()
        .col_expr(
            registration_type::Column::CurrentRegistrations,
            Expr::col(registration_type::Column::CurrentRegistrations).sub(1),
        )
        .filter(registration_type::Column::Id.eq(type_id))
        .filter(registration_type::Column::CurrentRegistrations.gt(0))
        .exec(db)
        .await?;

    tracing::debug!(type_id, "Capacity released");
    Ok(())
}
