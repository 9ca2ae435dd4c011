//! Discount code business logic - lookup, validity checks, redemption, and creation.
//!
//! Codes are stored upper-case so every lookup is case-insensitive. A code is only ever
//! redeemed by [`redeem_code`], which must run inside the transaction that commits the
//! registration consuming it.

use crate::{
    entities::{DiscountCode, DiscountRule, DiscountScope, DiscountType, discount_code, discount_rule},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Condition, Set, TransactionTrait, prelude::*, sea_query::Expr};
use serde::Deserialize;

/// Normalizes user input to the stored form of a code.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Why a code cannot be used right now, if it cannot.
#[must_use]
pub fn rejection_reason(code: &discount_code::Model, now: DateTime<Utc>) -> Option<Error> {
    let in_window = code.valid_from.is_none_or(|from| now >= from)
        && code.valid_until.is_none_or(|until| now <= until);

    if !code.is_active || !in_window {
        return Some(Error::DiscountCodeInactive {
            code: code.code.clone(),
        });
    }

    if code.usage_limit.is_some_and(|limit| code.used_count >= limit) {
        return Some(Error::DiscountCodeLimitReached {
            code: code.code.clone(),
        });
    }

    None
}

/// Finds a code by its case-insensitive text.
pub async fn find_code<C>(db: &C, code: &str) -> Result<Option<discount_code::Model>>
where
    C: ConnectionTrait,
{
    DiscountCode::find()
        .filter(discount_code::Column::Code.eq(normalize_code(code)))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads a code and its rules, rejecting codes that are unknown, outside their validity
/// window, disabled, or at their usage limit.
pub async fn load_valid_code<C>(
    db: &C,
    code: &str,
    now: DateTime<Utc>,
) -> Result<(discount_code::Model, Vec<discount_rule::Model>)>
where
    C: ConnectionTrait,
{
    let model = find_code(db, code)
        .await?
        .ok_or_else(|| Error::DiscountCodeNotFound {
            code: normalize_code(code),
        })?;

    if let Some(reason) = rejection_reason(&model, now) {
        return Err(reason);
    }

    let rules = DiscountRule::find()
        .filter(discount_rule::Column::DiscountCodeId.eq(model.id))
        .all(db)
        .await?;

    Ok((model, rules))
}

/// Consumes one use of a code.
///
/// The increment is conditional on the limit in the same statement, so two concurrent
/// redemptions of the last use cannot both succeed.
pub async fn redeem_code<C>(db: &C, code: &discount_code::Model) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = DiscountCode::update_many()
        .col_expr(
            discount_code::Column::UsedCount,
            Expr::col(discount_code::Column::UsedCount).add(1),
        )
        .filter(discount_code::Column::Id.eq(code.id))
        .filter(
            Condition::any()
                .add(discount_code::Column::UsageLimit.is_null())
                .add(
                    Expr::col(discount_code::Column::UsedCount)
                        .lt(Expr::col(discount_code::Column::UsageLimit)),
                ),
        )
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::DiscountCodeLimitReached {
            code: code.code.clone(),
        });
    }

    tracing::info!(code = %code.code, "Discount code redeemed");
    Ok(())
}

/// A rule to attach to a new code.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDiscountRule {
    /// Category id or type id, depending on the code's scope
    pub target_id: i64,
    /// Percent or fixed
    pub discount_type: DiscountType,
    /// Percentage (0-100) or lira amount
    pub discount_value: f64,
}

/// A code to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDiscountCode {
    /// Code text; normalized to upper-case
    pub code: String,
    /// Category or type
    pub scope: DiscountScope,
    /// Start of the validity window
    pub valid_from: Option<DateTime<Utc>>,
    /// End of the validity window
    pub valid_until: Option<DateTime<Utc>>,
    /// Maximum redemptions
    pub usage_limit: Option<i32>,
    /// At least one rule
    pub rules: Vec<NewDiscountRule>,
}

/// Creates a code with its rules in one transaction.
///
/// Each rule's target is stored in the column matching the code's scope, so a created code
/// never carries rules of the wrong scope.
pub async fn create_discount_code(
    db: &DatabaseConnection,
    new_code: NewDiscountCode,
) -> Result<discount_code::Model> {
    let code = normalize_code(&new_code.code);
    if code.is_empty() {
        return Err(Error::validation("Discount code cannot be empty"));
    }
    if new_code.rules.is_empty() {
        return Err(Error::validation("A discount code needs at least one rule"));
    }
    if new_code.usage_limit.is_some_and(|limit| limit <= 0) {
        return Err(Error::validation("Usage limit must be positive"));
    }
    if let (Some(from), Some(until)) = (new_code.valid_from, new_code.valid_until) {
        if from > until {
            return Err(Error::validation("Validity window ends before it starts"));
        }
    }
    for rule in &new_code.rules {
        let valid = rule.discount_value.is_finite()
            && rule.discount_value >= 0.0
            && (rule.discount_type == DiscountType::Fixed || rule.discount_value <= 100.0);
        if !valid {
            return Err(Error::InvalidAmount {
                amount: rule.discount_value,
            });
        }
    }

    let txn = db.begin().await?;

    if find_code(&txn, &code).await?.is_some() {
        return Err(Error::Conflict {
            message: format!("Discount code '{code}' already exists"),
        });
    }

    let created = discount_code::ActiveModel {
        code: Set(code),
        scope: Set(new_code.scope),
        valid_from: Set(new_code.valid_from),
        valid_until: Set(new_code.valid_until),
        usage_limit: Set(new_code.usage_limit),
        used_count: Set(0),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    for rule in new_code.rules {
        let (category_id, registration_type_id) = match new_code.scope {
            DiscountScope::Category => (Some(rule.target_id), None),
            DiscountScope::RegistrationType => (None, Some(rule.target_id)),
        };
        discount_rule::ActiveModel {
            discount_code_id: Set(created.id),
            category_id: Set(category_id),
            registration_type_id: Set(registration_type_id),
            discount_type: Set(rule.discount_type),
            discount_value: Set(rule.discount_value),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
    }

    txn.commit().await?;
    tracing::info!(code = %created.code, scope = ?created.scope, "Discount code created");
    Ok(created)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_create_discount_code_validation() -> Result<()> {
        let db = setup_test_db().await?;

        let empty = NewDiscountCode {
            code: "  ".to_string(),
            scope: DiscountScope::Category,
            valid_from: None,
            valid_until: None,
            usage_limit: None,
            rules: vec![],
        };
        assert!(matches!(
            create_discount_code(&db, empty).await,
            Err(Error::Validation { .. })
        ));

        let bad_percent = NewDiscountCode {
            code: "BIG".to_string(),
            scope: DiscountScope::Category,
            valid_from: None,
            valid_until: None,
            usage_limit: None,
            rules: vec![NewDiscountRule {
                target_id: 1,
                discount_type: DiscountType::Percent,
                discount_value: 120.0,
            }],
        };
        assert!(matches!(
            create_discount_code(&db, bad_percent).await,
            Err(Error::InvalidAmount { .. })
        ));

        // Validation fails before anything is written.
        assert!(DiscountCode::find().all(&db).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_lookup_is_case_insensitive() -> Result<()> {
        let (db, _category, reg_type) = setup_with_type(None).await?;
        create_type_scoped_code(&db, "Early25", reg_type.id, DiscountType::Percent, 25.0)
            .await?;

        let found = find_code(&db, "early25").await?.unwrap();
        assert_eq!(found.code, "EARLY25");
        let (_, rules) = load_valid_code(&db, "eArLy25", Utc::now()).await?;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].registration_type_id, Some(reg_type.id));
        assert_eq!(rules[0].category_id, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_code_conflicts() -> Result<()> {
        let (db, _category, reg_type) = setup_with_type(None).await?;
        create_type_scoped_code(&db, "DUP", reg_type.id, DiscountType::Fixed, 10.0).await?;
        let result =
            create_type_scoped_code(&db, "dup", reg_type.id, DiscountType::Fixed, 10.0).await;
        assert!(matches!(result, Err(Error::Conflict { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_expired_code_is_rejected() -> Result<()> {
        let (db, _category, reg_type) = setup_with_type(None).await?;
        let now = Utc::now();
        create_discount_code(
            &db,
            NewDiscountCode {
                code: "OLD".to_string(),
                scope: DiscountScope::RegistrationType,
                valid_from: Some(now - Duration::days(10)),
                valid_until: Some(now - Duration::days(1)),
                usage_limit: None,
                rules: vec![NewDiscountRule {
                    target_id: reg_type.id,
                    discount_type: DiscountType::Percent,
                    discount_value: 10.0,
                }],
            },
        )
        .await?;

        let result = load_valid_code(&db, "old", now).await;
        assert!(matches!(result, Err(Error::DiscountCodeInactive { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_usage_limit_enforced() -> Result<()> {
        let (db, _category, reg_type) = setup_with_type(None).await?;
        let code = create_limited_code(&db, "ONCE", reg_type.id, 1).await?;

        load_valid_code(&db, "once", Utc::now()).await?;
        redeem_code(&db, &code).await?;

        let after = find_code(&db, "ONCE").await?.unwrap();
        assert_eq!(after.used_count, 1);
        assert!(matches!(
            load_valid_code(&db, "once", Utc::now()).await,
            Err(Error::DiscountCodeLimitReached { .. })
        ));
        assert!(matches!(
            redeem_code(&db, &code).await,
            Err(Error::DiscountCodeLimitReached { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_unlimited_code_never_hits_limit() -> Result<()> {
        let (db, _category, reg_type) = setup_with_type(None).await?;
        let code =
            create_type_scoped_code(&db, "OPEN", reg_type.id, DiscountType::Percent, 5.0).await?;

        for _ in 0..25 {
            redeem_code(&db, &code).await?;
        }
        let after = find_code(&db, "OPEN").await?.unwrap();
        assert_eq!(after.used_count, 25);
        assert!(rejection_reason(&after, Utc::now()).is_none());
        Ok(())
    }
}
