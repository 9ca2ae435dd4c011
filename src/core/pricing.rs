//! Fee computation - early-bird resolution, discount application, and VAT.
//!
//! [`price_lines`] is pure: it takes lines whose prices and early-bird eligibility are already
//! resolved and returns VAT-inclusive totals. [`quote`] resolves those lines from the store,
//! treating stored prices as authoritative. Neither touches a discount code's usage count;
//! redemption happens in `core::discount::redeem_code` inside the registration transaction.

use crate::{
    config::CurrencyConfig,
    core::{discount, money::round2},
    entities::{
        Category, Currency, DiscountScope, DiscountType, RegistrationType, category,
        discount_code, discount_rule, registration_type,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{ConnectionTrait, EntityTrait, QueryFilter, prelude::*};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};

/// One (category, type) pair a participant wants to buy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SelectionRequest {
    /// Category the type is chosen from
    pub category_id: i64,
    /// Chosen type
    pub registration_type_id: i64,
}

/// A line with its price inputs resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingLine {
    /// Category of the line
    pub category_id: i64,
    /// Type of the line
    pub registration_type_id: i64,
    /// List price, VAT excluded
    pub list_fee: f64,
    /// Early-bird price, if the type has one in this currency
    pub early_bird_fee: Option<f64>,
    /// Whether the owning category's early-bird window is open
    pub early_bird_active: bool,
    /// VAT rate as a fraction
    pub vat_rate: f64,
}

/// A single discount rule resolved for evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscountAdjustment {
    /// Percent or fixed
    pub discount_type: DiscountType,
    /// Percentage, or amount in the pricing currency
    pub value: f64,
}

impl DiscountAdjustment {
    /// Applies the adjustment to a fee, never going below zero.
    #[must_use]
    pub fn apply(self, fee: f64) -> f64 {
        let discounted = match self.discount_type {
            DiscountType::Percent => fee * (1.0 - self.value / 100.0),
            DiscountType::Fixed => fee - self.value,
        };
        discounted.max(0.0)
    }
}

/// A validated discount code's rules keyed by category or type id.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscountSchedule {
    /// The normalized code
    pub code: String,
    /// Which id the keys refer to
    pub scope: DiscountScope,
    /// Adjustment per target id
    pub rules: HashMap<i64, DiscountAdjustment>,
}

impl DiscountSchedule {
    /// Builds the lookup from a code and its rules.
    ///
    /// Rules whose target does not match the code's scope are inert. Fixed amounts are
    /// stored in lira and divided by `exchange_rate` to price in another currency.
    #[must_use]
    pub fn build(
        code: &discount_code::Model,
        rules: &[discount_rule::Model],
        exchange_rate: f64,
    ) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| {
                let target = match code.scope {
                    DiscountScope::Category => rule.category_id,
                    DiscountScope::RegistrationType => rule.registration_type_id,
                }?;
                let value = match rule.discount_type {
                    DiscountType::Percent => rule.discount_value,
                    DiscountType::Fixed => rule.discount_value / exchange_rate,
                };
                Some((
                    target,
                    DiscountAdjustment {
                        discount_type: rule.discount_type,
                        value,
                    },
                ))
            })
            .collect();

        Self {
            code: code.code.clone(),
            scope: code.scope,
            rules,
        }
    }

    fn adjustment_for(&self, line: &PricingLine) -> Option<DiscountAdjustment> {
        let key = match self.scope {
            DiscountScope::Category => line.category_id,
            DiscountScope::RegistrationType => line.registration_type_id,
        };
        self.rules.get(&key).copied()
    }
}

/// A priced line.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    /// Category of the line
    pub category_id: i64,
    /// Type of the line
    pub registration_type_id: i64,
    /// List price before early-bird and discount
    pub original_fee: f64,
    /// Fee actually charged, VAT excluded
    pub discounted_fee: f64,
    /// VAT rate used
    pub vat_rate: f64,
    /// VAT on the discounted fee
    pub vat_amount: f64,
    /// Discounted fee plus VAT
    pub total: f64,
    /// Whether a discount rule matched
    pub discount_applied: bool,
    /// Whether the early-bird price was used
    pub early_bird_applied: bool,
}

/// The result of pricing a set of lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    /// Priced lines, in input order
    pub lines: Vec<PricedLine>,
    /// Sum of discounted fees
    pub subtotal: f64,
    /// Sum of VAT
    pub vat_total: f64,
    /// Sum of line totals
    pub grand_total: f64,
    /// The code that was evaluated, if any
    pub discount_code: Option<String>,
}

/// Prices resolved lines.
///
/// Early-bird substitutes the list fee when the window is open and the early-bird price is
/// lower. A matching discount rule then applies to that fee. VAT is always computed on the
/// post-discount fee.
pub fn price_lines(lines: &[PricingLine], discount: Option<&DiscountSchedule>) -> Result<Quote> {
    let mut priced = Vec::with_capacity(lines.len());

    for line in lines {
        if !line.list_fee.is_finite() || line.list_fee < 0.0 {
            return Err(Error::InvalidAmount {
                amount: line.list_fee,
            });
        }
        if !line.vat_rate.is_finite() || !(0.0..=1.0).contains(&line.vat_rate) {
            return Err(Error::validation(format!(
                "VAT rate {} of type {} must be between 0 and 1",
                line.vat_rate, line.registration_type_id
            )));
        }

        let early_bird = line
            .early_bird_fee
            .filter(|fee| line.early_bird_active && fee.is_finite() && *fee >= 0.0)
            .filter(|fee| *fee < line.list_fee);
        let base_fee = early_bird.unwrap_or(line.list_fee);

        let adjustment = discount.and_then(|d| d.adjustment_for(line));
        let discounted_fee = round2(adjustment.map_or(base_fee, |a| a.apply(base_fee)));
        let vat_amount = round2(discounted_fee * line.vat_rate);

        priced.push(PricedLine {
            category_id: line.category_id,
            registration_type_id: line.registration_type_id,
            original_fee: round2(line.list_fee),
            discounted_fee,
            vat_rate: line.vat_rate,
            vat_amount,
            total: round2(discounted_fee + vat_amount),
            discount_applied: adjustment.is_some(),
            early_bird_applied: early_bird.is_some(),
        });
    }

    let subtotal = round2(priced.iter().map(|l| l.discounted_fee).sum());
    let vat_total = round2(priced.iter().map(|l| l.vat_amount).sum());
    let grand_total = round2(priced.iter().map(|l| l.total).sum());

    Ok(Quote {
        lines: priced,
        subtotal,
        vat_total,
        grand_total,
        discount_code: discount.map(|d| d.code.clone()),
    })
}

impl registration_type::Model {
    /// List price in the given currency.
    #[must_use]
    pub const fn list_fee(&self, currency: Currency) -> f64 {
        match currency {
            Currency::Try => self.fee_try,
            Currency::Usd => self.fee_usd,
            Currency::Eur => self.fee_eur,
        }
    }

    /// Early-bird price in the given currency; euros have none.
    #[must_use]
    pub const fn early_bird_fee(&self, currency: Currency) -> Option<f64> {
        match currency {
            Currency::Try => self.early_bird_fee_try,
            Currency::Usd => self.early_bird_fee_usd,
            Currency::Eur => None,
        }
    }
}

/// A quote together with the rows it was resolved from.
#[derive(Debug, Clone)]
pub struct ResolvedQuote {
    /// The computed prices
    pub quote: Quote,
    /// Currency the quote is in
    pub currency: Currency,
    /// Lira per unit of `currency`
    pub exchange_rate: f64,
    /// The validated discount code, if one was supplied
    pub discount_code: Option<discount_code::Model>,
    /// Types referenced by the selections, by id
    pub types: HashMap<i64, registration_type::Model>,
    /// Categories referenced by the selections, by id
    pub categories: HashMap<i64, category::Model>,
}

/// Resolves selections against the store and prices them.
///
/// Stored list prices and VAT rates are authoritative. Each type must exist, be active,
/// and belong to the category it is selected under; a type may be selected only once.
pub async fn quote<C>(
    db: &C,
    selections: &[SelectionRequest],
    code: Option<&str>,
    currency: Currency,
    rates: &CurrencyConfig,
    now: DateTime<Utc>,
) -> Result<ResolvedQuote>
where
    C: ConnectionTrait,
{
    if selections.is_empty() {
        return Err(Error::validation("At least one selection is required"));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = selections
        .iter()
        .find(|s| !seen.insert(s.registration_type_id))
    {
        return Err(Error::validation(format!(
            "Registration type {} is selected more than once",
            dup.registration_type_id
        )));
    }

    let type_ids: Vec<i64> = selections.iter().map(|s| s.registration_type_id).collect();
    let types: HashMap<i64, registration_type::Model> = RegistrationType::find()
        .filter(registration_type::Column::Id.is_in(type_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|t| (t.id, t))
        .collect();

    let category_ids: Vec<i64> = selections.iter().map(|s| s.category_id).collect();
    let categories: HashMap<i64, category::Model> = Category::find()
        .filter(category::Column::Id.is_in(category_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    let mut lines = Vec::with_capacity(selections.len());
    for selection in selections {
        let reg_type = types
            .get(&selection.registration_type_id)
            .filter(|t| t.is_active)
            .ok_or_else(|| Error::not_found("Registration type", selection.registration_type_id))?;
        let category = categories
            .get(&selection.category_id)
            .ok_or_else(|| Error::not_found("Category", selection.category_id))?;

        if reg_type.category_id != category.id {
            return Err(Error::validation(format!(
                "Registration type {} does not belong to category {}",
                reg_type.id, category.id
            )));
        }

        lines.push(PricingLine {
            category_id: category.id,
            registration_type_id: reg_type.id,
            list_fee: reg_type.list_fee(currency),
            early_bird_fee: reg_type.early_bird_fee(currency),
            early_bird_active: category.early_bird_active_at(now),
            vat_rate: reg_type.vat_rate,
        });
    }

    let exchange_rate = currency.exchange_rate(rates);
    let (discount_code, schedule) = match code.map(str::trim).filter(|c| !c.is_empty()) {
        Some(code) => {
            let (model, rules) = discount::load_valid_code(db, code, now).await?;
            let schedule = DiscountSchedule::build(&model, &rules, exchange_rate);
            (Some(model), Some(schedule))
        }
        None => (None, None),
    };

    let quote = price_lines(&lines, schedule.as_ref())?;

    Ok(ResolvedQuote {
        quote,
        currency,
        exchange_rate,
        discount_code,
        types,
        categories,
    })
}
