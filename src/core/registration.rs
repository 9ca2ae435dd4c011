//! Registration business logic - creation, payment confirmation, and aggregate totals.
//!
//! A registration's `total_fee`, `vat_amount` and `grand_total` always equal the sums over its
//! financially live selections. Every operation that touches a selection ends by calling
//! [`recompute_totals`] inside the same transaction.

use crate::{
    config::CurrencyConfig,
    core::{
        audit::{self, AuditEntry},
        capacity, discount, ledger,
        money::{round2, same_amount},
        pricing::{self, SelectionRequest},
        selection::{self, SelectionState, Stamps},
    },
    entities::{
        Currency, PaymentMethod, PaymentStatus, Registration, RegistrationSelection, RefundStatus,
        TransactionStatus, registration, registration_selection,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const REGISTRATION_TABLE: &str = "registrations";
const SELECTION_TABLE: &str = "registration_selections";

/// How the participant pays.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum PaymentChoice {
    /// Already paid by card; `order_id` names the successful ledger row
    Card { order_id: String },
    /// Pays later by transfer; an operator confirms receipt
    BankTransfer,
}

impl PaymentChoice {
    const fn method(&self) -> PaymentMethod {
        match self {
            Self::Card { .. } => PaymentMethod::Card,
            Self::BankTransfer => PaymentMethod::BankTransfer,
        }
    }
}

/// A registration to create.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRegistration {
    /// Participant name
    pub full_name: String,
    /// Participant email, stored lower-cased
    pub email: String,
    /// Currency the participant pays in
    pub currency: Currency,
    /// Lines to buy; each type at most once
    pub selections: Vec<SelectionRequest>,
    /// Discount code, as typed
    pub discount_code: Option<String>,
    /// Card payment already made, or bank transfer
    pub payment: PaymentChoice,
}

/// A registration with its selections.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationDetails {
    /// Registration row
    pub registration: registration::Model,
    /// Its selections, oldest first
    pub selections: Vec<registration_selection::Model>,
}

/// Aggregate amounts over a registration's live selections.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    /// Applied fees, VAT excluded
    pub total_fee: f64,
    /// VAT over the applied fees
    pub vat_amount: f64,
    /// Fees plus VAT
    pub grand_total: f64,
}

impl Totals {
    fn matches(&self, model: &registration::Model) -> bool {
        same_amount(self.total_fee, model.total_fee)
            && same_amount(self.vat_amount, model.vat_amount)
            && same_amount(self.grand_total, model.grand_total)
    }
}

/// Generates a participant-facing reference such as `REG-20260101-1A2B3C`.
#[must_use]
pub fn generate_reference_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("REG-{}-{}", now.format("%Y%m%d"), suffix[..6].to_uppercase())
}

/// Sums the financially live selections.
///
/// Fails on a row whose status columns form an unreachable state, so a corrupt row aborts
/// the enclosing transaction rather than skewing the totals.
pub fn compute_totals(selections: &[registration_selection::Model]) -> Result<Totals> {
    let mut totals = Totals::default();
    for row in selections {
        if SelectionState::from_row(row)?.is_financially_live() {
            totals.total_fee += row.applied_fee;
            totals.vat_amount += row.vat_amount;
            totals.grand_total += row.total_amount;
        }
    }
    Ok(Totals {
        total_fee: round2(totals.total_fee),
        vat_amount: round2(totals.vat_amount),
        grand_total: round2(totals.grand_total),
    })
}

async fn selections_of<C>(db: &C, registration_id: i64) -> Result<Vec<registration_selection::Model>>
where
    C: ConnectionTrait,
{
    RegistrationSelection::find()
        .filter(registration_selection::Column::RegistrationId.eq(registration_id))
        .order_by_asc(registration_selection::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Rewrites a registration's totals from its selections. Running it twice changes nothing.
pub async fn recompute_totals<C>(
    db: &C,
    registration_id: i64,
    actor: Option<&str>,
) -> Result<registration::Model>
where
    C: ConnectionTrait,
{
    let current = Registration::find_by_id(registration_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Registration", registration_id))?;

    let totals = compute_totals(&selections_of(db, registration_id).await?)?;
    if totals.matches(&current) {
        return Ok(current);
    }

    let mut model: registration::ActiveModel = current.clone().into();
    model.total_fee = Set(totals.total_fee);
    model.vat_amount = Set(totals.vat_amount);
    model.grand_total = Set(totals.grand_total);
    model.updated_at = Set(Utc::now());
    let updated = model.update(db).await?;

    audit::record(
        db,
        AuditEntry::change(
            REGISTRATION_TABLE,
            registration_id,
            "recompute_totals",
            actor,
            Some(&current),
            &updated,
        )?,
    )
    .await?;

    tracing::debug!(
        registration_id,
        old_total = current.grand_total,
        new_total = updated.grand_total,
        "Registration totals recomputed"
    );
    Ok(updated)
}

fn validate_participant(request: &NewRegistration) -> Result<()> {
    if request.full_name.trim().is_empty() {
        return Err(Error::validation("Full name is required"));
    }
    let email = request.email.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(Error::validation("A valid e-mail address is required"));
    }
    Ok(())
}

async fn check_card_payment<C>(db: &C, order_id: &str, currency: Currency, grand_total: f64) -> Result<()>
where
    C: ConnectionTrait,
{
    let attempt = ledger::find(db, order_id)
        .await?
        .ok_or_else(|| Error::PaymentMismatch {
            message: format!("payment {order_id} does not exist"),
        })?;

    if attempt.status != TransactionStatus::Success {
        return Err(Error::PaymentMismatch {
            message: format!("payment {order_id} did not succeed"),
        });
    }
    if attempt.registration_id.is_some() {
        return Err(Error::PaymentMismatch {
            message: format!("payment {order_id} already paid for another registration"),
        });
    }
    if attempt.currency != currency {
        return Err(Error::PaymentMismatch {
            message: format!(
                "payment {order_id} was made in {}, registration is in {}",
                attempt.currency.code(),
                currency.code()
            ),
        });
    }
    if !same_amount(attempt.amount, grand_total) {
        return Err(Error::PaymentMismatch {
            message: format!(
                "payment {order_id} was for {:.2}, registration costs {grand_total:.2}",
                attempt.amount
            ),
        });
    }
    Ok(())
}

/// Creates a registration and its selections in one transaction.
///
/// Prices come from the store, never from the caller. The discount code is redeemed, each
/// selection takes a seat, and a card payment is linked to the new registration; if any step
/// fails nothing is committed.
pub async fn create_registration(
    db: &DatabaseConnection,
    rates: &CurrencyConfig,
    request: NewRegistration,
    actor: Option<&str>,
) -> Result<RegistrationDetails> {
    validate_participant(&request)?;
    let now = Utc::now();

    let txn = db.begin().await?;

    let resolved = pricing::quote(
        &txn,
        &request.selections,
        request.discount_code.as_deref(),
        request.currency,
        rates,
        now,
    )
    .await?;

    for category in resolved.categories.values() {
        if !category.is_active || !category.registration_open_at(now) {
            return Err(Error::RegistrationClosed {
                category_id: category.id,
            });
        }
    }

    if let Some(code) = &resolved.discount_code {
        discount::redeem_code(&txn, code).await?;
    }

    let (payment_status, initial_state, order_id) = match &request.payment {
        PaymentChoice::Card { order_id } => {
            check_card_payment(&txn, order_id, request.currency, resolved.quote.grand_total).await?;
            (
                PaymentStatus::Completed,
                SelectionState::ActiveCompleted,
                Some(order_id.clone()),
            )
        }
        PaymentChoice::BankTransfer => (PaymentStatus::Pending, SelectionState::ActivePending, None),
    };

    let created = registration::ActiveModel {
        reference_number: Set(generate_reference_number(now)),
        full_name: Set(request.full_name.trim().to_string()),
        email: Set(request.email.trim().to_lowercase()),
        currency: Set(request.currency),
        payment_method: Set(request.payment.method()),
        payment_status: Set(payment_status),
        discount_code: Set(resolved.discount_code.as_ref().map(|c| c.code.clone())),
        order_id: Set(order_id.clone()),
        total_fee: Set(0.0),
        vat_amount: Set(0.0),
        grand_total: Set(0.0),
        payment_confirmed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    let mut selections = Vec::with_capacity(resolved.quote.lines.len());
    for line in &resolved.quote.lines {
        let enforce = resolved
            .categories
            .get(&line.category_id)
            .is_some_and(|c| c.capacity_tracking_enabled);
        capacity::reserve(&txn, line.registration_type_id, enforce).await?;

        let mut row = registration_selection::ActiveModel {
            registration_id: Set(created.id),
            category_id: Set(line.category_id),
            registration_type_id: Set(line.registration_type_id),
            original_fee: Set(line.original_fee),
            applied_fee: Set(line.discounted_fee),
            vat_rate: Set(line.vat_rate),
            vat_amount: Set(line.vat_amount),
            total_amount: Set(line.total),
            currency: Set(resolved.currency),
            exchange_rate: Set(resolved.exchange_rate),
            discount_applied: Set(line.discount_applied),
            refund_status: Set(RefundStatus::None),
            cancelled_at: Set(None),
            refund_requested_at: Set(None),
            refund_processed_at: Set(None),
            refund_notes: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        initial_state.write_to(&mut row);
        let inserted = row.insert(&txn).await?;

        audit::record(
            &txn,
            AuditEntry::change::<registration_selection::Model>(
                SELECTION_TABLE,
                inserted.id,
                "create",
                actor,
                None,
                &inserted,
            )?,
        )
        .await?;
        selections.push(inserted);
    }

    if let Some(order_id) = &order_id {
        ledger::link_to_registration(&txn, order_id, created.id).await?;
    }

    let registration = recompute_totals(&txn, created.id, actor).await?;
    audit::record(
        &txn,
        AuditEntry::change::<registration::Model>(
            REGISTRATION_TABLE,
            registration.id,
            "create",
            actor,
            None,
            &registration,
        )?,
    )
    .await?;

    txn.commit().await?;

    tracing::info!(
        registration_id = registration.id,
        reference = %registration.reference_number,
        selections = selections.len(),
        grand_total = registration.grand_total,
        currency = registration.currency.code(),
        method = ?registration.payment_method,
        "Registration created"
    );

    Ok(RegistrationDetails {
        registration,
        selections,
    })
}

/// Records an operator's confirmation that a registration's payment arrived.
///
/// Every unpaid selection becomes paid. Once confirmed, cancellations on the registration can
/// no longer be undone.
pub async fn confirm_registration_payment(
    db: &DatabaseConnection,
    registration_id: i64,
    actor: Option<&str>,
) -> Result<RegistrationDetails> {
    let txn = db.begin().await?;

    let current = Registration::find_by_id(registration_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Registration", registration_id))?;

    if current.payment_confirmed_at.is_some() {
        return Err(Error::Conflict {
            message: format!("registration {registration_id} payment is already confirmed"),
        });
    }
    if current.payment_status == PaymentStatus::Cancelled {
        return Err(Error::Conflict {
            message: format!("registration {registration_id} is cancelled"),
        });
    }

    for row in selections_of(&txn, registration_id).await? {
        if SelectionState::from_row(&row)? == SelectionState::ActivePending {
            selection::write_state(
                &txn,
                &row,
                SelectionState::ActiveCompleted,
                Stamps::default(),
                "confirm_payment",
                actor,
            )
            .await?;
        }
    }

    let now = Utc::now();
    let mut model: registration::ActiveModel = current.clone().into();
    model.payment_status = Set(PaymentStatus::Completed);
    model.payment_confirmed_at = Set(Some(now));
    model.updated_at = Set(now);
    let confirmed = model.update(&txn).await?;

    audit::record(
        &txn,
        AuditEntry::change(
            REGISTRATION_TABLE,
            registration_id,
            "confirm_payment",
            actor,
            Some(&current),
            &confirmed,
        )?,
    )
    .await?;

    let registration = recompute_totals(&txn, registration_id, actor).await?;
    let selections = selections_of(&txn, registration_id).await?;
    txn.commit().await?;

    tracing::info!(registration_id, actor = ?actor, "Registration payment confirmed");
    Ok(RegistrationDetails {
        registration,
        selections,
    })
}

/// Loads a registration with its selections, oldest selection first.
pub async fn get_registration_with_selections<C>(db: &C, registration_id: i64) -> Result<RegistrationDetails>
where
    C: ConnectionTrait,
{
    let registration = Registration::find_by_id(registration_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Registration", registration_id))?;
    let selections = selections_of(db, registration_id).await?;
    Ok(RegistrationDetails {
        registration,
        selections,
    })
}
