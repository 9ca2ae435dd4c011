//! Selection lifecycle - the payment, cancellation, and refund state machine.
//!
//! A selection row stores three status columns, but only six combinations are reachable.
//! [`SelectionState`] names exactly those six; every status write goes through a transition
//! function on it, so an illegal combination can only come from outside this module and is
//! reported as [`Error::CorruptState`] when read.
//!
//! ```text
//! ActivePending --confirm--> ActiveCompleted --cancel--> RefundPending --approve--> RefundCompleted
//!       |                          ^                           |
//!     cancel                       +---------undo--------------+--reject--> RefundRejected
//!       v
//! CancelledUnpaid
//! ```
//!
//! Each store operation runs in one transaction: lock and re-read the row, check the
//! transition, adjust capacity, write with an optimistic guard on the old status columns,
//! recompute the registration totals, and record the audit images.

use crate::{
    core::{audit::AuditEntry, capacity, registration},
    entities::{
        Category, PaymentStatus, RefundStatus, Registration, RegistrationSelection, registration as reg_entity,
        registration_selection,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{QuerySelect, Set, TransactionTrait, prelude::*};
use serde::{Deserialize, Serialize};

const SELECTION_TABLE: &str = "registration_selections";

/// The reachable composite states of a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionState {
    /// Active, no money collected yet
    ActivePending,
    /// Active and paid
    ActiveCompleted,
    /// Cancelled before money arrived; nothing to refund
    CancelledUnpaid,
    /// Cancelled after money arrived; refund owed
    RefundPending,
    /// Refund paid out; terminal
    RefundCompleted,
    /// Refund denied; money retained
    RefundRejected,
}

impl SelectionState {
    /// Reads the state from a row's status columns.
    pub fn from_row(row: &registration_selection::Model) -> Result<Self> {
        Self::from_columns(row.payment_status, row.is_cancelled, row.refund_status).ok_or_else(
            || Error::CorruptState {
                message: format!(
                    "selection {} has unreachable status ({:?}, cancelled={}, refund={:?})",
                    row.id, row.payment_status, row.is_cancelled, row.refund_status
                ),
            },
        )
    }

    /// Maps stored columns to a state, if the combination is reachable.
    #[must_use]
    pub const fn from_columns(
        payment: PaymentStatus,
        is_cancelled: bool,
        refund: RefundStatus,
    ) -> Option<Self> {
        match (payment, is_cancelled, refund) {
            (PaymentStatus::Pending, false, RefundStatus::None) => Some(Self::ActivePending),
            (PaymentStatus::Completed, false, RefundStatus::None) => Some(Self::ActiveCompleted),
            (PaymentStatus::Cancelled, true, RefundStatus::None) => Some(Self::CancelledUnpaid),
            (PaymentStatus::Completed, true, RefundStatus::Pending) => Some(Self::RefundPending),
            (PaymentStatus::Completed, true, RefundStatus::Completed) => {
                Some(Self::RefundCompleted)
            }
            (PaymentStatus::Completed, true, RefundStatus::Rejected) => Some(Self::RefundRejected),
            _ => None,
        }
    }

    /// The stored form of this state: `(payment_status, is_cancelled, refund_status)`.
    #[must_use]
    pub const fn columns(self) -> (PaymentStatus, bool, RefundStatus) {
        match self {
            Self::ActivePending => (PaymentStatus::Pending, false, RefundStatus::None),
            Self::ActiveCompleted => (PaymentStatus::Completed, false, RefundStatus::None),
            Self::CancelledUnpaid => (PaymentStatus::Cancelled, true, RefundStatus::None),
            Self::RefundPending => (PaymentStatus::Completed, true, RefundStatus::Pending),
            Self::RefundCompleted => (PaymentStatus::Completed, true, RefundStatus::Completed),
            Self::RefundRejected => (PaymentStatus::Completed, true, RefundStatus::Rejected),
        }
    }

    /// Sets the status columns of `row` to this state.
    pub fn write_to(self, row: &mut registration_selection::ActiveModel) {
        let (payment_status, is_cancelled, refund_status) = self.columns();
        row.payment_status = Set(payment_status);
        row.is_cancelled = Set(is_cancelled);
        row.refund_status = Set(refund_status);
    }

    /// Human-readable name used in error messages.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ActivePending => "active and unpaid",
            Self::ActiveCompleted => "active and paid",
            Self::CancelledUnpaid => "cancelled before payment",
            Self::RefundPending => "awaiting a refund decision",
            Self::RefundCompleted => "refunded",
            Self::RefundRejected => "refund-rejected",
        }
    }

    /// Whether the line still counts toward the registration's totals.
    ///
    /// Money that has not actually been returned still counts: only a completed refund, or a
    /// cancellation before any money arrived, removes the line.
    #[must_use]
    pub const fn is_financially_live(self) -> bool {
        matches!(
            self,
            Self::ActivePending | Self::ActiveCompleted | Self::RefundPending | Self::RefundRejected
        )
    }

    /// Whether the line occupies a seat on its registration type.
    #[must_use]
    pub const fn holds_seat(self) -> bool {
        matches!(self, Self::ActivePending | Self::ActiveCompleted)
    }

    const fn illegal(self, action: &'static str) -> Error {
        Error::IllegalTransition {
            action,
            state: self.name(),
        }
    }

    /// Payment for the line arrived.
    pub const fn confirm_payment(self) -> Result<Self> {
        match self {
            Self::ActivePending => Ok(Self::ActiveCompleted),
            other => Err(other.illegal("confirm payment for")),
        }
    }

    /// The line is cancelled; a refund is owed only if money was collected.
    pub const fn cancel(self) -> Result<Self> {
        match self {
            Self::ActivePending => Ok(Self::CancelledUnpaid),
            Self::ActiveCompleted => Ok(Self::RefundPending),
            other => Err(other.illegal("cancel")),
        }
    }

    /// The owed refund was paid out.
    pub const fn approve_refund(self) -> Result<Self> {
        match self {
            Self::RefundPending => Ok(Self::RefundCompleted),
            other => Err(other.illegal("approve a refund for")),
        }
    }

    /// The owed refund was denied.
    pub const fn reject_refund(self) -> Result<Self> {
        match self {
            Self::RefundPending => Ok(Self::RefundRejected),
            other => Err(other.illegal("reject a refund for")),
        }
    }

    /// Reverts a cancellation whose refund is still pending.
    ///
    /// Refused once an operator has confirmed the registration's payment, and always refused
    /// after a refund completed: the participant must register again.
    pub const fn undo_cancel(self, registration_confirmed: bool) -> Result<Self> {
        match self {
            Self::RefundPending if !registration_confirmed => Ok(Self::ActiveCompleted),
            Self::RefundPending => Err(Error::IllegalTransition {
                action: "undo the cancellation of",
                state: "on a registration whose payment was confirmed by an operator",
            }),
            other => Err(other.illegal("undo the cancellation of")),
        }
    }
}

/// Operator decision on a pending refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundDecision {
    /// Pay the refund
    Approve,
    /// Keep the money
    Reject,
}

/// Timestamp and note changes that accompany a transition.
#[derive(Debug, Clone, Default)]
pub(crate) struct Stamps {
    pub cancelled_at: Option<Option<DateTime<Utc>>>,
    pub refund_requested_at: Option<Option<DateTime<Utc>>>,
    pub refund_processed_at: Option<Option<DateTime<Utc>>>,
    pub refund_notes: Option<Option<String>>,
}

impl Stamps {
    fn for_transition(from: SelectionState, to: SelectionState, now: DateTime<Utc>) -> Self {
        match (from, to) {
            (_, SelectionState::CancelledUnpaid) => Self {
                cancelled_at: Some(Some(now)),
                ..Self::default()
            },
            (_, SelectionState::RefundPending) => Self {
                cancelled_at: Some(Some(now)),
                refund_requested_at: Some(Some(now)),
                ..Self::default()
            },
            (SelectionState::RefundPending, SelectionState::ActiveCompleted) => Self {
                cancelled_at: Some(None),
                refund_requested_at: Some(None),
                ..Self::default()
            },
            (_, SelectionState::RefundCompleted | SelectionState::RefundRejected) => Self {
                refund_processed_at: Some(Some(now)),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

/// Writes a new state over `current`, guarded on its stored status columns.
///
/// Returns [`Error::Conflict`] when another writer changed the row since it was read.
/// Records the audit images; capacity and totals are the caller's concern.
pub(crate) async fn write_state<C>(
    db: &C,
    current: &registration_selection::Model,
    next: SelectionState,
    stamps: Stamps,
    action: &'static str,
    actor: Option<&str>,
) -> Result<registration_selection::Model>
where
    C: ConnectionTrait,
{
    let mut changes = registration_selection::ActiveModel {
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    next.write_to(&mut changes);
    if let Some(value) = stamps.cancelled_at {
        changes.cancelled_at = Set(value);
    }
    if let Some(value) = stamps.refund_requested_at {
        changes.refund_requested_at = Set(value);
    }
    if let Some(value) = stamps.refund_processed_at {
        changes.refund_processed_at = Set(value);
    }
    if let Some(value) = stamps.refund_notes {
        changes.refund_notes = Set(value);
    }

    let result = RegistrationSelection::update_many()
        .set(changes)
        .filter(registration_selection::Column::Id.eq(current.id))
        .filter(registration_selection::Column::PaymentStatus.eq(current.payment_status))
        .filter(registration_selection::Column::IsCancelled.eq(current.is_cancelled))
        .filter(registration_selection::Column::RefundStatus.eq(current.refund_status))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::Conflict {
            message: format!("selection {} was modified concurrently", current.id),
        });
    }

    let updated = RegistrationSelection::find_by_id(current.id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Selection", current.id))?;

    crate::core::audit::record(
        db,
        AuditEntry::change(SELECTION_TABLE, current.id, action, actor, Some(current), &updated)?,
    )
    .await?;

    Ok(updated)
}

/// Result of a selection transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    /// State before the transition
    pub previous: SelectionState,
    /// State after the transition
    pub state: SelectionState,
    /// The selection after the transition
    pub selection: registration_selection::Model,
    /// The parent registration with recomputed totals
    pub registration: reg_entity::Model,
}

async fn lock_selection<C>(db: &C, selection_id: i64) -> Result<registration_selection::Model>
where
    C: ConnectionTrait,
{
    RegistrationSelection::find_by_id(selection_id)
        .lock_exclusive()
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Selection", selection_id))
}

async fn transition<F>(
    db: &DatabaseConnection,
    selection_id: i64,
    action: &'static str,
    actor: Option<&str>,
    notes: Option<String>,
    decide: F,
) -> Result<TransitionOutcome>
where
    F: FnOnce(SelectionState, &reg_entity::Model) -> Result<SelectionState>,
{
    let txn = db.begin().await?;

    let current = lock_selection(&txn, selection_id).await?;
    let parent = Registration::find_by_id(current.registration_id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| Error::not_found("Registration", current.registration_id))?;

    let previous = SelectionState::from_row(&current)?;
    let next = decide(previous, &parent)?;

    match (previous.holds_seat(), next.holds_seat()) {
        (true, false) => capacity::release(&txn, current.registration_type_id).await?,
        (false, true) => {
            let enforce = Category::find_by_id(current.category_id)
                .one(&txn)
                .await?
                .is_some_and(|c| c.capacity_tracking_enabled);
            capacity::reserve(&txn, current.registration_type_id, enforce).await?;
        }
        _ => {}
    }

    let mut stamps = Stamps::for_transition(previous, next, Utc::now());
    if notes.is_some() {
        stamps.refund_notes = Some(notes);
    }

    let selection = write_state(&txn, &current, next, stamps, action, actor).await?;
    let registration = registration::recompute_totals(&txn, parent.id, actor).await?;

    txn.commit().await?;

    tracing::info!(
        selection_id,
        registration_id = registration.id,
        from = ?previous,
        to = ?next,
        grand_total = registration.grand_total,
        "Selection {action}"
    );

    Ok(TransitionOutcome {
        previous,
        state: next,
        selection,
        registration,
    })
}

/// Cancels a selection.
///
/// Unpaid lines are simply cancelled; paid lines move to a pending refund and keep counting
/// toward the registration total until the refund is approved. The seat is released either way.
pub async fn cancel_selection(
    db: &DatabaseConnection,
    selection_id: i64,
    actor: Option<&str>,
) -> Result<TransitionOutcome> {
    transition(db, selection_id, "cancel", actor, None, |state, _| state.cancel()).await
}

/// Approves or rejects a pending refund.
pub async fn decide_refund(
    db: &DatabaseConnection,
    selection_id: i64,
    decision: RefundDecision,
    notes: Option<String>,
    actor: Option<&str>,
) -> Result<TransitionOutcome> {
    let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    match decision {
        RefundDecision::Approve => {
            transition(db, selection_id, "refund_approve", actor, notes, |state, _| {
                state.approve_refund()
            })
            .await
        }
        RefundDecision::Reject => {
            transition(db, selection_id, "refund_reject", actor, notes, |state, _| {
                state.reject_refund()
            })
            .await
        }
    }
}

/// Reverts a cancellation whose refund is still pending, taking the seat back.
pub async fn undo_cancellation(
    db: &DatabaseConnection,
    selection_id: i64,
    actor: Option<&str>,
) -> Result<TransitionOutcome> {
    transition(db, selection_id, "undo_cancel", actor, None, |state, parent| {
        state.undo_cancel(parent.payment_confirmed_at.is_some())
    })
    .await
}

/// Marks an unpaid selection as paid.
pub async fn confirm_selection_payment(
    db: &DatabaseConnection,
    selection_id: i64,
    actor: Option<&str>,
) -> Result<TransitionOutcome> {
    transition(db, selection_id, "confirm_payment", actor, None, |state, _| {
        state.confirm_payment()
    })
    .await
}
