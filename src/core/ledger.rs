//! Payment ledger - one row per payment attempt, keyed by order id.
//!
//! A row is opened as `pending` before the participant is redirected to the bank, so every
//! attempt leaves a record even when the bank never calls back. [`finalize`] moves it to a
//! terminal status exactly once; later calls for the same order id are no-ops.

use crate::{
    entities::{Currency, PaymentTransaction, TransactionStatus, payment_transaction},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use sea_orm::{Set, prelude::*};
use uuid::Uuid;

/// Error code stored on attempts that never received a callback.
pub const TIMEOUT_ERROR_CODE: &str = "TIMEOUT";

/// Generates a fresh order id: `ORD`, the UTC timestamp, and a random suffix.
#[must_use]
pub fn generate_order_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "ORD{}{}",
        now.format("%Y%m%d%H%M%S"),
        suffix[..8].to_uppercase()
    )
}

/// A payment attempt about to be sent to the bank.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    /// Unique order identifier sent to the bank
    pub order_id: String,
    /// Gateway the attempt is signed for
    pub gateway_name: String,
    /// Amount to charge
    pub amount: f64,
    /// Currency of the charge
    pub currency: Currency,
    /// Name on the card
    pub card_holder: Option<String>,
    /// First six and last four digits only
    pub masked_card: Option<String>,
    /// Client form the payment belongs to
    pub form_submission_id: Option<String>,
}

/// What the bank said about an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Verified and approved
    Approved {
        bank_transaction_id: Option<String>,
        auth_code: Option<String>,
        card_brand: Option<String>,
    },
    /// Declined by the bank, or rejected locally
    Declined {
        error_code: String,
        error_message: String,
    },
}

/// Result of finalizing an attempt.
#[derive(Debug, Clone)]
pub struct Finalized {
    /// The row after the call
    pub transaction: payment_transaction::Model,
    /// False when the row was already terminal and nothing changed
    pub applied: bool,
}

/// Records a new `pending` attempt.
pub async fn open<C>(db: &C, attempt: NewAttempt) -> Result<payment_transaction::Model>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let row = payment_transaction::ActiveModel {
        order_id: Set(attempt.order_id),
        registration_id: Set(None),
        form_submission_id: Set(attempt.form_submission_id),
        gateway_name: Set(attempt.gateway_name),
        amount: Set(attempt.amount),
        currency: Set(attempt.currency),
        card_holder: Set(attempt.card_holder),
        masked_card: Set(attempt.masked_card),
        card_brand: Set(None),
        status: Set(TransactionStatus::Pending),
        bank_transaction_id: Set(None),
        auth_code: Set(None),
        error_code: Set(None),
        error_message: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    tracing::info!(
        order_id = %row.order_id,
        amount = row.amount,
        currency = row.currency.code(),
        "Payment attempt opened"
    );
    Ok(row)
}

/// Looks up an attempt by order id.
pub async fn find<C>(db: &C, order_id: &str) -> Result<Option<payment_transaction::Model>>
where
    C: ConnectionTrait,
{
    PaymentTransaction::find()
        .filter(payment_transaction::Column::OrderId.eq(order_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Looks up an attempt by order id, failing when it does not exist.
pub async fn get<C>(db: &C, order_id: &str) -> Result<payment_transaction::Model>
where
    C: ConnectionTrait,
{
    find(db, order_id)
        .await?
        .ok_or_else(|| Error::not_found("Payment", order_id))
}

/// Moves a pending attempt to `success` or `failed`.
///
/// The update is conditional on the row still being pending, so a retried or concurrent
/// callback for the same order id changes nothing the second time.
pub async fn finalize<C>(db: &C, order_id: &str, outcome: Outcome) -> Result<Finalized>
where
    C: ConnectionTrait,
{
    let current = get(db, order_id).await?;
    if current.status.is_terminal() {
        tracing::info!(order_id, status = ?current.status, "Payment already finalized");
        return Ok(Finalized {
            transaction: current,
            applied: false,
        });
    }

    let mut changes = payment_transaction::ActiveModel {
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    match &outcome {
        Outcome::Approved {
            bank_transaction_id,
            auth_code,
            card_brand,
        } => {
            changes.status = Set(TransactionStatus::Success);
            changes.bank_transaction_id = Set(bank_transaction_id.clone());
            changes.auth_code = Set(auth_code.clone());
            changes.card_brand = Set(card_brand.clone());
        }
        Outcome::Declined {
            error_code,
            error_message,
        } => {
            changes.status = Set(TransactionStatus::Failed);
            changes.error_code = Set(Some(error_code.clone()));
            changes.error_message = Set(Some(error_message.clone()));
        }
    }

    let result = PaymentTransaction::update_many()
        .set(changes)
        .filter(payment_transaction::Column::OrderId.eq(order_id))
        .filter(payment_transaction::Column::Status.eq(TransactionStatus::Pending))
        .exec(db)
        .await?;

    let transaction = get(db, order_id).await?;
    let applied = result.rows_affected > 0;
    if applied {
        tracing::info!(order_id, status = ?transaction.status, "Payment finalized");
    } else {
        tracing::info!(order_id, status = ?transaction.status, "Payment finalized concurrently");
    }

    Ok(Finalized {
        transaction,
        applied,
    })
}

/// Links a successful, unlinked attempt to the registration it paid for.
///
/// A payment can pay for exactly one registration: the update only matches rows that are
/// `success` and not yet linked.
pub async fn link_to_registration<C>(db: &C, order_id: &str, registration_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let result = PaymentTransaction::update_many()
        .set(payment_transaction::ActiveModel {
            registration_id: Set(Some(registration_id)),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(payment_transaction::Column::OrderId.eq(order_id))
        .filter(payment_transaction::Column::Status.eq(TransactionStatus::Success))
        .filter(payment_transaction::Column::RegistrationId.is_null())
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::PaymentMismatch {
            message: format!("payment {order_id} is not a successful unused payment"),
        });
    }

    tracing::debug!(order_id, registration_id, "Payment linked to registration");
    Ok(())
}

/// Fails every attempt still pending since before `older_than`. Returns how many changed.
pub async fn expire_stale<C>(db: &C, older_than: DateTime<Utc>) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = PaymentTransaction::update_many()
        .set(payment_transaction::ActiveModel {
            status: Set(TransactionStatus::Failed),
            error_code: Set(Some(TIMEOUT_ERROR_CODE.to_string())),
            error_message: Set(Some("No response from the bank".to_string())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(payment_transaction::Column::Status.eq(TransactionStatus::Pending))
        .filter(payment_transaction::Column::CreatedAt.lt(older_than))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        tracing::warn!(
            expired = result.rows_affected,
            "Expired abandoned payment attempts"
        );
    }
    Ok(result.rows_affected)
}
