//! Unified error type for the registration ledger.
//!
//! Variants are grouped by how the HTTP boundary must treat them: validation and business-rule
//! failures carry a user-facing message, security and persistence failures are logged in full
//! and surfaced generically.

use thiserror::Error;

/// Classification used by the HTTP layer to choose a status code and message policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input
    Validation,
    /// Signature or hash mismatch on an inbound gateway message
    Security,
    /// A rule of the registration domain refused the operation
    BusinessRule,
    /// The payment bank or another outside system failed
    External,
    /// The store failed; the enclosing transaction has rolled back
    Persistence,
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: f64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Security check failed: {reason}")]
    Security { reason: String },

    #[error("Registration type {type_id} has no remaining capacity")]
    CapacityExhausted { type_id: i64 },

    #[error("Registration for category {category_id} is closed")]
    RegistrationClosed { category_id: i64 },

    #[error("Discount code '{code}' not found")]
    DiscountCodeNotFound { code: String },

    #[error("Discount code '{code}' is not valid at this time")]
    DiscountCodeInactive { code: String },

    #[error("Discount code '{code}' has reached its usage limit")]
    DiscountCodeLimitReached { code: String },

    #[error("Cannot {action} a selection that is {state}")]
    IllegalTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Payment does not match registration: {message}")]
    PaymentMismatch { message: String },

    #[error("No active payment gateway is configured")]
    NoActiveGateway,

    #[error("Payment gateway error: {message}")]
    Gateway { message: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Stored state is inconsistent: {message}")]
    CorruptState { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Cryptography error: {message}")]
    Crypto { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the taxonomy bucket of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::InvalidAmount { .. } | Self::NotFound { .. } => {
                ErrorKind::Validation
            }
            Self::Security { .. } => ErrorKind::Security,
            Self::CapacityExhausted { .. }
            | Self::RegistrationClosed { .. }
            | Self::DiscountCodeNotFound { .. }
            | Self::DiscountCodeInactive { .. }
            | Self::DiscountCodeLimitReached { .. }
            | Self::IllegalTransition { .. }
            | Self::Conflict { .. }
            | Self::PaymentMismatch { .. }
            | Self::NoActiveGateway => ErrorKind::BusinessRule,
            Self::Gateway { .. } => ErrorKind::External,
            Self::Database(_)
            | Self::CorruptState { .. }
            | Self::Config { .. }
            | Self::Crypto { .. }
            | Self::Io(_)
            | Self::EnvVar(_) => ErrorKind::Persistence,
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            Error::Security {
                reason: "hash".to_string()
            }
            .kind(),
            ErrorKind::Security
        );
        assert_eq!(
            Error::CapacityExhausted { type_id: 1 }.kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(
            Error::Gateway {
                message: "timeout".to_string()
            }
            .kind(),
            ErrorKind::External
        );
        assert_eq!(
            Error::Database(sea_orm::DbErr::Custom("boom".to_string())).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_illegal_transition_message() {
        let err = Error::IllegalTransition {
            action: "reactivate",
            state: "refund-completed",
        };
        assert_eq!(
            err.to_string(),
            "Cannot reactivate a selection that is refund-completed"
        );
    }
}
