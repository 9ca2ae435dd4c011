//! Core business logic - framework-agnostic pricing, payment, and lifecycle operations
//!
//! Every operation takes a database connection (or an open transaction) and returns the
//! crate [`Result`](crate::errors::Result). The HTTP layer in [`crate::api`] only translates
//! requests into these calls.

/// Audit entries with before/after images
pub mod audit;
/// Per-type occupancy counters
pub mod capacity;
/// Discount code lookup, redemption, and creation
pub mod discount;
/// Bank protocol, gateway selection, and gateway configuration
pub mod gateway;
/// Keyed digests and secret encryption
pub mod hashing;
/// Payment attempt ledger
pub mod ledger;
/// Rounding and currency helpers
pub mod money;
/// Card payment initiation and bank callbacks
pub mod payment;
/// Fee computation
pub mod pricing;
/// Registration creation, confirmation, and totals
pub mod registration;
/// Selection payment/cancellation/refund state machine
pub mod selection;
