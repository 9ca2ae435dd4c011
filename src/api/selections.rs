//! Selection lifecycle endpoints.
//!
//! - DELETE /api/admin/selections/:id - cancel
//! - POST /api/admin/selections/:id/refund - approve or reject a pending refund
//! - POST /api/admin/selections/:id/undo-cancel - revert a cancellation
//! - POST /api/admin/selections/:id/confirm-payment - mark one line paid

use super::{AppState, actor, error::AppError};
use crate::{
    core::selection::{self, RefundDecision, SelectionState, TransitionOutcome},
    entities::{registration, registration_selection},
};
use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

/// Body of a refund decision.
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// `approve` or `reject`
    pub action: RefundDecision,
    /// Operator notes stored with the decision
    pub notes: Option<String>,
}

/// Result of a transition.
#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    /// Always true; failures use the error body
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// State after the transition
    pub state: SelectionState,
    /// Updated selection row
    pub selection: registration_selection::Model,
    /// Parent registration with recomputed totals
    pub registration: registration::Model,
}

impl TransitionResponse {
    fn new(outcome: TransitionOutcome, message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            state: outcome.state,
            selection: outcome.selection,
            registration: outcome.registration,
        }
    }
}

/// Cancels a selection.
pub async fn cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = selection::cancel_selection(&state.db, id, actor(&headers).as_deref()).await?;
    let message = if outcome.state == SelectionState::RefundPending {
        "Selection cancelled; refund pending"
    } else {
        "Selection cancelled"
    };
    Ok(Json(TransitionResponse::new(outcome, message)))
}

/// Approves or rejects a pending refund.
pub async fn refund(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(request): Json<RefundRequest>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = selection::decide_refund(
        &state.db,
        id,
        request.action,
        request.notes,
        actor(&headers).as_deref(),
    )
    .await?;
    let message = match request.action {
        RefundDecision::Approve => "Refund approved",
        RefundDecision::Reject => "Refund rejected",
    };
    Ok(Json(TransitionResponse::new(outcome, message)))
}

/// Reverts a cancellation.
pub async fn undo_cancel(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome = selection::undo_cancellation(&state.db, id, actor(&headers).as_deref()).await?;
    Ok(Json(TransitionResponse::new(outcome, "Cancellation undone")))
}

/// Marks one selection as paid.
pub async fn confirm_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<TransitionResponse>, AppError> {
    let outcome =
        selection::confirm_selection_payment(&state.db, id, actor(&headers).as_deref()).await?;
    Ok(Json(TransitionResponse::new(outcome, "Payment confirmed")))
}
