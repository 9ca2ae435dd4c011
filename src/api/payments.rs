//! Card payment endpoints.
//!
//! - POST /api/payments/initiate - open a ledger row and return the auto-submit form
//! - POST /api/payments/callback - bank callback (form-encoded), answered with a redirect

use super::{AppState, error::AppError};
use crate::core::{
    hashing::CallbackFields,
    payment::{self, CallbackResult, PaymentInitiation},
};
use crate::entities::TransactionStatus;
use axum::{
    Form, Json,
    extract::State,
    response::Redirect,
};
use serde::Serialize;
use std::collections::HashMap;

/// Response after initiating a payment.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    /// Always true; failures use the error body
    pub success: bool,
    /// Ledger key of the new attempt
    pub order_id: String,
    /// Auto-submitting document to render in the participant's browser
    pub html_content: String,
}

/// Starts a card payment.
pub async fn initiate(
    State(state): State<AppState>,
    Json(request): Json<PaymentInitiation>,
) -> Result<Json<InitiateResponse>, AppError> {
    let initiated = payment::initiate_payment(
        &state.db,
        &state.cipher,
        state.protocol.as_ref(),
        &state.config.payment,
        request,
    )
    .await?;

    Ok(Json(InitiateResponse {
        success: true,
        order_id: initiated.order_id,
        html_content: initiated.html_content,
    }))
}

/// Receives the bank's callback and redirects the participant to the result page.
///
/// Always redirects: a callback that cannot be processed ends on the error page.
pub async fn callback(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Redirect {
    let fields: CallbackFields = form.into_iter().collect();

    let result = match payment::handle_callback(
        &state.db,
        &state.cipher,
        state.protocol.as_ref(),
        &fields,
    )
    .await
    {
        Ok(result) => result,
        Err(err) => {
            tracing::error!(error = %err, "Payment callback could not be processed");
            CallbackResult {
                order_id: fields.get("oid").unwrap_or_default().to_string(),
                status: TransactionStatus::Failed,
            }
        }
    };

    let result_page_url = &state.config.payment.result_page_url;
    let location = result.redirect_url(result_page_url).unwrap_or_else(|err| {
        tracing::error!(error = %err, "Result URL could not be built");
        result_page_url.clone()
    });
    Redirect::to(&location)
}
