//! Fee quote endpoint.
//!
//! - POST /api/fees/quote - price selections, optionally with a discount code
//!
//! Client-supplied fees and VAT rates are accepted for compatibility with the public form and
//! ignored; prices always come from the store. An unusable discount code is not an error
//! here: the response is priced without it and carries `valid: false` with the reason.

use super::{AppState, error::AppError};
use crate::{
    core::pricing::{self, ResolvedQuote, SelectionRequest},
    entities::Currency,
    errors::Error,
};
use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Request to price a set of selections.
#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    /// Lines to price
    pub selections: Vec<SelectionRequest>,
    /// Discount code, as typed
    pub code: Option<String>,
    /// Pricing currency; lira when omitted
    #[serde(default = "default_currency")]
    pub currency: Currency,
}

const fn default_currency() -> Currency {
    Currency::Try
}

/// One priced line.
///
/// The `_try` suffixes are fixed wire names. Every amount is in the response's `currency`,
/// which is lira unless the request asked for another.
#[derive(Debug, Serialize)]
pub struct QuoteItem {
    /// Category of the line
    pub category_id: i64,
    /// Type of the line
    pub registration_type_id: i64,
    /// List fee before early-bird and discount
    pub original_fee_try: f64,
    /// Fee after early-bird and discount, VAT excluded
    pub discounted_fee_try: f64,
    /// VAT on the discounted fee
    pub vat_amount_try: f64,
    /// Discounted fee plus VAT
    pub total_try: f64,
    /// Whether a discount rule matched the line
    pub discount_applied: bool,
    /// Whether the early-bird price was used
    pub early_bird_applied: bool,
}

/// Priced selections.
#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    /// False when the supplied code could not be applied
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Priced lines, in request order
    pub items: Vec<QuoteItem>,
    /// Sum of line totals, in `currency` despite the wire name
    pub grand_total_try: f64,
    /// Currency every amount is expressed in
    pub currency: Currency,
}

impl QuoteResponse {
    fn from_quote(resolved: &ResolvedQuote, message: Option<String>) -> Self {
        let items = resolved
            .quote
            .lines
            .iter()
            .map(|line| QuoteItem {
                category_id: line.category_id,
                registration_type_id: line.registration_type_id,
                original_fee_try: line.original_fee,
                discounted_fee_try: line.discounted_fee,
                vat_amount_try: line.vat_amount,
                total_try: line.total,
                discount_applied: line.discount_applied,
                early_bird_applied: line.early_bird_applied,
            })
            .collect();

        Self {
            valid: message.is_none(),
            message,
            items,
            grand_total_try: resolved.quote.grand_total,
            currency: resolved.currency,
        }
    }
}

/// Prices selections against the store.
pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteResponse>, AppError> {
    let now = Utc::now();
    let rates = &state.config.currency;

    let priced = pricing::quote(
        &state.db,
        &request.selections,
        request.code.as_deref(),
        request.currency,
        rates,
        now,
    )
    .await;

    match priced {
        Ok(resolved) => Ok(Json(QuoteResponse::from_quote(&resolved, None))),
        Err(
            err @ (Error::DiscountCodeNotFound { .. }
            | Error::DiscountCodeInactive { .. }
            | Error::DiscountCodeLimitReached { .. }),
        ) => {
            let resolved = pricing::quote(
                &state.db,
                &request.selections,
                None,
                request.currency,
                rates,
                now,
            )
            .await?;
            Ok(Json(QuoteResponse::from_quote(&resolved, Some(err.to_string()))))
        }
        Err(err) => Err(err.into()),
    }
}
