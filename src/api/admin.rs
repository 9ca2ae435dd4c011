//! Back-office configuration endpoints.
//!
//! - PUT /api/admin/gateway - create or replace a gateway configuration
//! - POST /api/admin/discount-codes - create a discount code with its rules
//! - POST /api/admin/payments/expire-stale - fail abandoned payment attempts

use super::{AppState, actor, error::AppError};
use crate::{
    core::{
        discount::{self, NewDiscountCode},
        gateway::{self, GatewaySettings},
        ledger,
    },
    entities::{discount_code, payment_gateway},
};
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::{Duration, Utc};
use serde::Serialize;

/// Saved gateway; the encrypted secret is never serialized.
#[derive(Debug, Serialize)]
pub struct GatewayResponse {
    /// Always true; failures use the error body
    pub success: bool,
    /// Saved configuration
    pub gateway: payment_gateway::Model,
}

/// Stores a gateway configuration.
pub async fn configure_gateway(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(settings): Json<GatewaySettings>,
) -> Result<Json<GatewayResponse>, AppError> {
    let gateway =
        gateway::configure_gateway(&state.db, &state.cipher, settings, actor(&headers).as_deref())
            .await?;
    Ok(Json(GatewayResponse {
        success: true,
        gateway,
    }))
}

/// Created discount code.
#[derive(Debug, Serialize)]
pub struct DiscountCodeResponse {
    /// Always true; failures use the error body
    pub success: bool,
    /// Created code
    pub discount_code: discount_code::Model,
}

/// Creates a discount code.
pub async fn create_discount_code(
    State(state): State<AppState>,
    Json(request): Json<NewDiscountCode>,
) -> Result<(StatusCode, Json<DiscountCodeResponse>), AppError> {
    let discount_code = discount::create_discount_code(&state.db, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(DiscountCodeResponse {
            success: true,
            discount_code,
        }),
    ))
}

/// Number of attempts expired.
#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    /// Always true; failures use the error body
    pub success: bool,
    /// Attempts moved from pending to failed
    pub expired: u64,
}

/// Fails pending attempts older than the configured timeout.
pub async fn expire_stale(State(state): State<AppState>) -> Result<Json<ExpireResponse>, AppError> {
    let cutoff = Utc::now() - Duration::minutes(state.config.payment.pending_timeout_minutes);
    let expired = ledger::expire_stale(&state.db, cutoff).await?;
    Ok(Json(ExpireResponse {
        success: true,
        expired,
    }))
}
