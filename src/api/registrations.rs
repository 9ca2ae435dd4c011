//! Registration endpoints.
//!
//! - POST /api/registrations - create a registration
//! - GET /api/admin/registrations/:id - registration with its selections
//! - POST /api/admin/registrations/:id/confirm-payment - operator confirms a transfer

use super::{AppState, actor, error::AppError};
use crate::core::registration::{self, NewRegistration, RegistrationDetails};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;

/// Registration wrapped in the common success envelope.
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    /// Always true; failures use the error body
    pub success: bool,
    #[serde(flatten)]
    pub details: RegistrationDetails,
}

impl From<RegistrationDetails> for RegistrationResponse {
    fn from(details: RegistrationDetails) -> Self {
        Self {
            success: true,
            details,
        }
    }
}

/// Creates a registration.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<NewRegistration>,
) -> Result<(StatusCode, Json<RegistrationResponse>), AppError> {
    let details = registration::create_registration(
        &state.db,
        &state.config.currency,
        request,
        actor(&headers).as_deref(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(details.into())))
}

/// Loads a registration with its selections.
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let details = registration::get_registration_with_selections(&state.db, id).await?;
    Ok(Json(details.into()))
}

/// Confirms receipt of a registration's payment.
pub async fn confirm_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let details =
        registration::confirm_registration_payment(&state.db, id, actor(&headers).as_deref()).await?;
    Ok(Json(details.into()))
}
