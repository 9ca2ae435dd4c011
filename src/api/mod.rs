//! HTTP layer - axum router over the core operations
//!
//! Handlers translate requests into `core` calls and map [`crate::errors::Error`] to responses
//! through [`error::AppError`]. Operator endpoints live under `/api/admin`; authenticating the
//! operator is left to the reverse proxy in front of the service. The optional `X-Actor`
//! header names the operator in audit entries.

/// Back-office configuration endpoints
pub mod admin;
/// Error to response mapping
pub mod error;
/// Fee quotes
pub mod fees;
/// Card payment initiation and callback
pub mod payments;
/// Registration endpoints
pub mod registrations;
/// Selection lifecycle endpoints
pub mod selections;
/// Shared handler state
pub mod state;

pub use state::AppState;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post, put},
};
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;

/// Header naming the operator behind an admin request.
pub const ACTOR_HEADER: &str = "x-actor";

/// The operator named by the request, if any.
pub(crate) fn actor(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ACTOR_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Liveness and database reachability.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}

/// Builds the complete router.
pub fn router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/registrations/:id", get(registrations::get))
        .route(
            "/registrations/:id/confirm-payment",
            post(registrations::confirm_payment),
        )
        .route("/selections/:id", delete(selections::cancel))
        .route("/selections/:id/refund", post(selections::refund))
        .route("/selections/:id/undo-cancel", post(selections::undo_cancel))
        .route(
            "/selections/:id/confirm-payment",
            post(selections::confirm_payment),
        )
        .route("/gateway", put(admin::configure_gateway))
        .route("/discount-codes", post(admin::create_discount_code))
        .route("/payments/expire-stale", post(admin::expire_stale));

    let api_routes = Router::new()
        .route("/fees/quote", post(fees::quote))
        .route("/payments/initiate", post(payments::initiate))
        .route("/payments/callback", post(payments::callback))
        .route("/registrations", post(registrations::create))
        .nest("/admin", admin_routes);

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
