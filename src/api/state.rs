//! Application state shared by all HTTP handlers.

use crate::{
    config::AppConfig,
    core::{gateway::GatewayProtocol, hashing::SecretCipher},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared handler state. Cloned per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: DatabaseConnection,
    /// Loaded application configuration
    pub config: Arc<AppConfig>,
    /// Cipher for gateway secrets
    pub cipher: SecretCipher,
    /// Signing scheme of the configured bank
    pub protocol: Arc<dyn GatewayProtocol>,
}

impl AppState {
    /// Creates the state from its parts.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        config: AppConfig,
        cipher: SecretCipher,
        protocol: Arc<dyn GatewayProtocol>,
    ) -> Self {
        Self {
            db,
            config: Arc::new(config),
            cipher,
            protocol,
        }
    }
}
