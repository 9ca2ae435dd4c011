//! Application configuration loading from config.toml
//!
//! Non-secret settings (bind address, callback and result URLs, snapshot exchange rates) live in
//! a TOML file. Secrets never do: the gateway encryption key and the database URL come from the
//! environment, usually via a `.env` file loaded by `dotenvy`.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable holding the Base64 AES-256 key for gateway secrets.
pub const ENCRYPTION_KEY_VAR: &str = "GATEWAY_ENCRYPTION_KEY";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_VAR: &str = "APP_CONFIG";

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Payment flow settings
    #[serde(default)]
    pub payment: PaymentConfig,
    /// Snapshot exchange rates
    #[serde(default)]
    pub currency: CurrencyConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (e.g., "0.0.0.0:8080")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

/// Payment flow settings
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Public URL of the bank callback endpoint, used as both okUrl and failUrl
    #[serde(default = "default_callback_url")]
    pub callback_url: String,
    /// Page the participant is redirected to after the callback
    #[serde(default = "default_result_page_url")]
    pub result_page_url: String,
    /// Pending attempts older than this are expired as timed out
    #[serde(default = "default_pending_timeout_minutes")]
    pub pending_timeout_minutes: i64,
    /// Language code passed to the bank's 3-D Secure page
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            callback_url: default_callback_url(),
            result_page_url: default_result_page_url(),
            pending_timeout_minutes: default_pending_timeout_minutes(),
            language: default_language(),
        }
    }
}

/// Lira per unit of each foreign currency, snapshotted onto selections at purchase
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    /// TRY per USD
    #[serde(default = "default_usd_rate")]
    pub usd_rate: f64,
    /// TRY per EUR
    #[serde(default = "default_eur_rate")]
    pub eur_rate: f64,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        Self {
            usd_rate: default_usd_rate(),
            eur_rate: default_eur_rate(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_callback_url() -> String {
    "http://127.0.0.1:8080/api/payments/callback".to_string()
}

fn default_result_page_url() -> String {
    "http://127.0.0.1:8080/payment-result".to_string()
}

const fn default_pending_timeout_minutes() -> i64 {
    30
}

fn default_language() -> String {
    "tr".to_string()
}

const fn default_usd_rate() -> f64 {
    1.0
}

const fn default_eur_rate() -> f64 {
    1.0
}

/// Loads application configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - An exchange rate is not a positive number
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    parse_config(&contents)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;

    for (name, rate) in [
        ("usd_rate", config.currency.usd_rate),
        ("eur_rate", config.currency.eur_rate),
    ] {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Config {
                message: format!("currency.{name} must be a positive number, got {rate}"),
            });
        }
    }

    Ok(config)
}

/// Loads configuration from `$APP_CONFIG`, or ./config.toml, falling back to defaults
/// when the default file does not exist.
pub fn load_default_config() -> Result<AppConfig> {
    if let Ok(path) = std::env::var(CONFIG_PATH_VAR) {
        return load_config(path);
    }

    let default_path = Path::new("config.toml");
    if default_path.exists() {
        load_config(default_path)
    } else {
        tracing::warn!("config.toml not found, using built-in defaults");
        Ok(AppConfig::default())
    }
}

/// Reads the gateway encryption key from the environment.
///
/// The value is never logged.
pub fn encryption_key_from_env() -> Result<String> {
    std::env::var(ENCRYPTION_KEY_VAR).map_err(|_| Error::Config {
        message: format!("{ENCRYPTION_KEY_VAR} must be set"),
    })
}
