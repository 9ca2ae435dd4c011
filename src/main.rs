use registration_ledger::{
    api::{self, AppState},
    config::{
        app::{encryption_key_from_env, load_default_config},
        database::{create_connection, create_tables},
    },
    core::{gateway::ThreeDPayProtocol, hashing::SecretCipher},
    errors::{Error, Result},
};
use dotenvy::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. `--generate-key` prints a fresh gateway encryption key and exits
    if std::env::args().any(|arg| arg == "--generate-key") {
        println!("{}", SecretCipher::generate_key());
        return Ok(());
    }

    // 4. Load the application configuration
    let config = load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;
    info!(bind_address = %config.server.bind_address, "Configuration loaded");

    // 5. Gateway secret cipher; the key itself is never logged
    let cipher = SecretCipher::from_base64_key(&encryption_key_from_env()?)
        .inspect_err(|e| error!("Invalid gateway encryption key: {}", e))?;

    // 6. Connect and make sure the schema exists
    let db = create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    create_tables(&db).await?;
    info!("Database initialized successfully.");

    // 7. Serve
    let bind_address = config.server.bind_address.clone();
    let state = AppState::new(db, config, cipher, Arc::new(ThreeDPayProtocol));
    let listener = TcpListener::bind(&bind_address).await?;
    info!(address = %bind_address, "Listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::Io)?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
